pub mod datum;
pub mod error;
pub mod schema;
pub mod tuple;
pub mod types;

pub use datum::*;
pub use error::*;
pub use schema::*;
pub use tuple::*;
pub use types::*;
