pub mod core;
pub mod expr;
pub mod operator;
pub mod storage;
