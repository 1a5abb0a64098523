use std::{error::Error, fmt::Display};

/// Single crate-wide error type. All fallible engine APIs return
/// `Result<T, EngineError>`; there is no retry and no partial result.
#[derive(Clone, Debug)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing/invalid operator parameter, or an unsupported execution mode.
    Configuration,
    /// Mismatched union inputs, overlapping join schemas, aggregate arity mismatch.
    Schema,
    /// Indexed nested-loop join: declared, not implemented.
    NotImplemented,
    /// Surfaced from the storage/buffer-pool collaborator.
    Storage,
    /// Predicate, hash function, or aggregate raised during tuple processing.
    Evaluation,
}

impl Error for EngineError {}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "Configuration Error"),
            ErrorKind::Schema => write!(f, "Schema Error"),
            ErrorKind::NotImplemented => write!(f, "Not Implemented"),
            ErrorKind::Storage => write!(f, "Storage Error"),
            ErrorKind::Evaluation => write!(f, "Evaluation Error"),
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl AsRef<str>) -> Self {
        Self {
            kind,
            message: message.as_ref().to_string(),
        }
    }

    pub fn configuration(message: impl AsRef<str>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn schema(message: impl AsRef<str>) -> Self {
        Self::new(ErrorKind::Schema, message)
    }

    pub fn not_implemented(message: impl AsRef<str>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    pub fn storage(message: impl AsRef<str>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn evaluation(message: impl AsRef<str>) -> Self {
        Self::new(ErrorKind::Evaluation, message)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
