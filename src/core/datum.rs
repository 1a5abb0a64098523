use std::{fmt::Display, hash::Hash};

use enum_as_inner::EnumAsInner;

use super::Type;

/// A single scalar value. `Boolean` never appears in a schema; it is only
/// produced as the result of predicate evaluation.
#[derive(Debug, Clone, EnumAsInner)]
pub enum Value {
    Int(i64),
    Float(f64),
    Char(String),
    Boolean(bool),
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
        }
    }
}

impl Value {
    pub fn typ(&self) -> Option<Type> {
        match self {
            Value::Int(_) => Some(Type::Int),
            Value::Float(_) => Some(Type::Float),
            Value::Char(v) => Some(Type::Char(v.len())),
            Value::Boolean(_) => None,
        }
    }

    /// Coerces a value to the string form used as a hash/grouping bucket key.
    pub fn bucket_key(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Char(v) => v.clone(),
            Value::Boolean(v) => v.to_string(),
        }
    }
}

impl Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Char(v) => v.hash(state),
            Value::Boolean(v) => v.hash(state),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(l), Self::Int(r)) => l == r,
            (Self::Float(l), Self::Float(r)) => l.to_bits() == r.to_bits(),
            (Self::Char(l), Self::Char(r)) => l == r,
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            _ => false,
        }
    }
}

impl Eq for Value {}
