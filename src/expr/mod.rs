pub mod aggregate;

pub use aggregate::*;

use crate::core::{EngineError, Environment, Result, Value};

/// A small expression AST, evaluated against a name→value `Environment`
/// built by `Schema::environment`. Replaces the reference implementation's
/// approach of evaluating predicate/hash-function text against a dynamic
/// dictionary: the operator contract only ever depends on "given an
/// environment, return a value," so swapping in a compiled AST here doesn't
/// change anything above it.
#[derive(Clone, Debug)]
pub enum Expr {
    Column(String),
    Literal(Value),
    BinaryOp(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Expr {
        Expr::Column(name.into())
    }

    pub fn int(v: i64) -> Expr {
        Expr::Literal(Value::Int(v))
    }

    pub fn eval(&self, env: &Environment) -> Result<Value> {
        match self {
            Expr::Column(name) => env.get(name).cloned().ok_or_else(|| {
                EngineError::evaluation(format!("unbound column reference: {name}"))
            }),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::BinaryOp(op, lhs, rhs) => {
                let lhs = lhs.eval(env)?;
                let rhs = rhs.eval(env)?;
                eval_binary(*op, &lhs, &rhs)
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(env))
                    .collect::<Result<Vec<_>>>()?;
                call_builtin(name, &args)
            }
        }
    }
}

fn as_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Int(v) => Ok(*v as f64),
        Value::Float(v) => Ok(*v),
        other => Err(EngineError::evaluation(format!(
            "expected a numeric value, found {other}"
        ))),
    }
}

fn eval_binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    use BinOp::*;
    match op {
        Add | Sub | Mul | Div | Mod => {
            if let (Value::Int(l), Value::Int(r)) = (lhs, rhs) {
                return Ok(Value::Int(match op {
                    Add => l.wrapping_add(*r),
                    Sub => l.wrapping_sub(*r),
                    Mul => l.wrapping_mul(*r),
                    Div => l
                        .checked_div(*r)
                        .ok_or_else(|| EngineError::evaluation("division by zero"))?,
                    Mod => l
                        .checked_rem(*r)
                        .ok_or_else(|| EngineError::evaluation("modulo by zero"))?,
                    _ => unreachable!(),
                }));
            }
            let l = as_f64(lhs)?;
            let r = as_f64(rhs)?;
            Ok(Value::Float(match op {
                Add => l + r,
                Sub => l - r,
                Mul => l * r,
                Div => l / r,
                Mod => l % r,
                _ => unreachable!(),
            }))
        }
        Eq => Ok(Value::Boolean(lhs == rhs)),
        Ne => Ok(Value::Boolean(lhs != rhs)),
        Lt | Le | Gt | Ge => {
            let ordering = compare(lhs, rhs)?;
            Ok(Value::Boolean(match op {
                Lt => ordering.is_lt(),
                Le => ordering.is_le(),
                Gt => ordering.is_gt(),
                Ge => ordering.is_ge(),
                _ => unreachable!(),
            }))
        }
        And => Ok(Value::Boolean(as_bool(lhs)? && as_bool(rhs)?)),
        Or => Ok(Value::Boolean(as_bool(lhs)? || as_bool(rhs)?)),
    }
}

fn as_bool(value: &Value) -> Result<bool> {
    match value {
        Value::Boolean(b) => Ok(*b),
        other => Err(EngineError::evaluation(format!(
            "expected a boolean value, found {other}"
        ))),
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Int(l), Value::Int(r)) => Ok(l.cmp(r)),
        (Value::Char(l), Value::Char(r)) => Ok(l.cmp(r)),
        _ => {
            let l = as_f64(lhs)?;
            let r = as_f64(rhs)?;
            l.partial_cmp(&r)
                .ok_or_else(|| EngineError::evaluation("NaN is not orderable"))
        }
    }
}

/// Built-in functions available to hash/predicate expressions. `hash(x)`
/// mirrors the reference's caller-supplied `hash(field) % N` idiom: a
/// deterministic, non-cryptographic hash coerced to a non-negative `Int` so
/// a `Mod` in the caller's expression produces a bounded bucket index.
fn call_builtin(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "hash" => {
            let value = args
                .first()
                .ok_or_else(|| EngineError::evaluation("hash() takes one argument"))?;
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            value.hash(&mut hasher);
            // Mask off the sign bit so a caller's `hash(x) % n` never sees a
            // negative dividend.
            Ok(Value::Int((hasher.finish() & 0x7fff_ffff_ffff_ffff) as i64))
        }
        other => Err(EngineError::evaluation(format!(
            "unknown function: {other}"
        ))),
    }
}
