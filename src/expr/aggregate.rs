use crate::core::{EngineError, Environment, Result, Value};

use super::Expr;

/// The running state of one aggregate within one group. Kept distinct from
/// `Value` because some aggregates (`avg`) need more than a single scalar
/// to accumulate correctly.
#[derive(Clone, Debug)]
pub enum Accumulator {
    Count(i64),
    Sum(Value),
    Avg { total: f64, count: u64 },
    MinMax(Option<Value>),
}

/// One `(init, step, finalize)` aggregate triple, as required by GroupBy's
/// `aggExprs`. `step` is evaluated once per input tuple of a group; the
/// group-by operator decides when to call `init`/`finalize` around it.
pub struct AggregateExpr {
    pub init: Accumulator,
    #[allow(clippy::type_complexity)]
    pub step: Box<dyn Fn(&Accumulator, &Environment) -> Result<Accumulator>>,
    pub finalize: Box<dyn Fn(&Accumulator) -> Value>,
}

impl AggregateExpr {
    /// `count(*)` — ignores its argument entirely.
    pub fn count() -> AggregateExpr {
        AggregateExpr {
            init: Accumulator::Count(0),
            step: Box::new(|acc, _env| match acc {
                Accumulator::Count(n) => Ok(Accumulator::Count(n + 1)),
                _ => unreachable!("count() always holds Accumulator::Count"),
            }),
            finalize: Box::new(|acc| match acc {
                Accumulator::Count(n) => Value::Int(*n),
                _ => unreachable!(),
            }),
        }
    }

    /// `sum(field)`.
    pub fn sum(field: impl Into<String>) -> AggregateExpr {
        let expr = Expr::column(field);
        AggregateExpr {
            init: Accumulator::Sum(Value::Int(0)),
            step: Box::new(move |acc, env| {
                let value = expr.eval(env)?;
                let Accumulator::Sum(current) = acc else {
                    unreachable!("sum() always holds Accumulator::Sum");
                };
                Ok(Accumulator::Sum(add(current, &value)?))
            }),
            finalize: Box::new(|acc| match acc {
                Accumulator::Sum(v) => v.clone(),
                _ => unreachable!(),
            }),
        }
    }

    /// `avg(field)`.
    pub fn avg(field: impl Into<String>) -> AggregateExpr {
        let expr = Expr::column(field);
        AggregateExpr {
            init: Accumulator::Avg {
                total: 0.0,
                count: 0,
            },
            step: Box::new(move |acc, env| {
                let value = expr.eval(env)?;
                let Accumulator::Avg { total, count } = acc else {
                    unreachable!("avg() always holds Accumulator::Avg");
                };
                let n = match value {
                    Value::Int(v) => v as f64,
                    Value::Float(v) => v,
                    other => {
                        return Err(EngineError::evaluation(format!(
                            "avg() requires a numeric field, found {other}"
                        )))
                    }
                };
                Ok(Accumulator::Avg {
                    total: total + n,
                    count: count + 1,
                })
            }),
            finalize: Box::new(|acc| match acc {
                Accumulator::Avg { total, count } if *count > 0 => {
                    Value::Float(total / *count as f64)
                }
                Accumulator::Avg { .. } => Value::Float(0.0),
                _ => unreachable!(),
            }),
        }
    }

    /// `min(field)`.
    pub fn min(field: impl Into<String>) -> AggregateExpr {
        Self::min_max(field, std::cmp::Ordering::Less)
    }

    /// `max(field)`.
    pub fn max(field: impl Into<String>) -> AggregateExpr {
        Self::min_max(field, std::cmp::Ordering::Greater)
    }

    fn min_max(field: impl Into<String>, keep: std::cmp::Ordering) -> AggregateExpr {
        let expr = Expr::column(field);
        AggregateExpr {
            init: Accumulator::MinMax(None),
            step: Box::new(move |acc, env| {
                let value = expr.eval(env)?;
                let Accumulator::MinMax(current) = acc else {
                    unreachable!("min()/max() always hold Accumulator::MinMax");
                };
                let next = match current {
                    None => value,
                    Some(current) => {
                        if ordering(current, &value)? == keep {
                            value
                        } else {
                            current.clone()
                        }
                    }
                };
                Ok(Accumulator::MinMax(Some(next)))
            }),
            finalize: Box::new(|acc| match acc {
                Accumulator::MinMax(Some(v)) => v.clone(),
                Accumulator::MinMax(None) => Value::Int(0),
                _ => unreachable!(),
            }),
        }
    }
}

fn add(lhs: &Value, rhs: &Value) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Int(l), Value::Int(r)) => Ok(Value::Int(l + r)),
        (Value::Int(l), Value::Float(r)) => Ok(Value::Float(*l as f64 + r)),
        (Value::Float(l), Value::Int(r)) => Ok(Value::Float(l + *r as f64)),
        (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l + r)),
        _ => Err(EngineError::evaluation("sum() requires a numeric field")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Environment;

    fn env_with(field: &str, value: Value) -> Environment {
        [(field.to_string(), value)].into_iter().collect()
    }

    #[test]
    fn count_ignores_its_environment() {
        let agg = AggregateExpr::count();
        let mut acc = agg.init;
        for _ in 0..3 {
            acc = (agg.step)(&acc, &env_with("x", Value::Int(0))).unwrap();
        }
        assert_eq!((agg.finalize)(&acc), Value::Int(3));
    }

    #[test]
    fn sum_accumulates_across_steps() {
        let agg = AggregateExpr::sum("n");
        let mut acc = agg.init;
        for v in [1, 2, 3] {
            acc = (agg.step)(&acc, &env_with("n", Value::Int(v))).unwrap();
        }
        assert_eq!((agg.finalize)(&acc), Value::Int(6));
    }

    #[test]
    fn avg_finalizes_to_zero_with_no_input() {
        let agg = AggregateExpr::avg("n");
        assert_eq!((agg.finalize)(&agg.init), Value::Float(0.0));
    }

    #[test]
    fn avg_computes_the_mean() {
        let agg = AggregateExpr::avg("n");
        let mut acc = agg.init;
        for v in [2, 4, 6] {
            acc = (agg.step)(&acc, &env_with("n", Value::Int(v))).unwrap();
        }
        assert_eq!((agg.finalize)(&acc), Value::Float(4.0));
    }

    #[test]
    fn min_and_max_track_extremes() {
        let min = AggregateExpr::min("n");
        let max = AggregateExpr::max("n");
        let mut min_acc = min.init;
        let mut max_acc = max.init.clone();
        for v in [5, 1, 9, 3] {
            min_acc = (min.step)(&min_acc, &env_with("n", Value::Int(v))).unwrap();
            max_acc = (max.step)(&max_acc, &env_with("n", Value::Int(v))).unwrap();
        }
        assert_eq!((min.finalize)(&min_acc), Value::Int(1));
        assert_eq!((max.finalize)(&max_acc), Value::Int(9));
    }
}

fn ordering(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Int(l), Value::Int(r)) => Ok(l.cmp(r)),
        (Value::Char(l), Value::Char(r)) => Ok(l.cmp(r)),
        (Value::Float(l), Value::Float(r)) => l
            .partial_cmp(r)
            .ok_or_else(|| EngineError::evaluation("NaN is not orderable")),
        _ => Err(EngineError::evaluation(
            "min()/max() requires comparable values of matching type",
        )),
    }
}
