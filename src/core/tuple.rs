use std::fmt::Display;

use super::Value;

/// An unpacked tuple: a positional sequence of values, in schema field order.
/// Field-name lookup happens via `Schema::environment`, not here.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn project(&self, indices: &[usize]) -> Record {
        Record::new(indices.iter().map(|i| self.values[*i].clone()).collect())
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered = self
            .values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{rendered}")
    }
}

/// A packed tuple is just its raw bytes; layout is determined by a `Schema`.
pub type PackedTuple = Vec<u8>;
