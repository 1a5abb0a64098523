use std::collections::HashMap;

use super::{EngineError, Record, Type, Value};

/// A name→value mapping used for predicate and expression evaluation.
pub type Environment = HashMap<String, Value>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// An ordered list of named, fixed-width typed fields. Two schemas are
/// *equivalent* iff their type sequences match; names may differ (needed
/// for union compatibility), but name equality is still required for
/// attribute lookup within a tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Type-sequence equality, ignoring field names.
    pub fn matches(&self, other: &Schema) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.ty == b.ty)
    }

    /// Concatenates the fields of two schemas, requiring disjoint names.
    pub fn concat(&self, other: &Schema) -> Result<Schema, EngineError> {
        for lhs in &self.fields {
            if other.fields.iter().any(|rhs| rhs.name == lhs.name) {
                return Err(EngineError::schema(format!(
                    "overlapping field name in join inputs: {}",
                    lhs.name
                )));
            }
        }
        let mut fields = self.fields.clone();
        fields.extend(other.fields.clone());
        Ok(Schema::new(fields))
    }

    fn width(&self) -> usize {
        self.fields.iter().map(|f| f.ty.width()).sum()
    }

    /// Packs a `Record` into its fixed-width byte representation.
    pub fn pack(&self, record: &Record) -> Result<Vec<u8>, EngineError> {
        if record.values.len() != self.fields.len() {
            return Err(EngineError::evaluation(
                "record arity does not match schema",
            ));
        }

        let mut bytes = Vec::with_capacity(self.width());
        for (field, value) in self.fields.iter().zip(record.values.iter()) {
            match (&field.ty, value) {
                (Type::Int, Value::Int(v)) => bytes.extend_from_slice(&v.to_le_bytes()),
                (Type::Float, Value::Float(v)) => bytes.extend_from_slice(&v.to_bits().to_le_bytes()),
                (Type::Char(n), Value::Char(v)) => {
                    let mut buf = vec![0u8; *n];
                    let src = v.as_bytes();
                    let len = src.len().min(*n);
                    buf[..len].copy_from_slice(&src[..len]);
                    bytes.extend_from_slice(&buf);
                }
                _ => {
                    return Err(EngineError::evaluation(format!(
                        "type mismatch packing field '{}'",
                        field.name
                    )))
                }
            }
        }
        Ok(bytes)
    }

    /// Unpacks raw bytes into a `Record`, per this schema's field layout.
    pub fn unpack(&self, bytes: &[u8]) -> Result<Record, EngineError> {
        if bytes.len() != self.width() {
            return Err(EngineError::evaluation(
                "packed tuple length does not match schema width",
            ));
        }

        let mut values = Vec::with_capacity(self.fields.len());
        let mut offset = 0;
        for field in &self.fields {
            let width = field.ty.width();
            let slice = &bytes[offset..offset + width];
            let value = match field.ty {
                Type::Int => Value::Int(i64::from_le_bytes(slice.try_into().unwrap())),
                Type::Float => Value::Float(f64::from_bits(u64::from_le_bytes(
                    slice.try_into().unwrap(),
                ))),
                Type::Char(_) => {
                    let end = slice.iter().position(|b| *b == 0).unwrap_or(slice.len());
                    Value::Char(String::from_utf8_lossy(&slice[..end]).into_owned())
                }
            };
            values.push(value);
            offset += width;
        }
        Ok(Record::new(values))
    }

    /// Builds a `Record` from loose values, checking type agreement.
    pub fn instantiate(&self, values: Vec<Value>) -> Result<Record, EngineError> {
        if values.len() != self.fields.len() {
            return Err(EngineError::evaluation(
                "value count does not match schema arity",
            ));
        }
        Ok(Record::new(values))
    }

    /// Unpacks `bytes` and builds the name→value environment used for
    /// predicate and expression evaluation.
    pub fn environment(&self, bytes: &[u8]) -> Result<Environment, EngineError> {
        let record = self.unpack(bytes)?;
        Ok(self
            .fields
            .iter()
            .zip(record.values)
            .map(|(field, value)| (field.name.clone(), value))
            .collect())
    }
}
