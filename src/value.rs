use std::cmp::Ordering;
use std::fmt;

use integer_encoding::FixedInt;

use crate::error::{Result, Status, StatusCode};
use crate::types::RowID;

/// The scalar types the filter core evaluates over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Boolean,
    Integer,
    Float,
    Varchar,
    RowId,
}

/// A single scalar value. `Null` is typeless; all other variants carry their
/// `LogicalType`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Varchar(String),
    RowId(RowID),
}

impl Value {
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(LogicalType::Boolean),
            Value::Int(_) => Some(LogicalType::Integer),
            Value::Float(_) => Some(LogicalType::Float),
            Value::Varchar(_) => Some(LogicalType::Varchar),
            Value::RowId(_) => Some(LogicalType::RowId),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Orders two non-null values of the same logical type. Floats use the
    /// IEEE total order so the result is a proper `Ordering`.
    pub fn compare_same_type(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Ok(a.total_cmp(b)),
            (Value::Varchar(a), Value::Varchar(b)) => Ok(a.cmp(b)),
            (Value::RowId(a), Value::RowId(b)) => Ok(a.cmp(b)),
            _ => Err(Status::new(
                StatusCode::TypeMismatch,
                &format!("cannot compare {:?} with {:?}", self, other),
            )),
        }
    }

    /// Serializes the value into the byte string probed against the bloom
    /// filter of a segment summary. The encoding is tagged by type so equal
    /// bit patterns of different types do not collide.
    pub fn encode_for_hash(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => out.push(0),
            Value::Bool(b) => {
                out.push(1);
                out.push(*b as u8);
            }
            Value::Int(i) => {
                out.push(2);
                out.extend_from_slice(&i.encode_fixed_vec());
            }
            Value::Float(f) => {
                out.push(3);
                out.extend_from_slice(&f.to_bits().encode_fixed_vec());
            }
            Value::Varchar(s) => {
                out.push(4);
                out.extend_from_slice(s.as_bytes());
            }
            Value::RowId(r) => {
                out.push(5);
                out.extend_from_slice(&r.to_u64().encode_fixed_vec());
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Varchar(s) => write!(f, "'{}'", s),
            Value::RowId(r) => write!(f, "{}", r),
        }
    }
}
