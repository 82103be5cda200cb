//! # Bound Values
//!
//! The parameter type carried by specifications and primary keys.
//!
//! ## SQLite Storage Classes
//! ```text
//! ┌──────────────────┬──────────────────────────────────────────────┐
//! │ Value            │ Stored as                                    │
//! ├──────────────────┼──────────────────────────────────────────────┤
//! │ Null             │ NULL                                         │
//! │ Bool             │ INTEGER (0 / 1)                              │
//! │ Int              │ INTEGER                                      │
//! │ Float            │ REAL                                         │
//! │ Text             │ TEXT  (also UUIDs and RFC 3339 timestamps)   │
//! │ Bytes            │ BLOB                                         │
//! └──────────────────┴──────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single bound parameter.
///
/// Serializes untagged, so `Value::Int(3)` becomes `3` in JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true for the "unset" values: `Null`, `Int(0)` and empty text.
    ///
    /// A model whose primary key is zero has not been persisted yet.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Int(i) => *i == 0,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

macro_rules! int_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

int_from!(i8, i16, i32, i64, u8, u16, u32);

/// Unsigned keys wider than 32 bits. SQLite integers are signed 64-bit, so
/// anything above `i64::MAX` is passed as its decimal text and matches no
/// INTEGER row.
macro_rules! wide_unsigned_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    match i64::try_from(v) {
                        Ok(i) => Value::Int(i),
                        Err(_) => Value::Text(v.to_string()),
                    }
                }
            }
        )*
    };
}

wide_unsigned_from!(u64, usize);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Text(v.to_string())
    }
}

/// Timestamps are stored as RFC 3339 text, which sqlx decodes back into
/// `DateTime<Utc>`.
impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Text(v.to_rfc3339())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
