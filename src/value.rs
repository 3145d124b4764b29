//! Value model shared by every backend.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A cacheable value.
///
/// Backends store and return `CacheValue`s; the configured serializer turns
/// them into bytes where a backend needs bytes. Typed data goes through
/// [`CacheValue::from_serialize`] and [`CacheValue::deserialize_into`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<CacheValue>),
    Map(BTreeMap<String, CacheValue>),
}

impl CacheValue {
    /// Convert any serializable value through its JSON representation.
    ///
    /// # Errors
    /// Returns a serialization error if `T` is not JSON-representable.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(CacheValue::from(serde_json::to_value(value)?))
    }

    /// Convert back into a typed value.
    ///
    /// # Errors
    /// Returns a serialization error if the value holds bytes or does not
    /// match `T`.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T> {
        let json = self.to_json()?;
        Ok(serde_json::from_value(json)?)
    }

    /// JSON form of the value. Bytes and non-finite floats have none.
    pub fn to_json(&self) -> Result<Value> {
        Ok(match self {
            CacheValue::Null => Value::Null,
            CacheValue::Bool(b) => Value::Bool(*b),
            CacheValue::Int(i) => Value::Number((*i).into()),
            CacheValue::Float(f) => Number::from_f64(*f).map(Value::Number).ok_or_else(|| {
                Error::serialization(format!("float {} is not JSON-representable", f))
            })?,
            CacheValue::Text(s) => Value::String(s.clone()),
            CacheValue::Bytes(_) => {
                return Err(Error::serialization(
                    "byte strings are not JSON-representable; use the binary or bytes serializer",
                ))
            }
            CacheValue::List(items) => {
                Value::Array(items.iter().map(|v| v.to_json()).collect::<Result<_>>()?)
            }
            CacheValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CacheValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CacheValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CacheValue::Null)
    }
}

impl From<Value> for CacheValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CacheValue::Null,
            Value::Bool(b) => CacheValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CacheValue::Int(i),
                None => CacheValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => CacheValue::Text(s),
            Value::Array(items) => CacheValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                CacheValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<bool> for CacheValue {
    fn from(b: bool) -> Self {
        CacheValue::Bool(b)
    }
}

impl From<i64> for CacheValue {
    fn from(i: i64) -> Self {
        CacheValue::Int(i)
    }
}

impl From<i32> for CacheValue {
    fn from(i: i32) -> Self {
        CacheValue::Int(i.into())
    }
}

impl From<u32> for CacheValue {
    fn from(i: u32) -> Self {
        CacheValue::Int(i.into())
    }
}

impl From<f64> for CacheValue {
    fn from(f: f64) -> Self {
        CacheValue::Float(f)
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        CacheValue::Text(s.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        CacheValue::Text(s)
    }
}

impl From<&[u8]> for CacheValue {
    fn from(b: &[u8]) -> Self {
        CacheValue::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for CacheValue {
    fn from(b: &[u8; N]) -> Self {
        CacheValue::Bytes(b.to_vec())
    }
}

impl From<Vec<CacheValue>> for CacheValue {
    fn from(items: Vec<CacheValue>) -> Self {
        CacheValue::List(items)
    }
}

impl From<BTreeMap<String, CacheValue>> for CacheValue {
    fn from(map: BTreeMap<String, CacheValue>) -> Self {
        CacheValue::Map(map)
    }
}

impl<T: Into<CacheValue>> From<Option<T>> for CacheValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CacheValue::Null)
    }
}

/// String form used by the `string` serializer.
///
/// Text renders verbatim, bytes render lossily as UTF-8, containers render
/// as JSON-like text.
impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheValue::Null => f.write_str("null"),
            CacheValue::Bool(b) => write!(f, "{}", b),
            CacheValue::Int(i) => write!(f, "{}", i),
            CacheValue::Float(x) => write!(f, "{}", x),
            CacheValue::Text(s) => f.write_str(s),
            CacheValue::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            CacheValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_nested(f, item)?;
                }
                f.write_str("]")
            }
            CacheValue::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: ", k)?;
                    write_nested(f, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_nested(f: &mut fmt::Formatter<'_>, value: &CacheValue) -> fmt::Result {
    match value {
        CacheValue::Text(s) => write!(f, "{:?}", s),
        other => write!(f, "{}", other),
    }
}
