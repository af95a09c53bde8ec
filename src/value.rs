use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// Insertion-ordered map used for plist dictionaries.
///
/// The binary format writes key and value references in parallel, positionally
/// correlated order, so dictionary iteration must be deterministic.
pub type Dict = IndexMap<String, Value>;

/// A single plist value.
///
/// The model is a closed union: every value a plist can carry is one of these
/// variants. Equality is structural for all of them - byte-wise for [`Data`],
/// deep for [`Array`] and [`Dict`].
///
/// [`Data`]: Value::Data
/// [`Array`]: Value::Array
/// [`Dict`]: Value::Dict
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Date(DateTime<Utc>),
    Data(Vec<u8>),
    String(String),
    Array(Vec<Value>),
    Dict(Dict),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Value::Real(_))
    }

    pub fn is_date(&self) -> bool {
        matches!(self, Value::Date(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Value::Data(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_dict(&self) -> bool {
        matches!(self, Value::Dict(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Value::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Data(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Dict> for Value {
    fn from(v: Dict) -> Self {
        Value::Dict(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%SZ")),
            Value::String(v) => write!(f, "{v}"),
            Value::Data(bytes) => {
                write!(f, "[")?;
                for (i, b) in bytes.iter().take(8).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{b}")?;
                }
                if bytes.len() > 8 {
                    write!(f, ", ...")?;
                }
                write!(f, "]")
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Dict(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_equality_is_by_content() {
        let a = Value::Data(vec![1, 2, 3]);
        let b = Value::Data(vec![1, 2, 3]);
        let c = Value::Data(vec![1, 2, 4]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_dict_equality_is_deep() {
        let mut first = Dict::new();
        first.insert("nested".to_string(), Value::Array(vec![Value::Int(1)]));
        let mut second = Dict::new();
        second.insert("nested".to_string(), Value::Array(vec![Value::Int(1)]));
        assert_eq!(Value::Dict(first), Value::Dict(second));
    }

    #[test]
    fn test_dict_preserves_insertion_order() {
        let mut map = Dict::new();
        map.insert("zebra".to_string(), Value::Int(1));
        map.insert("apple".to_string(), Value::Int(2));
        map.insert("mango".to_string(), Value::Int(3));
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zebra", "apple", "mango"]);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Int(7).as_str(), None);
        assert_eq!(Value::String("x".to_string()).as_str(), Some("x"));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Real(1.5).as_real(), Some(1.5));
        assert_eq!(Value::Data(vec![9]).as_data(), Some(&[9u8][..]));
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(false).is_null());
    }

    #[test]
    fn test_predicates() {
        assert!(Value::Bool(true).is_bool());
        assert!(Value::Int(0).is_int());
        assert!(Value::Real(0.0).is_real());
        assert!(Value::String(String::new()).is_string());
        assert!(Value::Data(Vec::new()).is_data());
        assert!(Value::Array(Vec::new()).is_array());
        assert!(Value::Dict(Dict::new()).is_dict());
        assert!(Value::Date(DateTime::from_timestamp(0, 0).unwrap()).is_date());
        assert!(!Value::Int(0).is_real());
        assert!(!Value::Null.is_string());
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(Value::from(42i64), Value::Int(42));
        assert_eq!(Value::from(42i32), Value::Int(42));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(2.5), Value::Real(2.5));
        assert_eq!(Value::from("s"), Value::String("s".to_string()));
        assert_eq!(Value::from(vec![0u8, 1]), Value::Data(vec![0, 1]));
    }

    #[test]
    fn test_display() {
        let mut map = Dict::new();
        map.insert("k".to_string(), Value::Array(vec![Value::Int(1), Value::Bool(true)]));
        assert_eq!(Value::Dict(map).to_string(), "{k:[1,true]}");
        assert_eq!(Value::Data(vec![1, 2]).to_string(), "[1, 2]");
        assert_eq!(Value::Null.to_string(), "null");
    }
}
