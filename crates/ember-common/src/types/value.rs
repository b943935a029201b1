//! Runtime values for statement parameters and mapped results.
//!
//! This module defines the `Value` type, the dynamic representation of
//! everything that flows through the executor: bound parameter values,
//! parameter objects, and the objects produced by row mapping.

use std::fmt;
use std::hash::{Hash, Hasher};

use super::record::{CloneMap, ObjectRef, Record};
use crate::constants::NULL_HASH;

/// The exact runtime type of a [`Value`].
///
/// Type-handler lookups are keyed by this type, so two objects of
/// different record types are distinct even when their fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    /// NULL value.
    Null,
    /// Boolean value.
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    BigInt,
    /// 64-bit floating point.
    Double,
    /// String value.
    String,
    /// Binary data.
    Bytes,
    /// Ordered list of values.
    List,
    /// Record of the named type.
    Object(String),
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Null => write!(f, "null"),
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Int => write!(f, "int"),
            ValueType::BigInt => write!(f, "bigint"),
            ValueType::Double => write!(f, "double"),
            ValueType::String => write!(f, "string"),
            ValueType::Bytes => write!(f, "bytes"),
            ValueType::List => write!(f, "list"),
            ValueType::Object(name) => write!(f, "{}", name),
        }
    }
}

/// A dynamically typed value.
///
/// Equality is exact: values of different variants never compare equal,
/// and doubles compare by bit pattern so that `Value` can be used inside
/// hashed keys.
#[derive(Debug, Clone)]
pub enum Value {
    /// NULL value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    BigInt(i64),
    /// 64-bit floating point.
    Double(f64),
    /// String value.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Shared, mutable record.
    Object(ObjectRef),
}

impl Value {
    /// Creates a new record value of the given type.
    pub fn object<K, I>(type_name: impl Into<String>, fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut record = Record::new(type_name);
        for (name, value) in fields {
            record.set(name, value);
        }
        Value::Object(ObjectRef::new(record))
    }

    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the exact runtime type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Int(_) => ValueType::Int,
            Value::BigInt(_) => ValueType::BigInt,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::List(_) => ValueType::List,
            Value::Object(obj) => ValueType::Object(obj.type_name()),
        }
    }

    /// Returns the shared record if this value is an object.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Returns the elements if this value is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the string slice if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts this value to an i64 if it is an integer.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::BigInt(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns a copy in which every nested record is duplicated.
    ///
    /// A plain `clone` shares records with the original; a deep clone is a
    /// snapshot that later writes to the original cannot reach.
    pub fn deep_clone(&self) -> Self {
        self.deep_clone_in(&mut CloneMap::new())
    }

    pub(crate) fn deep_clone_in(&self, copies: &mut CloneMap) -> Self {
        match self {
            Value::List(items) => {
                Value::List(items.iter().map(|item| item.deep_clone_in(copies)).collect())
            }
            Value::Object(obj) => Value::Object(obj.deep_clone_in(copies)),
            other => other.clone(),
        }
    }

    /// Returns a hash that is stable across processes and platforms.
    ///
    /// Strings hash over their UTF-16 code units, and byte strings and
    /// lists hash element-wise in order, so equal values always produce
    /// the same hash. NULL hashes to [`NULL_HASH`].
    pub fn stable_hash(&self) -> i32 {
        match self {
            Value::Null => NULL_HASH,
            Value::Boolean(b) => {
                if *b {
                    1231
                } else {
                    1237
                }
            }
            Value::Int(i) => *i,
            Value::BigInt(i) => fold_i64(*i),
            Value::Double(d) => fold_i64(d.to_bits() as i64),
            Value::String(s) => s
                .encode_utf16()
                .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit))),
            Value::Bytes(bytes) => bytes.iter().fold(1i32, |h, b| {
                h.wrapping_mul(31).wrapping_add(i32::from(*b as i8))
            }),
            Value::List(items) => items.iter().fold(1i32, |h, item| {
                h.wrapping_mul(31).wrapping_add(item.stable_hash())
            }),
            Value::Object(obj) => obj.read_recursive().stable_hash(),
        }
    }

    /// Hash of a value held in a record field: nested records contribute
    /// their type name only.
    pub(crate) fn member_hash(&self) -> i32 {
        match self {
            Value::Object(obj) => Value::String(obj.type_name()).stable_hash(),
            Value::List(items) => items.iter().fold(1i32, |h, item| {
                h.wrapping_mul(31).wrapping_add(item.member_hash())
            }),
            other => other.stable_hash(),
        }
    }
}

/// Folds a 64-bit value into 32 bits by xoring the halves.
#[inline]
fn fold_i64(v: i64) -> i32 {
    (v ^ ((v as u64) >> 32) as i64) as i32
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        state.write_i32(self.stable_hash());
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::BigInt(i) => write!(f, "{}", i),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(bytes) => {
                write!(f, "0x")?;
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(obj) => write!(f, "{}", obj.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
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

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert_eq!(Value::Null.value_type(), ValueType::Null);
        assert_eq!(Value::from(5).value_type(), ValueType::Int);
        assert_eq!(Value::from(5i64).value_type(), ValueType::BigInt);
        assert_eq!(
            Value::object("User", [("id", Value::from(1))]).value_type(),
            ValueType::Object("User".to_string())
        );
    }

    #[test]
    fn test_exact_equality() {
        assert_eq!(Value::from(5), Value::Int(5));
        assert_ne!(Value::Int(5), Value::BigInt(5));
        assert_ne!(Value::Null, Value::from(""));
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
    }

    #[test]
    fn test_stable_hash() {
        // Matches the well-known 31-based string hash.
        assert_eq!(Value::from("hello").stable_hash(), 99_162_322);
        assert_eq!(Value::from("").stable_hash(), 0);
        assert_eq!(Value::Null.stable_hash(), NULL_HASH);
        assert_eq!(Value::from(true).stable_hash(), 1231);
        assert_eq!(Value::from(42).stable_hash(), 42);
        assert_eq!(Value::from(1i64 << 32).stable_hash(), 1);
    }

    #[test]
    fn test_element_wise_hash() {
        let a = Value::Bytes(vec![1, 2, 3]);
        let b = Value::Bytes(vec![3, 2, 1]);
        assert_ne!(a.stable_hash(), b.stable_hash());
        assert_eq!(a.stable_hash(), Value::Bytes(vec![1, 2, 3]).stable_hash());

        let list = Value::List(vec![Value::from(1), Value::from("x")]);
        assert_eq!(
            list.stable_hash(),
            Value::List(vec![Value::from(1), Value::from("x")]).stable_hash()
        );
    }

    #[test]
    fn test_deep_clone_detaches_records() {
        let original = Value::object("User", [("name", Value::from("ada"))]);
        let shallow = original.clone();
        let snapshot = original.deep_clone();

        original
            .as_object()
            .unwrap()
            .set("name", Value::from("grace"));

        assert_eq!(
            shallow.as_object().unwrap().get("name"),
            Some(Value::from("grace"))
        );
        assert_eq!(
            snapshot.as_object().unwrap().get("name"),
            Some(Value::from("ada"))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Bytes(vec![0xab, 0x01]).to_string(), "0xab01");
        assert_eq!(
            Value::List(vec![Value::from(1), Value::from("a")]).to_string(),
            "[1, a]"
        );
    }
}
