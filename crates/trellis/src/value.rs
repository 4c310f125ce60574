//! Dynamically typed field values.
//!
//! Rows and nodes store their fields as [`Value`]s so a single source type
//! can hold records of any shape.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A field value held by a row or node.
///
/// `Value::None` doubles as the default missing-value sentinel for fields a
/// raw record did not supply.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// No value.
    #[default]
    None,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// An ordered group of values, e.g. an `(icon, text)` pair.
    List(Vec<Value>),
    /// Any other shared value (type-erased).
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Creates custom data from any type.
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Value::Custom(Arc::new(value))
    }

    /// Returns `true` if this is `Value::None`.
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Returns `true` if this contains some data.
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Attempts to get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Attempts to get the value as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to get the value as a float. Integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Attempts to get the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to get the value as a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Total ordering used for sorting by field.
    ///
    /// `None` sorts first, then booleans, numbers (integers and floats
    /// compared by value), strings, lists (element-wise) and custom values,
    /// which all compare equal to each other.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(value: &Value) -> u8 {
            match value {
                Value::None => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) => 2,
                Value::String(_) => 3,
                Value::List(_) => 4,
                Value::Custom(_) => 5,
            }
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.total_cmp(y) {
                        Ordering::Equal => continue,
                        unequal => return unequal,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => match (self.as_float(), other.as_float()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => rank(self).cmp(&rank(other)),
            },
        }
    }

    /// Attempts to downcast custom data.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Custom(any) => any.downcast_ref::<T>(),
            _ => None,
        }
    }
}

/// Equality is structural, except for custom values, which compare by
/// identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Custom(a), Value::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            // Keep a decimal point on whole floats ("7.0", not "7").
            Value::Float(n) => write!(f, "{n:?}"),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Value::Custom(_) => f.write_str("<custom>"),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_none() {
        assert!(Value::default().is_none());
        assert!(Value::from(3).is_some());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        assert_eq!(Value::from(7).as_int(), Some(7));
        assert_eq!(Value::from(7).as_float(), Some(7.0));
        assert_eq!(Value::from(2.5).as_float(), Some(2.5));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from("abc").as_int(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::None.to_string(), "");
        assert_eq!(Value::from(7.0).to_string(), "7.0");
        assert_eq!(Value::from(8.25).to_string(), "8.25");
        assert_eq!(Value::from(1999).to_string(), "1999");
        assert_eq!(
            Value::from(vec![Value::from("icon"), Value::from("text")]).to_string(),
            "(icon, text)"
        );
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::from(2), Value::from(2.0));
        assert_ne!(Value::from("2"), Value::from(2));
        let shared = Value::custom(vec![1u8, 2, 3]);
        assert_eq!(shared, shared.clone());
        assert_ne!(shared, Value::custom(vec![1u8, 2, 3]));
    }

    #[test]
    fn test_total_cmp() {
        assert_eq!(Value::from(7.5).total_cmp(&Value::from(8)), Ordering::Less);
        assert_eq!(Value::from(9).total_cmp(&Value::from(8.9)), Ordering::Greater);
        assert_eq!(Value::from("b").total_cmp(&Value::from("a")), Ordering::Greater);
        assert_eq!(Value::None.total_cmp(&Value::from(0)), Ordering::Less);
        assert_eq!(Value::from("1").total_cmp(&Value::from(2)), Ordering::Greater);
        assert_eq!(
            Value::from(vec![Value::from(1), Value::from(2)]).total_cmp(&Value::from(vec![Value::from(1)])),
            Ordering::Greater
        );
    }

    #[test]
    fn test_custom_downcast() {
        let value = Value::custom(42u16);
        assert_eq!(value.downcast_ref::<u16>(), Some(&42));
        assert_eq!(value.downcast_ref::<u32>(), None);
    }

    #[test]
    fn test_from_option() {
        assert!(Value::from(None::<i64>).is_none());
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
