//! Property values and descriptor property bags.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::hash::hash_one;

/// Property bag of a descriptor. Iteration order is insertion order, which the
/// structural hash depends on.
pub type Props = IndexMap<Rc<str>, Value>;

/// Property naming the identity key of a keyed collection child.
pub const KEY_PROP: &str = "key";
/// Property naming a ref registered on the rendering component.
pub const REF_PROP: &str = "ref";

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
}

impl Value {
    /// Structural hash of this value. Floats hash by bit pattern so any
    /// representable value has a stable hash.
    pub fn hash_code(&self) -> u64 {
        match self {
            Value::Null => hash_one(&0u8),
            Value::Bool(b) => hash_one(&(1u8, *b)),
            Value::Int(v) => hash_one(&(2u8, *v)),
            Value::Float(v) => hash_one(&(3u8, v.to_bits())),
            Value::Str(s) => hash_one(&(4u8, &**s)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v.as_str()))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Builds a [`Props`] map in insertion order.
#[macro_export]
macro_rules! props {
    () => { $crate::Props::new() };
    ($($name:literal => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Props::new();
        $(map.insert(::std::rc::Rc::from($name), $crate::Value::from($value));)+
        map
    }};
}
