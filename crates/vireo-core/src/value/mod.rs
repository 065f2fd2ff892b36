#![forbid(unsafe_code)]

//! Dynamic values evaluated and observed by the runtime.
//!
//! # Design
//!
//! [`Value`] is a cheap-to-clone tagged enum. Primitive variants are stored
//! inline; reference variants ([`ObjectRef`], [`ArrayRef`], [`MapRef`],
//! [`SetRef`], [`FunctionRef`]) are `Rc` handles compared by identity.
//!
//! Mutation of reference values goes through explicit methods
//! ([`ObjectRef::set`], [`ArrayRef::push`], ...). Those methods consult the
//! observer attached to the receiver, which is how the observer layer sees
//! writes without rewriting properties.
//!
//! # Invariants
//!
//! 1. Cloning a reference variant never copies the referenced data.
//! 2. `strict_equals` on reference variants is pointer identity.
//! 3. Reads never notify; only writes through the mutation methods do.

mod coerce;
mod collections;
mod function;
mod key;
mod object;

use std::fmt;
use std::rc::Rc;

pub use coerce::{format_number, number_to_index};
pub use collections::{ArrayRef, MapRef, SetRef, WeakArrayRef, WeakMapRef, WeakSetRef};
pub use function::{FunctionRef, NativeFn};
pub use key::Key;
pub use object::{
    Accessor, Getter, ObjectRef, Property, PropertyReader, Setter, Untracked, WeakObjectRef,
};

use crate::error::Result;
use crate::flags::LifecycleFlags;

/// A dynamically typed runtime value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    Array(ArrayRef),
    Map(MapRef),
    Set(SetRef),
    Function(FunctionRef),
}

impl Value {
    /// Build a string value.
    #[must_use]
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Rc::from(s.as_ref()))
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    #[must_use]
    pub fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// Whether the value is a reference kind that can own properties.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::Object(_) | Self::Array(_) | Self::Map(_) | Self::Set(_) | Self::Function(_)
        )
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read a named property (getters run untracked).
    ///
    /// Arrays expose `length` and numeric indices, strings expose `length`,
    /// maps and sets expose `size`, functions expose `name`.
    #[must_use]
    pub fn get_property(&self, key: &str) -> Value {
        match self {
            Self::Object(o) => o.get(key),
            Self::Array(a) => {
                if key == "length" {
                    Value::Number(a.len() as f64)
                } else if let Some(index) = key.parse::<usize>().ok() {
                    a.get(index)
                } else {
                    Value::Undefined
                }
            }
            Self::String(s) if key == "length" => Value::Number(s.encode_utf16().count() as f64),
            Self::Map(m) if key == "size" => Value::Number(m.len() as f64),
            Self::Set(s) if key == "size" => Value::Number(s.len() as f64),
            Self::Function(f) if key == "name" => Value::string(f.name()),
            _ => Value::Undefined,
        }
    }

    /// Read `self[key]`.
    #[must_use]
    pub fn get_keyed(&self, key: &Value) -> Value {
        match (self, key) {
            (Self::Array(a), Value::Number(n)) => match number_to_index(*n) {
                Some(index) => a.get(index),
                None => Value::Undefined,
            },
            (Self::String(s), Value::Number(n)) => match number_to_index(*n) {
                Some(index) => s
                    .chars()
                    .nth(index)
                    .map_or(Value::Undefined, |c| Value::string(c.to_string())),
                None => Value::Undefined,
            },
            _ => self.get_property(&key.to_display_string()),
        }
    }

    /// Write a named property, routing through any attached observer.
    ///
    /// Writes to primitives are ignored, as in loose dynamic-language mode.
    pub fn set_property(&self, key: &str, value: Value, flags: LifecycleFlags) -> Result<()> {
        match self {
            Self::Object(o) => o.set(key, value, flags),
            Self::Array(a) if key == "length" => match number_to_index(value.to_number()) {
                Some(len) => a.set_length(len, flags),
                None => Ok(()),
            },
            Self::Array(a) => match key.parse::<usize>() {
                Ok(index) => a.set_index(index, value, flags),
                Err(_) => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Write `self[key] = value`.
    pub fn set_keyed(&self, key: &Value, value: Value, flags: LifecycleFlags) -> Result<()> {
        match (self, key) {
            (Self::Array(a), Value::Number(n)) => match number_to_index(*n) {
                Some(index) => a.set_index(index, value, flags),
                None => Ok(()),
            },
            _ => self.set_property(&key.to_display_string(), value, flags),
        }
    }

    /// Whether `key` names an own property (used by `in` and scope lookup).
    #[must_use]
    pub fn has_property(&self, key: &str) -> bool {
        match self {
            Self::Object(o) => o.has(key),
            Self::Array(a) => key == "length" || key.parse::<usize>().is_ok_and(|i| i < a.len()),
            Self::Map(_) | Self::Set(_) => key == "size",
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Object(o) => write!(f, "{o:?}"),
            Self::Array(a) => write!(f, "{a:?}"),
            Self::Map(m) => write!(f, "{m:?}"),
            Self::Set(s) => write!(f, "{s:?}"),
            Self::Function(func) => write!(f, "{func:?}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Structural helper for tests and converters: `strict_equals`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Self::Object(o)
    }
}

impl From<ArrayRef> for Value {
    fn from(a: ArrayRef) -> Self {
        Self::Array(a)
    }
}

impl From<MapRef> for Value {
    fn from(m: MapRef) -> Self {
        Self::Map(m)
    }
}

impl From<SetRef> for Value {
    fn from(s: SetRef) -> Self {
        Self::Set(s)
    }
}

impl From<FunctionRef> for Value {
    fn from(f: FunctionRef) -> Self {
        Self::Function(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Undefined, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_reads_on_builtins() {
        let arr = ArrayRef::from_values(vec![1.into(), 2.into()]);
        let v = Value::Array(arr);
        assert_eq!(v.get_property("length"), Value::Number(2.0));
        assert_eq!(v.get_property("1"), Value::Number(2.0));
        assert_eq!(v.get_keyed(&Value::Number(0.0)), Value::Number(1.0));
        assert!(v.get_keyed(&Value::Number(1.5)).is_undefined());
        assert_eq!(Value::from("héllo").get_property("length"), Value::Number(5.0));
    }

    #[test]
    fn writes_to_primitives_are_ignored() {
        let v = Value::Number(3.0);
        assert!(v.set_property("x", 1.into(), LifecycleFlags::empty()).is_ok());
        assert!(v.get_property("x").is_undefined());
    }

    #[test]
    fn has_property_for_objects_and_arrays() {
        let obj = ObjectRef::new();
        obj.insert("a", 1.into());
        let v = Value::Object(obj);
        assert!(v.has_property("a"));
        assert!(!v.has_property("b"));
        let arr = Value::Array(ArrayRef::from_values(vec![Value::Null]));
        assert!(arr.has_property("0"));
        assert!(!arr.has_property("1"));
    }
}
