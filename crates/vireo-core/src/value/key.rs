#![forbid(unsafe_code)]

//! SameValueZero keys for maps and sets.

use std::hash::{Hash, Hasher};

use super::Value;

/// A [`Value`] usable as a hash key.
///
/// Equality is SameValueZero: `NaN` equals `NaN`, `0` equals `-0`, strings
/// compare by content and reference kinds by identity.
#[derive(Clone, Debug)]
pub struct Key(Value);

impl Key {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_value(&other.0)
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Undefined => 0u8.hash(state),
            Value::Null => 1u8.hash(state),
            Value::Bool(b) => {
                2u8.hash(state);
                b.hash(state);
            }
            Value::Number(n) => {
                3u8.hash(state);
                let bits = if *n == 0.0 {
                    0u64
                } else if n.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::String(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Value::Object(o) => {
                5u8.hash(state);
                o.id().hash(state);
            }
            Value::Array(a) => {
                5u8.hash(state);
                a.id().hash(state);
            }
            Value::Map(m) => {
                5u8.hash(state);
                m.id().hash(state);
            }
            Value::Set(s) => {
                5u8.hash(state);
                s.id().hash(state);
            }
            Value::Function(f) => {
                5u8.hash(state);
                f.id().hash(state);
            }
        }
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
