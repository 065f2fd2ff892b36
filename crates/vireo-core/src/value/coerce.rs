#![forbid(unsafe_code)]

//! Coercion table and operator semantics for untyped values.
//!
//! The rules follow the usual dynamic-language behavior:
//!
//! | Operation        | Rule                                                         |
//! |------------------|--------------------------------------------------------------|
//! | truthiness       | `undefined null false 0 -0 NaN ""` are falsy                  |
//! | ToNumber         | undefined→NaN, null→0, bool→0/1, string→trimmed parse ("" → 0) |
//! | ToString         | JS number formatting, arrays join with `,`                   |
//! | `+`              | concatenation if either side is a string or non-function reference |
//! | `- * / %`        | IEEE arithmetic on ToNumber                                  |
//! | relational       | two strings compare lexicographically, else ToNumber          |
//! | `===`            | same variant and equal; references by identity; NaN ≠ NaN    |
//! | `==`             | `null == undefined`, primitives via ToNumber, references by identity |

use std::cmp::Ordering;

use super::Value;

/// Format a number the way a dynamic language prints it.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Convert a number to an array index if it is a non-negative integer.
#[must_use]
pub fn number_to_index(n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64 {
        Some(n as usize)
    } else {
        None
    }
}

fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust accepts "inf"/"nan" spellings that must stay NaN here.
        other if other.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => {
            f64::NAN
        }
        other => other.parse::<f64>().unwrap_or(f64::NAN),
    }
}

impl Value {
    /// ToBoolean.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// ToNumber.
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => parse_number(s),
            Self::Array(a) => match a.len() {
                0 => 0.0,
                1 => a.get(0).to_number(),
                _ => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    /// ToString.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.to_string(),
            Self::Array(a) => a
                .to_vec()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Map(_) => "[object Map]".to_string(),
            Self::Set(_) => "[object Set]".to_string(),
            Self::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
        }
    }

    /// String form used by interpolation: nullish values render empty.
    #[must_use]
    pub fn to_interpolation_string(&self) -> String {
        if self.is_nullish() {
            String::new()
        } else {
            self.to_display_string()
        }
    }

    /// `typeof` result.
    #[must_use]
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) => "function",
            Self::Null | Self::Object(_) | Self::Array(_) | Self::Map(_) | Self::Set(_) => "object",
        }
    }

    /// `===`.
    #[must_use]
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            (Self::Map(a), Self::Map(b)) => a.ptr_eq(b),
            (Self::Set(a), Self::Set(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// SameValue: like `===` but `NaN` equals itself. Used for change detection.
    #[must_use]
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// `==`.
    #[must_use]
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (a, b) if a.is_reference() && b.is_reference() => a.strict_equals(b),
            (Self::String(a), Self::String(b)) => a == b,
            (a, Self::String(s)) if a.is_reference() => a.to_display_string() == **s,
            (Self::String(s), b) if b.is_reference() => **s == b.to_display_string(),
            (a, b) => {
                let (x, y) = (a.to_number(), b.to_number());
                x == y
            }
        }
    }

    /// Binary `+`.
    #[must_use]
    pub fn add(&self, other: &Value) -> Value {
        let concatenates = |v: &Value| {
            matches!(v, Self::String(_)) || (v.is_reference() && !v.is_function())
        };
        if concatenates(self) || concatenates(other) {
            let mut s = self.to_display_string();
            s.push_str(&other.to_display_string());
            Value::from(s)
        } else {
            Value::Number(self.to_number() + other.to_number())
        }
    }

    #[must_use]
    pub fn subtract(&self, other: &Value) -> Value {
        Value::Number(self.to_number() - other.to_number())
    }

    #[must_use]
    pub fn multiply(&self, other: &Value) -> Value {
        Value::Number(self.to_number() * other.to_number())
    }

    #[must_use]
    pub fn divide(&self, other: &Value) -> Value {
        Value::Number(self.to_number() / other.to_number())
    }

    /// `%` with the sign of the dividend (Rust `%` on f64 already does this).
    #[must_use]
    pub fn remainder(&self, other: &Value) -> Value {
        Value::Number(self.to_number() % other.to_number())
    }

    /// Relational comparison; `None` when the operands are unordered (NaN).
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            _ => self.to_number().partial_cmp(&other.to_number()),
        }
    }

    /// `key in self`.
    #[must_use]
    pub fn has_key(&self, key: &Value) -> bool {
        match (self, key) {
            (Self::Array(a), Self::Number(n)) => number_to_index(*n).is_some_and(|i| i < a.len()),
            _ => self.has_property(&key.to_display_string()),
        }
    }

    /// `self instanceof ctor`: class tag match against the function name.
    #[must_use]
    pub fn instance_of(&self, ctor: &Value) -> bool {
        let Some(func) = ctor.as_function() else {
            return false;
        };
        let name = func.name();
        let name: &str = &name;
        match self {
            Self::Object(o) => name == "Object" || o.class_name().is_some_and(|c| &**c == name),
            Self::Array(_) => name == "Array" || name == "Object",
            Self::Map(_) => name == "Map" || name == "Object",
            Self::Set(_) => name == "Set" || name == "Object",
            Self::Function(_) => name == "Function" || name == "Object",
            _ => false,
        }
    }
}
