use crate::types::DataType;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Field {
    Null,
    Boolean(bool),
    Integer(i32),
    Float(f32),
    String(String),
}

impl PartialEq for Field {
    fn eq(&self, other: &Field) -> bool {
        match (self, other) {
            (Field::Null, Field::Null) => true,
            (Field::Boolean(b), Field::Boolean(b2)) => b == b2,
            (Field::Integer(i), Field::Integer(i2)) => i == i2,
            // match on NaN as well as equality
            (Field::Float(f), Field::Float(f2)) => (f == f2) || (f.is_nan() && f2.is_nan()),
            (Field::String(s), Field::String(s2)) => s == s2,
            _ => false,
        }
    }
}

impl Eq for Field {} // implement Eq trait for Field, uses PartialEq

impl std::hash::Hash for Field {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Field::Null => {}
            Field::Boolean(b) => b.hash(state),
            Field::Integer(i) => i.hash(state),
            Field::Float(f) => {
                if f.is_nan() {
                    0.hash(state);
                } else if *f == 0.0 {
                    // -0.0 == 0.0
                    0.0f32.to_bits().hash(state);
                } else {
                    f.to_bits().hash(state);
                }
            }
            Field::String(s) => s.hash(state),
        }
    }
}

// for use in sorting
impl Ord for Field {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Field::Null, Field::Null) => Ordering::Equal,
            (Field::Null, _) => Ordering::Less,
            (_, Field::Null) => Ordering::Greater,
            (Field::Boolean(b), Field::Boolean(b2)) => b.cmp(b2),
            (Field::Integer(i), Field::Integer(i2)) => i.cmp(i2),

            (Field::Float(f), Field::Float(f2)) => match (f.is_nan(), f2.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => f.partial_cmp(f2).unwrap_or(Ordering::Equal),
            },
            (Field::String(s), Field::String(s2)) => s.cmp(s2),
            (Field::Boolean(_), _) => Ordering::Less,
            (Field::Integer(_), Field::Boolean(_)) => Ordering::Greater,
            (Field::Integer(_), _) => Ordering::Less,
            (Field::Float(_), Field::Boolean(_)) => Ordering::Greater,
            (Field::Float(_), Field::Integer(_)) => Ordering::Greater,
            (Field::Float(_), _) => Ordering::Less,
            (Field::String(_), _) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(true) => f.write_str("TRUE"),
            Self::Boolean(false) => f.write_str("FALSE"),
            Self::Integer(integer) => integer.fmt(f),
            Self::Float(float) => write!(f, "{float:?}"),
            Self::String(string) => write!(f, "'{}'", string.escape_debug()),
        }
    }
}

impl From<f32> for Field {
    fn from(v: f32) -> Self {
        Field::Float(v)
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Integer(v)
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::String(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::String(v.to_owned())
    }
}

impl From<bool> for Field {
    fn from(v: bool) -> Self {
        Field::Boolean(v)
    }
}

impl Field {
    // default constructor
    pub fn new(d: DataType) -> Field {
        match d {
            DataType::Bool => Field::from(false),
            DataType::Int => Field::from(0i32),
            DataType::Float => Field::from(0.0),
            DataType::Text => Field::from("".to_string()),
            DataType::Invalid => Field::Null,
        }
    }

    /// The value's plain text form (strings unquoted), used as hash input.
    pub fn as_key_text(&self) -> String {
        match self {
            Field::String(s) => s.clone(),
            // -0.0 == 0.0, so both must hash alike
            Field::Float(f) if *f == 0.0 => "0.0".to_string(),
            other => other.to_string(),
        }
    }

    /// Returns true if the value is undefined (NULL or NaN).
    pub fn is_undefined(&self) -> bool {
        *self == Self::Null || matches!(self, Self::Float(f) if f.is_nan())
    }

    /// Equality as seen by a join predicate: undefined values never match,
    /// not even themselves.
    pub fn join_eq(&self, other: &Field) -> bool {
        !self.is_undefined() && !other.is_undefined() && self == other
    }
}
