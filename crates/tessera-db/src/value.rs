//! Backend-agnostic values and the static types constants are formatted by.
//!
//! Every constant in a query tree carries a [`SqlType`] fixed when the tree is
//! built. The walker never guesses a type from the runtime value; it calls
//! [`Value::coerce`] to normalize the value to its declared type before binding
//! it as a parameter.

use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_core::{TesseraError, TesseraResult};

/// A backend-agnostic representation of a database value.
///
/// # Examples
///
/// ```
/// use tessera_db::value::Value;
///
/// assert_eq!(Value::from(42_i64), Value::Int(42));
/// assert_eq!(Value::from("hello"), Value::String("hello".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw binary data.
    Bytes(Vec<u8>),
    /// A date without time.
    Date(chrono::NaiveDate),
    /// A date and time without timezone.
    DateTime(chrono::NaiveDateTime),
    /// A date and time in UTC.
    DateTimeTz(chrono::DateTime<chrono::Utc>),
    /// A time without date.
    Time(chrono::NaiveTime),
    /// A UUID value.
    Uuid(uuid::Uuid),
    /// A JSON document.
    Json(serde_json::Value),
    /// A list of values, only valid as the collection of a `Contains` call.
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::DateTimeTz(dt) => write!(f, "{dt}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Json(j) => write!(f, "{j}"),
            Self::List(vals) => {
                write!(f, "[")?;
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ── From implementations ───────────────────────────────────────────────

macro_rules! value_from {
    ($($ty:ty => $variant:ident via $conv:expr),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant($conv(v))
                }
            }
        )*
    };
}

value_from! {
    bool => Bool via std::convert::identity,
    i16 => Int via i64::from,
    i32 => Int via i64::from,
    i64 => Int via std::convert::identity,
    u32 => Int via i64::from,
    f32 => Float via f64::from,
    f64 => Float via std::convert::identity,
    String => String via std::convert::identity,
    Vec<u8> => Bytes via std::convert::identity,
    chrono::NaiveDate => Date via std::convert::identity,
    chrono::NaiveDateTime => DateTime via std::convert::identity,
    chrono::DateTime<chrono::Utc> => DateTimeTz via std::convert::identity,
    chrono::NaiveTime => Time via std::convert::identity,
    uuid::Uuid => Uuid via std::convert::identity,
    serde_json::Value => Json via std::convert::identity,
    Vec<Value> => List via std::convert::identity,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl Value {
    /// Returns `true` if this value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to extract a boolean value.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integer value.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to extract a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The static type a constant built from this value gets when the caller
    /// does not declare one. `Null` has no natural type and yields `None`.
    pub fn natural_type(&self) -> Option<SqlType> {
        Some(match self {
            Self::Null => return None,
            Self::Bool(_) => SqlType::Bool,
            Self::Int(_) => SqlType::Int,
            Self::Float(_) => SqlType::Float,
            Self::String(_) => SqlType::String,
            Self::Bytes(_) => SqlType::Bytes,
            Self::Date(_) => SqlType::Date,
            Self::DateTime(_) | Self::DateTimeTz(_) => SqlType::DateTime,
            Self::Time(_) => SqlType::Time,
            Self::Uuid(_) => SqlType::Uuid,
            Self::Json(_) => SqlType::Json,
            Self::List(items) => SqlType::List(Box::new(
                items
                    .iter()
                    .find_map(Self::natural_type)
                    .unwrap_or(SqlType::String),
            )),
        })
    }

    /// Normalizes this value to the given static type.
    ///
    /// `Null` fits every type. Widening conversions are applied (`Int` to
    /// `Float`, `Date` to `DateTime` at midnight, `DateTime` to `Date`), `Int`
    /// becomes `Bool` only for 0 and 1, and enums accept their integer or
    /// string representation. Anything else is an unsupported constant.
    pub fn coerce(&self, ty: &SqlType) -> TesseraResult<Self> {
        let mismatch = || {
            TesseraError::UnsupportedExpression(format!(
                "constant {self:?} does not fit its static type {ty}"
            ))
        };

        Ok(match (self, ty) {
            (Self::Null, _) => Self::Null,
            (Self::Bool(_), SqlType::Bool)
            | (Self::Int(_), SqlType::Int)
            | (Self::Float(_), SqlType::Float)
            | (Self::String(_), SqlType::String)
            | (Self::Bytes(_), SqlType::Bytes)
            | (Self::Date(_), SqlType::Date)
            | (Self::DateTime(_) | Self::DateTimeTz(_), SqlType::DateTime)
            | (Self::Time(_), SqlType::Time)
            | (Self::Uuid(_), SqlType::Uuid)
            | (Self::Json(_), SqlType::Json)
            | (Self::Int(_) | Self::String(_), SqlType::Enum(_)) => self.clone(),
            (Self::Int(i @ (0 | 1)), SqlType::Bool) => Self::Bool(*i == 1),
            #[allow(clippy::cast_precision_loss)]
            (Self::Int(i), SqlType::Float) => Self::Float(*i as f64),
            (Self::Date(d), SqlType::DateTime) => Self::DateTime(d.and_time(chrono::NaiveTime::MIN)),
            (Self::DateTime(dt), SqlType::Date) => Self::Date(dt.date()),
            (Self::DateTimeTz(dt), SqlType::Date) => Self::Date(dt.date_naive()),
            (Self::List(items), SqlType::List(inner)) => Self::List(
                items
                    .iter()
                    .map(|item| item.coerce(inner))
                    .collect::<TesseraResult<Vec<_>>>()?,
            ),
            _ => return Err(mismatch()),
        })
    }
}

/// The static result type of a constant or column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Bool,
    Int,
    Float,
    String,
    Date,
    DateTime,
    Time,
    Uuid,
    Bytes,
    Json,
    /// A named enumeration stored as its integer or string representation.
    Enum(String),
    /// A homogeneous list (the collection side of `Contains`).
    List(Box<SqlType>),
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::String => f.write_str("string"),
            Self::Date => f.write_str("date"),
            Self::DateTime => f.write_str("datetime"),
            Self::Time => f.write_str("time"),
            Self::Uuid => f.write_str("uuid"),
            Self::Bytes => f.write_str("bytes"),
            Self::Json => f.write_str("json"),
            Self::Enum(name) => write!(f, "enum {name}"),
            Self::List(inner) => write!(f, "list<{inner}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── conversions ─────────────────────────────────────────────────

    #[test]
    fn test_from_primitives() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42_i32), Value::Int(42));
        assert_eq!(Value::from(42_u32), Value::Int(42));
        assert_eq!(Value::from(1.5_f64), Value::Float(1.5));
        assert_eq!(Value::from("x"), Value::String("x".into()));
        assert_eq!(Value::from(vec![1_u8, 2]), Value::Bytes(vec![1, 2]));
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(Some(7_i64)), Value::Int(7));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_string(), "<3 bytes>");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
    }

    #[test]
    fn test_natural_type() {
        assert_eq!(Value::Int(1).natural_type(), Some(SqlType::Int));
        assert_eq!(Value::Null.natural_type(), None);
        assert_eq!(
            Value::List(vec![Value::Null, Value::String("a".into())]).natural_type(),
            Some(SqlType::List(Box::new(SqlType::String)))
        );
    }

    // ── coerce ──────────────────────────────────────────────────────

    #[test]
    fn test_coerce_identity_and_null() {
        assert_eq!(Value::Int(3).coerce(&SqlType::Int).unwrap(), Value::Int(3));
        assert_eq!(Value::Null.coerce(&SqlType::Date).unwrap(), Value::Null);
    }

    #[test]
    fn test_coerce_widening() {
        assert_eq!(Value::Int(2).coerce(&SqlType::Float).unwrap(), Value::Float(2.0));
        let d = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            Value::Date(d).coerce(&SqlType::DateTime).unwrap(),
            Value::DateTime(d.and_hms_opt(0, 0, 0).unwrap())
        );
        let dt = d.and_hms_opt(13, 5, 0).unwrap();
        assert_eq!(Value::DateTime(dt).coerce(&SqlType::Date).unwrap(), Value::Date(d));
    }

    #[test]
    fn test_coerce_int_to_bool_only_for_zero_and_one() {
        assert_eq!(Value::Int(1).coerce(&SqlType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(Value::Int(0).coerce(&SqlType::Bool).unwrap(), Value::Bool(false));
        assert!(Value::Int(2).coerce(&SqlType::Bool).is_err());
    }

    #[test]
    fn test_coerce_enum() {
        let ty = SqlType::Enum("Status".into());
        assert!(Value::Int(2).coerce(&ty).is_ok());
        assert!(Value::String("Active".into()).coerce(&ty).is_ok());
        assert!(Value::Float(1.0).coerce(&ty).is_err());
    }

    #[test]
    fn test_coerce_list_elementwise() {
        let ty = SqlType::List(Box::new(SqlType::Float));
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Float(2.5)]).coerce(&ty).unwrap(),
            Value::List(vec![Value::Float(1.0), Value::Float(2.5)])
        );
        let err = Value::List(vec![Value::String("x".into())]).coerce(&ty).unwrap_err();
        assert_eq!(err.code(), "unsupported_expression");
    }

    #[test]
    fn test_coerce_mismatch_names_type() {
        let err = Value::String("abc".into()).coerce(&SqlType::Int).unwrap_err();
        assert!(err.to_string().contains("int"));
    }
}
