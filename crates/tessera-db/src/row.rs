//! Result rows handed back by the execution layer.

use tessera_core::{TesseraError, TesseraResult};

use crate::value::Value;

/// A row of named values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from column names and values of equal length.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> TesseraResult<Self> {
        if columns.len() != values.len() {
            return Err(TesseraError::DatabaseError(format!(
                "row has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    pub fn get<T: FromValue>(&self, column: &str) -> TesseraResult<T> {
        let value = self.get_value(column).ok_or_else(|| {
            TesseraError::DatabaseError(format!("Column '{column}' not found in row"))
        })?;
        T::from_value(value)
    }

    /// Gets a typed value by column index.
    pub fn get_by_index<T: FromValue>(&self, idx: usize) -> TesseraResult<T> {
        let value = self.values.get(idx).ok_or_else(|| {
            TesseraError::DatabaseError(format!(
                "Column index {idx} out of bounds (row has {} columns)",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Returns the raw value of a column.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }
}

/// Conversion from a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> TesseraResult<Self>;
}

fn expected(what: &str, value: &Value) -> TesseraError {
    TesseraError::DatabaseError(format!("Expected {what}, got {value:?}"))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> TesseraResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(Self::from(*b)),
            _ => Err(expected("Int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> TesseraResult<Self> {
        let wide = i64::from_value(value)?;
        Self::try_from(wide).map_err(|e| {
            TesseraError::DatabaseError(format!("Int value out of i32 range: {e}"))
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> TesseraResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Ok(*i as Self),
            _ => Err(expected("Float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> TesseraResult<Self> {
        // SQLite and MySQL hand booleans back as 0/1 integers.
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            _ => Err(expected("Bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> TesseraResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(expected("String", value)),
        }
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: &Value) -> TesseraResult<Self> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::String(s) => s
                .parse()
                .map_err(|e| TesseraError::DatabaseError(format!("Invalid UUID '{s}': {e}"))),
            _ => Err(expected("Uuid", value)),
        }
    }
}

impl FromValue for chrono::NaiveDate {
    fn from_value(value: &Value) -> TesseraResult<Self> {
        match value {
            Value::Date(d) => Ok(*d),
            Value::String(s) => Self::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| TesseraError::DatabaseError(format!("Invalid date '{s}': {e}"))),
            _ => Err(expected("Date", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> TesseraResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> TesseraResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}
