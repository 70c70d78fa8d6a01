//! SQLite.

use super::{quote_with, DialectSettings};
use crate::query::assembly::ParameterStyle;
use crate::query::expr::DatePart;
use crate::value::SqlType;

/// SQLite: double-quoted identifiers, `@name` parameters, `LIMIT/OFFSET`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl DialectSettings for Sqlite {
    fn name(&self) -> &'static str {
        "Sqlite"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["sqlite", "sqlite3"]
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"', '"')
    }

    fn parameter_style(&self) -> ParameterStyle {
        ParameterStyle::Named('@')
    }

    fn substring_fn(&self) -> &'static str {
        "SUBSTR"
    }

    fn index_of_fn(&self) -> &'static str {
        "INSTR"
    }

    fn index_of_swapped(&self) -> bool {
        true
    }

    fn length_fn(&self) -> &'static str {
        "LENGTH"
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("({})", parts.join(" || "))
    }

    fn date_part(&self, part: DatePart, expr: &str) -> String {
        let code = match part {
            DatePart::Year => "%Y",
            DatePart::Month => "%m",
            DatePart::Day => "%d",
            DatePart::Hour => "%H",
            DatePart::Minute => "%M",
            DatePart::Second => "%S",
        };
        format!("CAST(strftime('{code}', {expr}) AS INTEGER)")
    }

    fn now(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn cast_type(&self, ty: &SqlType) -> Option<&'static str> {
        Some(match ty {
            SqlType::Bool | SqlType::Int | SqlType::Enum(_) => "INTEGER",
            SqlType::Float => "REAL",
            SqlType::String
            | SqlType::Uuid
            | SqlType::Date
            | SqlType::DateTime
            | SqlType::Time
            | SqlType::Json => "TEXT",
            SqlType::Bytes => "BLOB",
            SqlType::List(_) => return None,
        })
    }

    fn identity_select(&self) -> &'static str {
        "SELECT last_insert_rowid()"
    }
}
