//! Microsoft SQL Server.

use tessera_core::TesseraResult;

use super::pagination::{self, PageWindow, SelectParts};
use super::{quote_with, DialectSettings};
use crate::query::assembly::ParameterStyle;
use crate::query::expr::DatePart;
use crate::value::SqlType;

/// SQL Server: `[bracket]` identifiers, `@name` parameters, `TOP` and
/// `ROW_NUMBER()` paging.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServer;

impl DialectSettings for SqlServer {
    fn name(&self) -> &'static str {
        "SqlServer"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["mssql", "sqlserver", "sql_server", "tsql"]
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '[', ']')
    }

    fn parameter_style(&self) -> ParameterStyle {
        ParameterStyle::Named('@')
    }

    fn substring_fn(&self) -> &'static str {
        "SUBSTRING"
    }

    fn substring_requires_length(&self) -> bool {
        true
    }

    fn index_of_fn(&self) -> &'static str {
        "CHARINDEX"
    }

    fn length_fn(&self) -> &'static str {
        "LEN"
    }

    fn trim(&self, expr: &str) -> String {
        format!("LTRIM(RTRIM({expr}))")
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("({})", parts.join(" + "))
    }

    fn null_replacement_fn(&self) -> &'static str {
        "ISNULL"
    }

    fn date_part(&self, part: DatePart, expr: &str) -> String {
        format!("DATEPART({}, {expr})", part.keyword())
    }

    fn now(&self) -> &'static str {
        "GETDATE()"
    }

    fn cast_type(&self, ty: &SqlType) -> Option<&'static str> {
        Some(match ty {
            SqlType::Bool => "BIT",
            SqlType::Int | SqlType::Enum(_) => "BIGINT",
            SqlType::Float => "FLOAT",
            SqlType::String | SqlType::Json => "NVARCHAR(MAX)",
            SqlType::Date => "DATE",
            SqlType::DateTime => "DATETIME2",
            SqlType::Time => "TIME",
            SqlType::Uuid => "UNIQUEIDENTIFIER",
            SqlType::Bytes => "VARBINARY(MAX)",
            SqlType::List(_) => return None,
        })
    }

    fn convert(&self, expr: &str, ty: &SqlType) -> TesseraResult<String> {
        let target = self.cast_type(ty).ok_or_else(|| {
            tessera_core::TesseraError::UnsupportedExpression(format!(
                "SqlServer has no conversion to {ty}"
            ))
        })?;
        Ok(format!("CONVERT({target}, {expr})"))
    }

    fn identity_select(&self) -> &'static str {
        "SELECT SCOPE_IDENTITY()"
    }

    fn limit_clause(&self, _window: PageWindow) -> Option<String> {
        None
    }

    fn render_select(&self, parts: &SelectParts, window: PageWindow) -> TesseraResult<String> {
        match (window.take, window.skip) {
            (None, 0) => Ok(pagination::plain(parts)),
            (Some(take), 0) => Ok(pagination::top(parts, take)),
            _ => pagination::row_number(parts, window),
        }
    }
}
