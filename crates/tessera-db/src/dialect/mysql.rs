//! MySQL and MariaDB.

use super::pagination::{self, PageWindow};
use super::{quote_with, DialectSettings};
use crate::query::assembly::ParameterStyle;
use crate::query::expr::DatePart;
use crate::value::SqlType;

/// MySQL has no "unbounded" limit; the largest unsigned value stands in.
const UNBOUNDED: &str = "18446744073709551615";

/// MySQL: backtick identifiers, native `LIMIT`.
///
/// `legacy_limit` switches to `LIMIT skip, take`. `positional_parameters`
/// emits `?` placeholders for drivers without named parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql {
    legacy_limit: bool,
    positional_parameters: bool,
}

impl MySql {
    #[must_use]
    pub const fn with_legacy_limit(mut self, enabled: bool) -> Self {
        self.legacy_limit = enabled;
        self
    }

    #[must_use]
    pub const fn with_positional_parameters(mut self, enabled: bool) -> Self {
        self.positional_parameters = enabled;
        self
    }
}

impl DialectSettings for MySql {
    fn name(&self) -> &'static str {
        "MySql"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["mysql", "mariadb"]
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '`', '`')
    }

    fn parameter_style(&self) -> ParameterStyle {
        if self.positional_parameters {
            ParameterStyle::Positional
        } else {
            ParameterStyle::Named('?')
        }
    }

    fn substring_fn(&self) -> &'static str {
        "SUBSTRING"
    }

    fn index_of_fn(&self) -> &'static str {
        "LOCATE"
    }

    fn length_fn(&self) -> &'static str {
        "CHAR_LENGTH"
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn date_part(&self, part: DatePart, expr: &str) -> String {
        format!("{}({expr})", part.keyword().to_uppercase())
    }

    fn now(&self) -> &'static str {
        "NOW()"
    }

    fn cast_type(&self, ty: &SqlType) -> Option<&'static str> {
        Some(match ty {
            SqlType::Bool | SqlType::Int | SqlType::Enum(_) => "SIGNED",
            SqlType::Float => "DOUBLE",
            SqlType::String | SqlType::Uuid => "CHAR",
            SqlType::Date => "DATE",
            SqlType::DateTime => "DATETIME",
            SqlType::Time => "TIME",
            SqlType::Bytes => "BINARY",
            SqlType::Json => "JSON",
            SqlType::List(_) => return None,
        })
    }

    fn identity_select(&self) -> &'static str {
        "SELECT LAST_INSERT_ID()"
    }

    fn limit_clause(&self, window: PageWindow) -> Option<String> {
        if self.legacy_limit {
            pagination::legacy_limit(window, UNBOUNDED)
        } else {
            pagination::limit_offset(window, UNBOUNDED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(MySql::default().quote_identifier("users"), "`users`");
        assert_eq!(MySql::default().quote_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn test_limit_styles() {
        let window = PageWindow::new(Some(5), 10);
        assert_eq!(
            MySql::default().limit_clause(window).as_deref(),
            Some("LIMIT 5 OFFSET 10")
        );
        assert_eq!(
            MySql::default().with_legacy_limit(true).limit_clause(window).as_deref(),
            Some("LIMIT 10, 5")
        );
        assert_eq!(
            MySql::default().limit_clause(PageWindow::new(None, 10)).as_deref(),
            Some("LIMIT 18446744073709551615 OFFSET 10")
        );
    }

    #[test]
    fn test_convert_and_dates() {
        let mysql = MySql::default();
        assert_eq!(mysql.convert("x", &SqlType::Int).unwrap(), "CAST(x AS SIGNED)");
        assert_eq!(mysql.date_part(DatePart::Year, "x"), "YEAR(x)");
        assert_eq!(mysql.concat(&["a".into(), "b".into()]), "CONCAT(a, b)");
    }

    #[test]
    fn test_parameter_style() {
        assert_eq!(MySql::default().parameter_style(), ParameterStyle::Named('?'));
        assert_eq!(
            MySql::default().with_positional_parameters(true).parameter_style(),
            ParameterStyle::Positional
        );
    }
}
