//! SQL dialects.
//!
//! A [`DialectSettings`] implementation answers every dialect-specific
//! question the compiler asks: identifier quoting, parameter placeholders,
//! function names, literal forms and pagination. A [`Dialect`] pairs those
//! settings with the ordered list of function visitors consulted before the
//! built-in catalogue.
//!
//! Visitors are registered during start-up. The list freezes the first time
//! a compilation reads it; registering afterwards is a configuration error.
//!
//! Dialects are looked up by provider name through a [`DialectRegistry`].

pub mod mysql;
pub mod pagination;
pub mod sqlite;
pub mod sqlserver;

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tessera_core::{Settings, TesseraError, TesseraResult};

use crate::query::assembly::ParameterStyle;
use crate::query::expr::DatePart;
use crate::query::functions::{default_visitors, FunctionVisitor};
use crate::value::SqlType;

pub use mysql::MySql;
pub use pagination::{PageWindow, SelectParts};
pub use sqlite::Sqlite;
pub use sqlserver::SqlServer;

/// Dialect-specific answers used by the walker and the command visitors.
pub trait DialectSettings: fmt::Debug + Send + Sync {
    /// The canonical provider name (`SqlServer`, `MySql`, `Sqlite`).
    fn name(&self) -> &'static str;

    /// Other names the provider is known by, compared case-insensitively.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Quotes an identifier, escaping the closing quote character.
    fn quote_identifier(&self, ident: &str) -> String;

    fn parameter_style(&self) -> ParameterStyle;

    fn substring_fn(&self) -> &'static str;

    /// `true` when the substring function needs an explicit length.
    fn substring_requires_length(&self) -> bool {
        false
    }

    /// The 1-based "position of needle in haystack" function.
    fn index_of_fn(&self) -> &'static str;

    /// `true` when the function takes `(haystack, needle)` instead of
    /// `(needle, haystack)`.
    fn index_of_swapped(&self) -> bool {
        false
    }

    fn length_fn(&self) -> &'static str;

    fn trim(&self, expr: &str) -> String {
        format!("TRIM({expr})")
    }

    fn concat(&self, parts: &[String]) -> String;

    /// The two-argument null replacement function.
    fn null_replacement_fn(&self) -> &'static str {
        "IFNULL"
    }

    fn date_part(&self, part: DatePart, expr: &str) -> String;

    fn now(&self) -> &'static str;

    /// The cast target for a static type, if the dialect has one.
    fn cast_type(&self, ty: &SqlType) -> Option<&'static str>;

    /// Converts `expr` to `ty`.
    fn convert(&self, expr: &str, ty: &SqlType) -> TesseraResult<String> {
        let target = self.cast_type(ty).ok_or_else(|| {
            TesseraError::UnsupportedExpression(format!(
                "{} has no conversion to {ty}",
                self.name()
            ))
        })?;
        Ok(format!("CAST({expr} AS {target})"))
    }

    /// The statement appended to an insert to read the generated key back.
    fn identity_select(&self) -> &'static str;

    /// The native trailing limit clause for a window, if any.
    fn limit_clause(&self, window: PageWindow) -> Option<String> {
        pagination::limit_offset(window, "-1")
    }

    /// Assembles a select from its rendered clauses and applies the window.
    fn render_select(&self, parts: &SelectParts, window: PageWindow) -> TesseraResult<String> {
        Ok(pagination::with_limit(
            parts,
            self.limit_clause(window).as_deref(),
        ))
    }
}

/// A dialect: settings plus the function visitor list.
pub struct Dialect {
    settings: Box<dyn DialectSettings>,
    pending: Mutex<Vec<Arc<dyn FunctionVisitor>>>,
    frozen: OnceLock<Vec<Arc<dyn FunctionVisitor>>>,
}

impl Dialect {
    pub fn new(settings: impl DialectSettings + 'static) -> Self {
        Self {
            settings: Box::new(settings),
            pending: Mutex::new(Vec::new()),
            frozen: OnceLock::new(),
        }
    }

    pub fn settings(&self) -> &dyn DialectSettings {
        self.settings.as_ref()
    }

    /// Registers a function visitor. User visitors are consulted before the
    /// defaults, in registration order.
    pub fn add_visitor(&self, visitor: Arc<dyn FunctionVisitor>) -> TesseraResult<()> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if self.frozen.get().is_some() {
            return Err(TesseraError::ConfigurationError(format!(
                "cannot register function visitor '{}' on {}: the visitor list is frozen once compilation has started",
                visitor.name(),
                self.name()
            )));
        }
        tracing::debug!(dialect = self.name(), visitor = visitor.name(), "registered function visitor");
        pending.push(visitor);
        Ok(())
    }

    /// The frozen visitor list. The first call freezes it.
    pub fn visitors(&self) -> &[Arc<dyn FunctionVisitor>] {
        if let Some(frozen) = self.frozen.get() {
            return frozen;
        }
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        self.frozen.get_or_init(|| {
            let mut all = pending.clone();
            all.extend(default_visitors());
            all
        })
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    /// `true` if `provider` names this dialect or one of its aliases.
    pub fn answers_to(&self, provider: &str) -> bool {
        self.name().eq_ignore_ascii_case(provider)
            || self
                .aliases()
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(provider))
    }
}

impl Deref for Dialect {
    type Target = dyn DialectSettings;

    fn deref(&self) -> &Self::Target {
        self.settings.as_ref()
    }
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialect")
            .field("settings", &self.settings)
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

/// Provider-name lookup of dialects.
#[derive(Debug, Clone, Default)]
pub struct DialectRegistry {
    dialects: Vec<Arc<Dialect>>,
}

impl DialectRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// SQL Server, MySQL (modern `LIMIT`, named parameters) and SQLite.
    pub fn with_defaults() -> Self {
        Self::from_settings(&Settings::default())
    }

    /// The three built-in dialects with the MySQL flags taken from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let mysql = MySql::default()
            .with_legacy_limit(settings.mysql_legacy_limit)
            .with_positional_parameters(settings.mysql_positional_parameters);
        Self {
            dialects: vec![
                Arc::new(Dialect::new(SqlServer)),
                Arc::new(Dialect::new(mysql)),
                Arc::new(Dialect::new(Sqlite)),
            ],
        }
    }

    /// Adds a dialect. Fails if its name or an alias is already taken.
    pub fn register(&mut self, dialect: Dialect) -> TesseraResult<Arc<Dialect>> {
        let names = std::iter::once(dialect.name()).chain(dialect.aliases().iter().copied());
        for name in names {
            if let Some(existing) = self.dialects.iter().find(|d| d.answers_to(name)) {
                return Err(TesseraError::ConfigurationError(format!(
                    "provider name '{name}' is already registered by {}",
                    existing.name()
                )));
            }
        }
        let dialect = Arc::new(dialect);
        self.dialects.push(Arc::clone(&dialect));
        Ok(dialect)
    }

    /// Looks a dialect up by provider name or alias, case-insensitively.
    pub fn get(&self, provider: &str) -> TesseraResult<Arc<Dialect>> {
        self.dialects
            .iter()
            .find(|d| d.answers_to(provider.trim()))
            .map(Arc::clone)
            .ok_or_else(|| {
                TesseraError::ConfigurationError(format!(
                    "unknown provider '{provider}'; known providers: {}",
                    self.providers().join(", ")
                ))
            })
    }

    /// Canonical names of the registered dialects.
    pub fn providers(&self) -> Vec<&'static str> {
        self.dialects.iter().map(|d| d.name()).collect()
    }
}

/// Doubles every occurrence of `close` and wraps the identifier.
pub(crate) fn quote_with(ident: &str, open: char, close: char) -> String {
    let mut quoted = String::with_capacity(ident.len() + 2);
    quoted.push(open);
    for c in ident.chars() {
        if c == close {
            quoted.push(close);
        }
        quoted.push(c);
    }
    quoted.push(close);
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::compiler::Walker;
    use crate::query::expr::CallExpr;

    #[derive(Debug)]
    struct Noop;

    impl FunctionVisitor for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn can_resolve(&self, _call: &CallExpr, _dialect: &dyn DialectSettings) -> bool {
            false
        }

        fn visit(&self, _walker: &mut Walker<'_>, _call: &CallExpr) -> TesseraResult<()> {
            Ok(())
        }
    }

    // ── registry ────────────────────────────────────────────────────

    #[test]
    fn test_lookup_is_case_insensitive_with_aliases() {
        let registry = DialectRegistry::with_defaults();
        assert_eq!(registry.get("sqlserver").unwrap().name(), "SqlServer");
        assert_eq!(registry.get("MSSQL").unwrap().name(), "SqlServer");
        assert_eq!(registry.get("mariadb").unwrap().name(), "MySql");
        assert_eq!(registry.get("SQLite3").unwrap().name(), "Sqlite");
    }

    #[test]
    fn test_unknown_provider() {
        let err = DialectRegistry::with_defaults().get("Oracle").unwrap_err();
        assert_eq!(err.code(), "configuration");
        assert!(err.to_string().contains("SqlServer, MySql, Sqlite"));
    }

    #[test]
    fn test_register_rejects_taken_names() {
        let mut registry = DialectRegistry::with_defaults();
        let err = registry.register(Dialect::new(Sqlite)).unwrap_err();
        assert_eq!(err.code(), "configuration");
        assert_eq!(DialectRegistry::new().providers().len(), 0);
    }

    #[test]
    fn test_from_settings_applies_mysql_flags() {
        let settings = Settings {
            mysql_legacy_limit: true,
            mysql_positional_parameters: true,
            ..Settings::default()
        };
        let mysql = DialectRegistry::from_settings(&settings).get("mysql").unwrap();
        assert_eq!(mysql.parameter_style(), ParameterStyle::Positional);
        assert_eq!(
            mysql.limit_clause(PageWindow::new(Some(5), 10)).as_deref(),
            Some("LIMIT 10, 5")
        );
    }

    // ── visitors ────────────────────────────────────────────────────

    #[test]
    fn test_user_visitors_precede_defaults() {
        let dialect = Dialect::new(SqlServer);
        dialect.add_visitor(Arc::new(Noop)).unwrap();
        let names: Vec<&str> = dialect.visitors().iter().map(|v| v.name()).collect();
        assert_eq!(names[0], "noop");
        assert!(names.len() > 1);
    }

    #[test]
    fn test_registration_after_freeze_fails() {
        let dialect = Dialect::new(Sqlite);
        assert!(!dialect.is_frozen());
        let _ = dialect.visitors();
        assert!(dialect.is_frozen());
        let err = dialect.add_visitor(Arc::new(Noop)).unwrap_err();
        assert_eq!(err.code(), "configuration");
    }

    #[test]
    fn test_concurrent_freeze_sees_one_list() {
        let dialect = Arc::new(Dialect::new(MySql::default()));
        dialect.add_visitor(Arc::new(Noop)).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = Arc::clone(&dialect);
                std::thread::spawn(move || d.visitors().len())
            })
            .collect();
        let lens: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(lens.windows(2).all(|w| w[0] == w[1]));
    }

    // ── quoting ─────────────────────────────────────────────────────

    #[test]
    fn test_quote_with_doubles_close() {
        assert_eq!(quote_with("a]b", '[', ']'), "[a]]b]");
        assert_eq!(quote_with("a`b", '`', '`'), "`a``b`");
        assert_eq!(quote_with("a\"b", '"', '"'), "\"a\"\"b\"");
    }
}
