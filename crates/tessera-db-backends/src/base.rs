//! The executor trait and helpers shared by every backend.
//!
//! The compiler stops at an [`EmittedCommand`]. A [`CommandExecutor`] takes
//! it from there: it binds the parameters in the command's
//! [`ParameterStyle`], runs the SQL and maps result rows to [`Row`]s.

use tessera_core::{TesseraError, TesseraResult};
use tessera_db::{EmittedCommand, ParameterStyle, Row};

/// Runs compiled commands against one database.
///
/// All methods are async. Backends with synchronous drivers (like
/// `rusqlite`) run their work in `spawn_blocking`.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    /// The vendor name (e.g. "sqlite").
    fn vendor(&self) -> &str;

    /// The provider name of the dialect whose output this executor accepts.
    fn provider(&self) -> &str;

    /// Runs a statement that returns no rows and reports the affected count.
    async fn execute(&self, command: &EmittedCommand) -> TesseraResult<u64>;

    /// Runs a query and returns every row.
    async fn query(&self, command: &EmittedCommand) -> TesseraResult<Vec<Row>>;

    /// Runs a query that must return exactly one row.
    async fn query_one(&self, command: &EmittedCommand) -> TesseraResult<Row> {
        let rows = self.query(command).await?;
        single_row(rows)
    }
}

/// Unwraps a result set that must hold exactly one row.
pub fn single_row(rows: Vec<Row>) -> TesseraResult<Row> {
    let count = rows.len();
    let mut rows = rows.into_iter();
    match (rows.next(), count) {
        (Some(row), 1) => Ok(row),
        (None, _) => Err(TesseraError::DatabaseError(
            "expected one row, the query returned none".to_string(),
        )),
        (Some(_), n) => Err(TesseraError::DatabaseError(format!(
            "expected one row, the query returned {n}"
        ))),
    }
}

/// The placeholder a named parameter carries in emitted SQL.
///
/// Positional commands have no per-parameter placeholder text.
pub fn placeholder_text(style: ParameterStyle, name: &str) -> Option<String> {
    match style {
        ParameterStyle::Named(prefix) => Some(format!("{prefix}{name}")),
        ParameterStyle::Positional => None,
    }
}
