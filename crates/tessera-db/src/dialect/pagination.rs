//! Take/skip rewrites.
//!
//! Native dialects append a `LIMIT` clause to the plain statement. SQL Server
//! gets `TOP (n)` when nothing is skipped and the `ROW_NUMBER()` window
//! rewrite otherwise. The window rewrite has to name every projected column
//! in the outer query, so it scans the already rendered column list: items
//! are split on top-level commas (paren depth, quotes and brackets tracked)
//! and each item is matched against two patterns, a bare column reference
//! and an `expr AS [alias]` item. Anything else is an unaliased expression.
//!
//! Ordering is never stabilized here. Rows with equal ordering keys may land
//! on either side of a page boundary; callers that need stable pages must
//! order by a unique key.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tessera_core::{TesseraError, TesseraResult};

/// The row window requested by a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageWindow {
    pub take: Option<u64>,
    pub skip: u64,
}

impl PageWindow {
    pub const fn new(take: Option<u64>, skip: u64) -> Self {
        Self { take, skip }
    }

    pub const fn is_unbounded(&self) -> bool {
        self.take.is_none() && self.skip == 0
    }
}

/// The clauses of a select, rendered but not yet assembled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectParts {
    pub distinct: bool,
    /// The comma-separated column list.
    pub projection: String,
    /// `FROM ...` including joins.
    pub from: String,
    /// The WHERE condition without the keyword.
    pub filter: Option<String>,
    /// The ORDER BY list without the keyword.
    pub order_by: Option<String>,
}

impl SelectParts {
    fn head(&self) -> &'static str {
        if self.distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        }
    }

    fn from_and_filter(&self) -> String {
        match &self.filter {
            Some(filter) => format!("{} WHERE {filter}", self.from),
            None => self.from.clone(),
        }
    }

    fn order_clause(&self) -> String {
        self.order_by
            .as_ref()
            .map(|o| format!(" ORDER BY {o}"))
            .unwrap_or_default()
    }
}

/// `SELECT ... FROM ... WHERE ... ORDER BY ...` without any paging.
pub fn plain(parts: &SelectParts) -> String {
    format!(
        "{}{} {}{}",
        parts.head(),
        parts.projection,
        parts.from_and_filter(),
        parts.order_clause()
    )
}

/// The plain statement followed by an optional limit clause.
pub fn with_limit(parts: &SelectParts, limit: Option<&str>) -> String {
    match limit {
        Some(limit) => format!("{} {limit}", plain(parts)),
        None => plain(parts),
    }
}

/// `LIMIT take OFFSET skip`. `unbounded` stands in for a missing take when
/// rows are skipped (`-1` for SQLite, the largest unsigned value for MySQL).
pub fn limit_offset(window: PageWindow, unbounded: &str) -> Option<String> {
    match (window.take, window.skip) {
        (None, 0) => None,
        (Some(take), 0) => Some(format!("LIMIT {take}")),
        (Some(take), skip) => Some(format!("LIMIT {take} OFFSET {skip}")),
        (None, skip) => Some(format!("LIMIT {unbounded} OFFSET {skip}")),
    }
}

/// MySQL's legacy `LIMIT skip, take`.
pub fn legacy_limit(window: PageWindow, unbounded: &str) -> Option<String> {
    match (window.take, window.skip) {
        (None, 0) => None,
        (Some(take), 0) => Some(format!("LIMIT {take}")),
        (Some(take), skip) => Some(format!("LIMIT {skip}, {take}")),
        (None, skip) => Some(format!("LIMIT {skip}, {unbounded}")),
    }
}

/// `SELECT [DISTINCT] TOP (n) ...`.
pub fn top(parts: &SelectParts, take: u64) -> String {
    format!(
        "{}TOP ({take}) {} {}{}",
        parts.head(),
        parts.projection,
        parts.from_and_filter(),
        parts.order_clause()
    )
}

const ROW_NUMBER: &str = "[__row_num]";
const PAGED: &str = "[__paged]";
const SYNTHETIC_COLUMN: &str = "[__col0]";

/// How one projection item is named in the outer query of the window rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionItem {
    /// `[t0].[Name]` or `[Name]`; carries the quoted column name.
    Bare(String),
    /// `expr AS [Alias]`; carries the quoted alias.
    Aliased(String),
    /// Anything the scanner cannot name.
    Expression,
}

static BARE_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\[(?:[^\]]|\]\])+\]\.)?(\[(?:[^\]]|\]\])+\])$").unwrap()
});

static ALIASED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^(.+?)\s+AS\s+(\[(?:[^\]]|\]\])+\])$").unwrap());

/// Classifies one projection item.
pub fn classify(item: &str) -> ProjectionItem {
    let item = item.trim();
    if let Some(caps) = BARE_COLUMN.captures(item) {
        return ProjectionItem::Bare(caps[1].to_string());
    }
    if let Some(caps) = ALIASED.captures(item) {
        if is_balanced(&caps[1]) {
            return ProjectionItem::Aliased(caps[2].to_string());
        }
    }
    ProjectionItem::Expression
}

fn is_balanced(sql: &str) -> bool {
    split_top_level(sql).is_some()
}

/// Splits a column list on commas at paren depth zero, outside quotes and
/// brackets. Returns `None` when parentheses do not balance.
fn split_top_level(list: &str) -> Option<Vec<&str>> {
    let mut items = Vec::new();
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in list.char_indices() {
        if let Some(close) = quote {
            // A doubled closing character re-opens immediately, so toggling is enough.
            if c == close {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '[' => quote = Some(']'),
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                items.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return None;
    }
    items.push(list[start..].trim());
    Some(items)
}

/// Splits a rendered projection into its items.
pub fn split_projection(list: &str) -> TesseraResult<Vec<&str>> {
    split_top_level(list)
        .filter(|items| items.iter().all(|i| !i.is_empty()))
        .ok_or_else(|| {
            TesseraError::InvalidCommand(format!("cannot split projection `{list}` into columns"))
        })
}

/// The SQL Server `ROW_NUMBER()` rewrite for a window with `skip > 0`.
///
/// ```text
/// SELECT <outer> FROM (
///     SELECT <inner>, ROW_NUMBER() OVER (ORDER BY <order>) AS [__row_num]
///     FROM ... WHERE ...
/// ) AS [__paged] WHERE [__row_num] BETWEEN skip+1 AND skip+take ORDER BY [__row_num]
/// ```
///
/// Without an ordering the window is numbered over `(SELECT NULL)`, which
/// gives no page stability at all.
pub fn row_number(parts: &SelectParts, window: PageWindow) -> TesseraResult<String> {
    if parts.distinct {
        return Err(TesseraError::InvalidCommand(
            "DISTINCT cannot be combined with skip under ROW_NUMBER() paging; \
             page over a projection without DISTINCT"
                .to_string(),
        ));
    }

    let items = split_projection(&parts.projection)?;
    let mut inner = Vec::with_capacity(items.len());
    let mut outer = Vec::with_capacity(items.len());

    if let [only] = items.as_slice() {
        match classify(only) {
            ProjectionItem::Bare(column) | ProjectionItem::Aliased(column) => {
                inner.push((*only).to_string());
                outer.push(column);
            }
            ProjectionItem::Expression => {
                inner.push(format!("{only} AS {SYNTHETIC_COLUMN}"));
                outer.push(SYNTHETIC_COLUMN.to_string());
            }
        }
    } else {
        let mut seen = HashSet::new();
        for item in &items {
            let name = match classify(item) {
                ProjectionItem::Bare(column) | ProjectionItem::Aliased(column) => column,
                ProjectionItem::Expression => {
                    return Err(TesseraError::AmbiguousProjection(format!(
                        "`{item}` has no alias; name every column explicitly when paging a \
                         multi-column projection"
                    )))
                }
            };
            if !seen.insert(name.to_lowercase()) {
                return Err(TesseraError::AmbiguousProjection(format!(
                    "column {name} is projected twice; give each duplicate an explicit alias"
                )));
            }
            inner.push((*item).to_string());
            outer.push(name);
        }
    }

    let order = parts.order_by.as_deref().unwrap_or("(SELECT NULL)");
    let range = match window.take {
        Some(take) => format!(
            "{ROW_NUMBER} BETWEEN {} AND {}",
            window.skip.saturating_add(1),
            window.skip.saturating_add(take)
        ),
        None => format!("{ROW_NUMBER} > {}", window.skip),
    };

    Ok(format!(
        "SELECT {} FROM (SELECT {}, ROW_NUMBER() OVER (ORDER BY {order}) AS {ROW_NUMBER} {}) AS {PAGED} WHERE {range} ORDER BY {ROW_NUMBER}",
        outer.join(", "),
        inner.join(", "),
        parts.from_and_filter(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(projection: &str) -> SelectParts {
        SelectParts {
            distinct: false,
            projection: projection.to_string(),
            from: "FROM [User] AS [t0]".to_string(),
            filter: Some("[t0].[Id] > @p0".to_string()),
            order_by: Some("[t0].[Id] ASC".to_string()),
        }
    }

    // ── native ──────────────────────────────────────────────────────

    #[test]
    fn test_limit_offset_forms() {
        assert_eq!(limit_offset(PageWindow::new(None, 0), "-1"), None);
        assert_eq!(limit_offset(PageWindow::new(Some(5), 0), "-1").as_deref(), Some("LIMIT 5"));
        assert_eq!(
            limit_offset(PageWindow::new(Some(5), 10), "-1").as_deref(),
            Some("LIMIT 5 OFFSET 10")
        );
        assert_eq!(
            limit_offset(PageWindow::new(None, 10), "-1").as_deref(),
            Some("LIMIT -1 OFFSET 10")
        );
    }

    #[test]
    fn test_legacy_limit_forms() {
        assert_eq!(
            legacy_limit(PageWindow::new(Some(5), 10), "18446744073709551615").as_deref(),
            Some("LIMIT 10, 5")
        );
        assert_eq!(
            legacy_limit(PageWindow::new(None, 3), "18446744073709551615").as_deref(),
            Some("LIMIT 3, 18446744073709551615")
        );
    }

    #[test]
    fn test_plain_and_top() {
        let p = parts("[t0].[Id]");
        assert_eq!(
            plain(&p),
            "SELECT [t0].[Id] FROM [User] AS [t0] WHERE [t0].[Id] > @p0 ORDER BY [t0].[Id] ASC"
        );
        assert_eq!(
            top(&p, 3),
            "SELECT TOP (3) [t0].[Id] FROM [User] AS [t0] WHERE [t0].[Id] > @p0 ORDER BY [t0].[Id] ASC"
        );
    }

    // ── scanning ────────────────────────────────────────────────────

    #[test]
    fn test_classify() {
        assert_eq!(classify("[t0].[Name]"), ProjectionItem::Bare("[Name]".into()));
        assert_eq!(classify("[Name]"), ProjectionItem::Bare("[Name]".into()));
        assert_eq!(
            classify("UPPER([t0].[Name]) AS [Shout]"),
            ProjectionItem::Aliased("[Shout]".into())
        );
        assert_eq!(
            classify("[t0].[a] as [odd]] name]"),
            ProjectionItem::Aliased("[odd]] name]".into())
        );
        assert_eq!(classify("UPPER([t0].[Name])"), ProjectionItem::Expression);
        assert_eq!(classify("CONVERT(BIGINT, [t0].[A])"), ProjectionItem::Expression);
    }

    #[test]
    fn test_split_tracks_depth_and_quotes() {
        let items = split_projection("COALESCE([t0].[a], [t0].[b]) AS [x], '(,', [t0].[c]").unwrap();
        assert_eq!(items, ["COALESCE([t0].[a], [t0].[b]) AS [x]", "'(,'", "[t0].[c]"]);
        assert!(split_projection("f(a, b").is_err());
        assert!(split_projection("a,,b").is_err());
    }

    // ── window rewrite ──────────────────────────────────────────────

    #[test]
    fn test_row_number_bare_columns() {
        let sql = row_number(&parts("[t0].[Id], [t0].[Name]"), PageWindow::new(Some(5), 10)).unwrap();
        assert_eq!(
            sql,
            "SELECT [Id], [Name] FROM (SELECT [t0].[Id], [t0].[Name], ROW_NUMBER() OVER (ORDER BY [t0].[Id] ASC) AS [__row_num] \
             FROM [User] AS [t0] WHERE [t0].[Id] > @p0) AS [__paged] WHERE [__row_num] BETWEEN 11 AND 15 ORDER BY [__row_num]"
        );
    }

    #[test]
    fn test_row_number_single_expression_gets_synthetic_alias() {
        let sql = row_number(&parts("UPPER([t0].[Name])"), PageWindow::new(None, 4)).unwrap();
        assert!(sql.starts_with("SELECT [__col0] FROM (SELECT UPPER([t0].[Name]) AS [__col0], ROW_NUMBER()"));
        assert!(sql.contains("WHERE [__row_num] > 4"));
    }

    #[test]
    fn test_row_number_without_order_uses_null_window() {
        let mut p = parts("[t0].[Id]");
        p.order_by = None;
        let sql = row_number(&p, PageWindow::new(Some(1), 1)).unwrap();
        assert!(sql.contains("OVER (ORDER BY (SELECT NULL))"));
    }

    #[test]
    fn test_row_number_rejects_unaliased_multi_column() {
        let err = row_number(&parts("[t0].[Id], UPPER([t0].[Name])"), PageWindow::new(Some(5), 10))
            .unwrap_err();
        assert_eq!(err.code(), "ambiguous_projection");
        assert!(err.to_string().contains("UPPER([t0].[Name])"));
    }

    #[test]
    fn test_row_number_rejects_duplicate_names() {
        let err = row_number(&parts("[t0].[Id], [t1].[Id]"), PageWindow::new(Some(5), 10)).unwrap_err();
        assert_eq!(err.code(), "ambiguous_projection");
    }

    #[test]
    fn test_row_number_rejects_distinct() {
        let mut p = parts("[t0].[Id]");
        p.distinct = true;
        assert_eq!(
            row_number(&p, PageWindow::new(Some(5), 10)).unwrap_err().code(),
            "invalid_command"
        );
    }
}
