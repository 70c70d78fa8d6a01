use tessera_core::{TesseraError, TesseraResult};

use super::CommandVisitor;
use crate::dialect::{PageWindow, SelectParts};
use crate::query::command::{Aggregate, SelectQuery};
use crate::query::compiler::{Source, Walker};

/// Emits a SELECT.
///
/// The projection is rendered first but assembled last: the dialect's
/// pagination may need to rewrite it.
#[derive(Debug)]
pub struct SelectVisitor<'q> {
    query: &'q SelectQuery,
    sources: Vec<Source>,
    projection: String,
    from: String,
    filter: Option<String>,
}

impl<'q> SelectVisitor<'q> {
    pub const fn new(query: &'q SelectQuery) -> Self {
        Self {
            query,
            sources: Vec::new(),
            projection: String::new(),
            from: String::new(),
            filter: None,
        }
    }
}

fn projection_list(walker: &Walker<'_>, items: &[(String, Option<String>)]) -> String {
    items
        .iter()
        .map(|(sql, alias)| match alias {
            Some(alias) => {
                let quoted = walker.quote(alias);
                if *sql == quoted || sql.ends_with(&format!(".{quoted}")) {
                    sql.clone()
                } else {
                    format!("{sql} AS {quoted}")
                }
            }
            None => sql.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl CommandVisitor for SelectVisitor<'_> {
    fn header(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()> {
        let query = self.query;
        if query.aggregate.is_some() && (query.is_paged() || query.distinct) {
            return Err(TesseraError::InvalidCommand(format!(
                "aggregate over '{}' cannot be combined with take, skip or distinct",
                query.entity
            )));
        }

        let primary = walker.add_source(&query.entity)?;
        self.sources.push(primary.clone());
        for join in &query.joins {
            let source = walker.add_source(&join.entity)?;
            self.sources.push(source);
        }

        let items = match (&query.aggregate, &query.projection) {
            (Some(Aggregate::Count), _) => vec![("COUNT(*)".to_string(), None)],
            (Some(aggregate), _) => {
                let selector = aggregate.selector().ok_or_else(|| {
                    TesseraError::InvalidCommand(format!(
                        "{} over '{}' needs a selector",
                        aggregate.function(),
                        query.entity
                    ))
                })?;
                let expr = walker.render_value(selector)?;
                vec![(format!("{}({expr})", aggregate.function()), None)]
            }
            (None, Some(projection)) => walker.render_projection(projection)?,
            (None, None) => walker.source_columns(&primary),
        };
        if items.is_empty() {
            return Err(TesseraError::InvalidCommand(format!(
                "select over '{}' projects no columns",
                query.entity
            )));
        }
        self.projection = projection_list(walker, &items);
        Ok(())
    }

    fn body(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()> {
        let query = self.query;
        let (primary, joined) = self.sources.split_first().ok_or_else(|| {
            TesseraError::InvalidCommand(format!("select over '{}' has no source", query.entity))
        })?;
        let declaration = walker.declaration(primary);
        self.from = walker.capture(|w| {
            w.write("FROM ");
            w.write(&declaration);
            w.emit_joins(&query.joins, joined)
        })?;
        self.filter = query
            .predicate
            .as_ref()
            .map(|p| walker.render_predicate(p))
            .transpose()?;
        Ok(())
    }

    fn tail(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()> {
        let query = self.query;
        let order_by = if query.aggregate.is_none() && !query.order_by.is_empty() {
            let mut keys = Vec::with_capacity(query.order_by.len());
            for ordering in &query.order_by {
                let key = walker.render_value(&ordering.key)?;
                let direction = if ordering.descending { "DESC" } else { "ASC" };
                keys.push(format!("{key} {direction}"));
            }
            Some(keys.join(", "))
        } else {
            None
        };

        let parts = SelectParts {
            distinct: query.distinct,
            projection: std::mem::take(&mut self.projection),
            from: std::mem::take(&mut self.from),
            filter: self.filter.take(),
            order_by,
        };
        let sql = walker
            .dialect()
            .render_select(&parts, PageWindow::new(query.take, query.skip))?;
        walker.write(&sql);
        Ok(())
    }
}
