//! Command visitors.
//!
//! One visitor per statement kind. Each emits its statement in three phases
//! (header, body, tail) into a shared [`Walker`], so that parameters are
//! numbered in the order their clauses are rendered.

mod delete;
mod insert;
mod select;
mod update;

pub use delete::DeleteVisitor;
pub use insert::InsertVisitor;
pub use select::SelectVisitor;
pub use update::UpdateVisitor;

use tessera_core::{TesseraError, TesseraResult};

use crate::entity::{ColumnDescriptor, EntityDescriptor};
use crate::query::command::{unconditioned, Assignment, ColumnSelection, KeyMatch};
use crate::query::compiler::{Source, Walker};
use crate::query::expr::Node;

/// Emits one statement.
pub trait CommandVisitor {
    fn header(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()>;
    fn body(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()>;
    fn tail(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()>;
}

/// Runs the three phases in order.
pub fn run(visitor: &mut dyn CommandVisitor, walker: &mut Walker<'_>) -> TesseraResult<()> {
    visitor.header(walker)?;
    visitor.body(walker)?;
    visitor.tail(walker)
}

/// The assignments that are written, in assignment order.
///
/// The deny list always wins. With an allow list exactly its members are
/// written; without one, key and read-only columns are skipped.
pub(crate) fn writable_columns<'e, 'c>(
    kind: &str,
    entity: &'e EntityDescriptor,
    assignments: &'c [Assignment],
    selection: &ColumnSelection,
) -> TesseraResult<Vec<(&'e ColumnDescriptor, &'c Node)>> {
    for member in selection.allow.iter().flatten().chain(&selection.deny) {
        entity.require_column(member)?;
    }

    let mut seen: Vec<&str> = Vec::with_capacity(assignments.len());
    let mut written: Vec<(&ColumnDescriptor, &Node)> = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let column = entity.require_column(&assignment.member)?;
        if seen.contains(&column.member.as_str()) {
            return Err(TesseraError::InvalidCommand(format!(
                "{kind} on '{}' assigns '{}' twice",
                entity.name, assignment.member
            )));
        }
        seen.push(&column.member);
        if selection.deny.contains(&column.member) {
            continue;
        }
        let included = match &selection.allow {
            Some(allow) => allow.contains(&column.member),
            None => !column.is_key && !column.is_read_only,
        };
        if included {
            written.push((column, &assignment.value));
        }
    }

    if written.is_empty() {
        return Err(TesseraError::InvalidCommand(format!(
            "{kind} on '{}' has no writable columns after applying key, read-only and allow/deny rules",
            entity.name
        )));
    }
    Ok(written)
}

/// Renders `[q].[k1] = @p AND [q].[k2] = @p` for a key match.
pub(crate) fn key_condition(
    walker: &mut Walker<'_>,
    source: &Source,
    key: &KeyMatch,
) -> TesseraResult<String> {
    let entity = source.entity();
    let columns: Vec<&ColumnDescriptor> = entity.key_columns().collect();
    if columns.is_empty() {
        return Err(TesseraError::InvalidCommand(format!(
            "'{}' declares no key columns to match on",
            entity.name
        )));
    }
    if columns.len() != key.values.len() {
        return Err(TesseraError::InvalidCommand(format!(
            "'{}' has {} key columns but the key match supplies {} values",
            entity.name,
            columns.len(),
            key.values.len()
        )));
    }

    let mut parts = Vec::with_capacity(columns.len());
    for (column, value) in columns.into_iter().zip(&key.values) {
        let value = match &column.sql_type {
            Some(ty) => value.coerce(ty)?,
            None => value.clone(),
        };
        let lhs = walker.column_sql(source, column);
        if value.is_null() {
            return Err(TesseraError::InvalidCommand(format!(
                "key value for '{}.{}' is NULL",
                entity.name, column.member
            )));
        }
        let placeholder = walker.bind(value);
        parts.push(format!("{lhs} = {placeholder}"));
    }
    Ok(parts.join(" AND "))
}

/// Writes the WHERE clause of an update or delete.
pub(crate) fn mutation_filter(
    walker: &mut Walker<'_>,
    kind: &str,
    source: &Source,
    predicate: Option<&Node>,
    key: Option<&KeyMatch>,
) -> TesseraResult<()> {
    let predicate_sql = predicate.map(|p| walker.render_predicate(p)).transpose()?;
    let key_sql = key.map(|k| key_condition(walker, source, k)).transpose()?;
    let clause = match (predicate_sql, key_sql) {
        (Some(p), Some(k)) => format!("({p}) AND ({k})"),
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => return Err(unconditioned(kind, &source.entity().name)),
    };
    walker.write(" WHERE ");
    walker.write(&clause);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor {
            name: "User".into(),
            table: "users".into(),
            convention: tessera_core::NamingConvention::AsIs,
            columns: vec![
                ColumnDescriptor {
                    member: "Id".into(),
                    physical: "id".into(),
                    is_key: true,
                    is_read_only: false,
                    sql_type: None,
                },
                ColumnDescriptor {
                    member: "Name".into(),
                    physical: "name".into(),
                    is_key: false,
                    is_read_only: false,
                    sql_type: None,
                },
                ColumnDescriptor {
                    member: "Created".into(),
                    physical: "created".into(),
                    is_key: false,
                    is_read_only: true,
                    sql_type: None,
                },
            ],
        }
    }

    fn assign(member: &str) -> Assignment {
        Assignment {
            member: member.into(),
            value: Node::constant(Value::Int(1)),
        }
    }

    fn members(cols: &[(&ColumnDescriptor, &Node)]) -> Vec<String> {
        cols.iter().map(|(c, _)| c.member.clone()).collect()
    }

    #[test]
    fn test_default_selection_skips_keys_and_read_only() {
        let entity = descriptor();
        let assignments = [assign("Id"), assign("Name"), assign("Created")];
        let cols = writable_columns("insert", &entity, &assignments, &ColumnSelection::default()).unwrap();
        assert_eq!(members(&cols), ["Name"]);
    }

    #[test]
    fn test_allow_list_includes_keys() {
        let entity = descriptor();
        let assignments = [assign("Id"), assign("Name")];
        let selection = ColumnSelection {
            allow: Some(vec!["Id".into()]),
            deny: vec![],
        };
        let cols = writable_columns("insert", &entity, &assignments, &selection).unwrap();
        assert_eq!(members(&cols), ["Id"]);
    }

    #[test]
    fn test_deny_wins_over_allow() {
        let entity = descriptor();
        let assignments = [assign("Id"), assign("Name")];
        let selection = ColumnSelection {
            allow: Some(vec!["Id".into(), "Name".into()]),
            deny: vec!["Name".into()],
        };
        let cols = writable_columns("insert", &entity, &assignments, &selection).unwrap();
        assert_eq!(members(&cols), ["Id"]);
    }

    #[test]
    fn test_empty_selection_is_invalid() {
        let entity = descriptor();
        let assignments = [assign("Id")];
        let err = writable_columns("insert", &entity, &assignments, &ColumnSelection::default()).unwrap_err();
        assert_eq!(err.code(), "invalid_command");
    }

    #[test]
    fn test_unknown_members_are_reported() {
        let entity = descriptor();
        let err = writable_columns("update", &entity, &[assign("Nope")], &ColumnSelection::default())
            .unwrap_err();
        assert_eq!(err.code(), "unknown_member");

        let selection = ColumnSelection {
            allow: None,
            deny: vec!["Ghost".into()],
        };
        let err = writable_columns("update", &entity, &[assign("Name")], &selection).unwrap_err();
        assert_eq!(err.code(), "unknown_member");
    }

    #[test]
    fn test_duplicate_assignment() {
        let entity = descriptor();
        let err = writable_columns(
            "update",
            &entity,
            &[assign("Name"), assign("Name")],
            &ColumnSelection::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }
}
