use tessera_core::{TesseraError, TesseraResult};

use super::{mutation_filter, writable_columns, CommandVisitor};
use crate::query::command::{unconditioned, UpdateCommand};
use crate::query::compiler::{Source, Walker};

/// Emits `UPDATE [t] SET [a] = @p0 WHERE ...`.
///
/// Columns in the WHERE clause and on the right of SET are qualified by the
/// table name; the SET targets are not.
#[derive(Debug)]
pub struct UpdateVisitor<'c> {
    command: &'c UpdateCommand,
    source: Option<Source>,
}

impl<'c> UpdateVisitor<'c> {
    pub const fn new(command: &'c UpdateCommand) -> Self {
        Self {
            command,
            source: None,
        }
    }

    fn source(&self) -> TesseraResult<&Source> {
        self.source.as_ref().ok_or_else(|| {
            TesseraError::InvalidCommand(format!("update of '{}' has no target", self.command.entity))
        })
    }
}

impl CommandVisitor for UpdateVisitor<'_> {
    fn header(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()> {
        let command = self.command;
        if command.predicate.is_none() && command.key.is_none() {
            return Err(unconditioned("update", &command.entity));
        }
        let source = walker.add_table_source(&command.entity)?;
        let head = format!("UPDATE {} SET ", walker.declaration(&source));
        walker.write(&head);
        self.source = Some(source);
        Ok(())
    }

    fn body(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()> {
        let command = self.command;
        let source = self.source()?;
        let columns = writable_columns(
            "update",
            source.entity(),
            &command.assignments,
            &command.columns,
        )?;
        for (i, (column, value)) in columns.iter().enumerate() {
            if i > 0 {
                walker.write(", ");
            }
            let target = walker.quote(&column.physical);
            walker.write(&target);
            walker.write(" = ");
            walker.walk_assigned(value, column.sql_type.as_ref())?;
        }
        Ok(())
    }

    fn tail(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()> {
        let command = self.command;
        let source = self.source()?;
        mutation_filter(
            walker,
            "update",
            source,
            command.predicate.as_ref(),
            command.key.as_ref(),
        )
    }
}
