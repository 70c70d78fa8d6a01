use tessera_core::{TesseraError, TesseraResult};

use super::{writable_columns, CommandVisitor};
use crate::query::command::InsertCommand;
use crate::query::compiler::{Source, Walker};

/// Emits `INSERT INTO [t] ([a], [b]) VALUES (@p0, @p1)`, optionally followed
/// by the dialect's identity select.
#[derive(Debug)]
pub struct InsertVisitor<'c> {
    command: &'c InsertCommand,
    source: Option<Source>,
}

impl<'c> InsertVisitor<'c> {
    pub const fn new(command: &'c InsertCommand) -> Self {
        Self {
            command,
            source: None,
        }
    }
}

impl CommandVisitor for InsertVisitor<'_> {
    fn header(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()> {
        let source = walker.add_table_source(&self.command.entity)?;
        let head = format!("INSERT INTO {}", walker.declaration(&source));
        walker.write(&head);
        self.source = Some(source);
        Ok(())
    }

    fn body(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()> {
        let command = self.command;
        let source = self.source.as_ref().ok_or_else(|| {
            TesseraError::InvalidCommand(format!("insert into '{}' has no target", command.entity))
        })?;
        let columns = writable_columns(
            "insert",
            source.entity(),
            &command.assignments,
            &command.columns,
        )?;

        let names: Vec<String> = columns
            .iter()
            .map(|(column, _)| walker.quote(&column.physical))
            .collect();
        walker.write(&format!(" ({}) VALUES (", names.join(", ")));
        for (i, (column, value)) in columns.iter().enumerate() {
            if i > 0 {
                walker.write(", ");
            }
            walker.walk_assigned(value, column.sql_type.as_ref())?;
        }
        walker.write(")");
        Ok(())
    }

    fn tail(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()> {
        if self.command.fetch_identity {
            let identity = walker.dialect().identity_select();
            walker.write("; ");
            walker.write(identity);
        }
        Ok(())
    }
}
