use tessera_core::{TesseraError, TesseraResult};

use super::{mutation_filter, CommandVisitor};
use crate::query::command::{unconditioned, DeleteCommand};
use crate::query::compiler::{Source, Walker};

/// Emits `DELETE FROM [t] WHERE ...`.
#[derive(Debug)]
pub struct DeleteVisitor<'c> {
    command: &'c DeleteCommand,
    source: Option<Source>,
}

impl<'c> DeleteVisitor<'c> {
    pub const fn new(command: &'c DeleteCommand) -> Self {
        Self {
            command,
            source: None,
        }
    }
}

impl CommandVisitor for DeleteVisitor<'_> {
    fn header(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()> {
        let command = self.command;
        if command.predicate.is_none() && command.key.is_none() {
            return Err(unconditioned("delete", &command.entity));
        }
        let source = walker.add_table_source(&command.entity)?;
        let head = format!("DELETE FROM {}", walker.declaration(&source));
        walker.write(&head);
        self.source = Some(source);
        Ok(())
    }

    fn body(&mut self, _walker: &mut Walker<'_>) -> TesseraResult<()> {
        Ok(())
    }

    fn tail(&mut self, walker: &mut Walker<'_>) -> TesseraResult<()> {
        let command = self.command;
        let source = self.source.as_ref().ok_or_else(|| {
            TesseraError::InvalidCommand(format!("delete from '{}' has no target", command.entity))
        })?;
        mutation_filter(
            walker,
            "delete",
            source,
            command.predicate.as_ref(),
            command.key.as_ref(),
        )
    }
}
