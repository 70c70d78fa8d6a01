//! Core error types for tessera.
//!
//! [`TesseraError`] covers every way a compilation can fail (unsupported
//! expressions, unconditioned mutations, ambiguous paged projections, unknown
//! members) plus the configuration and execution-boundary failures that
//! surround the compiler. Compilation errors are always fatal to the
//! compilation that raised them; no partial SQL is ever returned alongside one.

use thiserror::Error;

/// The primary error type for tessera.
///
/// Compile-time variants carry a human-readable message that names the
/// offending sub-tree or the fix the caller has to apply.
#[derive(Error, Debug)]
pub enum TesseraError {
    // ── Compilation errors ───────────────────────────────────────────

    /// A node kind or call signature the walker and visitors cannot translate.
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// An UPDATE or DELETE without a predicate or key match.
    #[error("Unconditioned mutation: {0}")]
    UnconditionedMutation(String),

    /// A multi-column projection with unaliasable items combined with
    /// window-function paging.
    #[error("Ambiguous projection under paging: {0}")]
    AmbiguousProjection(String),

    /// A member access that the entity resolver cannot map to a column.
    #[error("Unknown member '{member}' on entity '{entity}'")]
    UnknownMember {
        /// The entity the member was looked up on.
        entity: String,
        /// The member name as written in the query tree.
        member: String,
    },

    /// A command references an entity that was never registered.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// A command descriptor that is structurally invalid (empty projection,
    /// empty column list, key arity mismatch, ...).
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // ── Configuration ────────────────────────────────────────────────

    /// Unknown provider name, conflicting registrations, malformed settings.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Execution boundary ───────────────────────────────────────────

    /// A failure reported by the execution layer.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TesseraError {
    /// Returns a stable, machine-readable code for this error.
    ///
    /// - `UnsupportedExpression` -> `unsupported_expression`
    /// - `UnconditionedMutation` -> `unconditioned_mutation`
    /// - `AmbiguousProjection` -> `ambiguous_projection`
    /// - `UnknownMember` -> `unknown_member`
    /// - `UnknownEntity` -> `unknown_entity`
    /// - `InvalidCommand` -> `invalid_command`
    /// - `ConfigurationError` -> `configuration`
    /// - everything else -> `database`, `serialization`, `io`
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedExpression(_) => "unsupported_expression",
            Self::UnconditionedMutation(_) => "unconditioned_mutation",
            Self::AmbiguousProjection(_) => "ambiguous_projection",
            Self::UnknownMember { .. } => "unknown_member",
            Self::UnknownEntity(_) => "unknown_entity",
            Self::InvalidCommand(_) => "invalid_command",
            Self::ConfigurationError(_) => "configuration",
            Self::DatabaseError(_) => "database",
            Self::SerializationError(_) => "serialization",
            Self::IoError(_) => "io",
        }
    }

    /// Returns `true` if this error was raised while translating a command.
    pub const fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedExpression(_)
                | Self::UnconditionedMutation(_)
                | Self::AmbiguousProjection(_)
                | Self::UnknownMember { .. }
                | Self::UnknownEntity(_)
                | Self::InvalidCommand(_)
        )
    }

    /// Shorthand for an [`UnknownMember`](Self::UnknownMember) error.
    pub fn unknown_member(entity: impl Into<String>, member: impl Into<String>) -> Self {
        Self::UnknownMember {
            entity: entity.into(),
            member: member.into(),
        }
    }
}

/// A convenience type alias for `Result<T, TesseraError>`.
pub type TesseraResult<T> = Result<T, TesseraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TesseraError::UnsupportedExpression("x".into()).code(),
            "unsupported_expression"
        );
        assert_eq!(
            TesseraError::UnconditionedMutation("x".into()).code(),
            "unconditioned_mutation"
        );
        assert_eq!(
            TesseraError::AmbiguousProjection("x".into()).code(),
            "ambiguous_projection"
        );
        assert_eq!(TesseraError::unknown_member("User", "Nope").code(), "unknown_member");
        assert_eq!(TesseraError::UnknownEntity("x".into()).code(), "unknown_entity");
        assert_eq!(TesseraError::InvalidCommand("x".into()).code(), "invalid_command");
        assert_eq!(TesseraError::ConfigurationError("x".into()).code(), "configuration");
        assert_eq!(TesseraError::DatabaseError("x".into()).code(), "database");
    }

    #[test]
    fn test_compile_error_classification() {
        assert!(TesseraError::UnsupportedExpression("x".into()).is_compile_error());
        assert!(TesseraError::unknown_member("User", "Nope").is_compile_error());
        assert!(!TesseraError::ConfigurationError("x".into()).is_compile_error());
        assert!(!TesseraError::DatabaseError("x".into()).is_compile_error());
    }

    #[test]
    fn test_unknown_member_display() {
        let err = TesseraError::unknown_member("User", "Nickname");
        assert_eq!(err.to_string(), "Unknown member 'Nickname' on entity 'User'");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: TesseraError = io_err.into();
        assert_eq!(err.code(), "io");
        assert!(err.to_string().contains("file missing"));
    }
}
