//! # tessera
//!
//! Compiles composable query trees into parameterized SQL for SQL Server,
//! MySQL and SQLite.
//!
//! This is the meta-crate that re-exports the sub-crates. Depend on
//! `tessera` for everything, or on individual crates for finer-grained
//! control.
//!
//! ```
//! use std::sync::Arc;
//! use tessera::prelude::*;
//!
//! let entities = EntityRegistry::new();
//! entities
//!     .register_builder(EntityBuilder::new("User").table("users").key("Id").column("Name"))
//!     .unwrap();
//!
//! let settings = Settings::default().with_provider("SqlServer");
//! let compiler = tessera::compiler_from_settings(&settings, Arc::new(entities)).unwrap();
//! let query = Select::from("User")
//!     .filter(Node::lambda(["u"], Node::param("u").member("Name").equals("ann")))
//!     .build()
//!     .unwrap();
//! let cmd = compiler.compile(&Command::Select(query)).unwrap();
//! assert_eq!(cmd.sql, "SELECT [t0].[Id], [t0].[Name] FROM [users] AS [t0] WHERE [t0].[Name] = @p0");
//! ```

use std::sync::Arc;

/// Error type, settings, logging and naming conventions.
pub use tessera_core as core;

/// The query compiler: entities, query trees, dialects and assembly.
pub use tessera_db as db;

/// Execution of emitted commands.
pub use tessera_db_backends as db_backends;

pub use tessera_core::logging::setup_logging;
pub use tessera_core::{TesseraError, TesseraResult};

/// The types most programs need.
pub mod prelude {
    pub use tessera_core::{NamingConvention, Settings, TesseraError, TesseraResult};
    pub use tessera_db::{
        Binding, Command, Delete, Dialect, DialectRegistry, EmittedCommand, EntityBuilder,
        EntityRegistry, Insert, KeyMatch, Method, Node, QueryContext, RawCommand, Select,
        SqlCompiler, SqlType, Update, Value,
    };
    pub use tessera_db_backends::CommandExecutor;

    pub use async_trait::async_trait;
}

/// Builds a compiler for the provider and options named in `settings`.
///
/// Fails with a configuration error before any compilation when the
/// provider is unknown.
pub fn compiler_from_settings(
    settings: &tessera_core::Settings,
    entities: Arc<tessera_db::EntityRegistry>,
) -> TesseraResult<tessera_db::SqlCompiler> {
    let dialects = tessera_db::DialectRegistry::from_settings(settings);
    let context = tessera_db::QueryContext::from_settings(settings, &dialects, entities)?;
    tracing::debug!(provider = %settings.provider, "compiler configured");
    Ok(tessera_db::SqlCompiler::new(context))
}
