//! # tessera-db-backends
//!
//! The execution boundary for tessera. The compiler produces an
//! [`EmittedCommand`](tessera_db::EmittedCommand); a [`CommandExecutor`] binds
//! its parameters and runs it.
//!
//! Supported backends:
//! - `SQLite` (feature `sqlite`)

pub mod base;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use base::{single_row, CommandExecutor};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutor;
