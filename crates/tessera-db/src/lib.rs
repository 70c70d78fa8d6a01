//! # tessera-db
//!
//! The query compiler. Callers describe a statement as a [`Command`]: a select,
//! insert, update or delete over a registered entity whose predicates,
//! projections and ordering keys are [`Node`] trees, or raw SQL. The
//! [`SqlCompiler`] turns it into an [`EmittedCommand`]: SQL text for one
//! dialect plus an ordered list of parameters.
//!
//! ## Architecture
//!
//! Compilation is a single pass. A command visitor emits the statement
//! skeleton and hands each expression to the walker, which resolves members
//! through the [`EntityRegistry`], binds every constant as a parameter and
//! asks the [`Dialect`] for quoting, function names and pagination. A final
//! placeholder pass rewrites canonical `@pN` placeholders into the dialect's
//! parameter style.
//!
//! ## Module Overview
//!
//! - [`entity`] - Entity descriptors and the registry that resolves them
//! - [`value`] - The [`Value`] enum and static [`SqlType`]s
//! - [`row`] - Result rows returned by executors
//! - [`query`] - Query trees, command descriptors, the walker and assembly
//! - [`dialect`] - SQL Server, MySQL and SQLite settings and pagination

// These clippy lints are intentionally allowed for the compiler crate:
// - too_many_lines: the walker dispatch is one large match
// - format_push_string: format! with push_str is clearer than write! for SQL generation
// - doc_markdown: backtick requirements for documentation items are too strict
// - return_self_not_must_use: builder methods are self-documenting
#![allow(clippy::too_many_lines)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::unnecessary_literal_bound)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::result_large_err)]
#![allow(clippy::should_implement_trait)]

pub mod dialect;
pub mod entity;
pub mod query;
pub mod row;
pub mod value;

pub use dialect::{Dialect, DialectRegistry, DialectSettings, MySql, SqlServer, Sqlite};
pub use entity::{ColumnDescriptor, Entity, EntityBuilder, EntityDescriptor, EntityRegistry};
pub use query::assembly::{EmittedCommand, ParameterStyle};
pub use query::command::{Command, Delete, Insert, KeyMatch, RawCommand, Select, Update};
pub use query::compiler::{QueryContext, SqlCompiler};
pub use query::expr::{Binding, Method, Node};
pub use query::functions::FunctionVisitor;
pub use row::{FromValue, Row};
pub use value::{SqlType, Value};
