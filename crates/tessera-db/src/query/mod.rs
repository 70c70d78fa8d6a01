//! Query trees, command descriptors and their compilation.
//!
//! - [`expr`] - The [`Node`](expr::Node) tree
//! - [`command`] - Select/insert/update/delete descriptors and builders
//! - [`compiler`] - [`SqlCompiler`](compiler::SqlCompiler) and the walker
//! - [`functions`] - Pluggable function visitors
//! - [`visitors`] - One command visitor per statement kind
//! - [`assembly`] - Placeholder rewriting

pub mod assembly;
pub mod command;
pub mod compiler;
pub mod expr;
pub mod functions;
pub mod visitors;
