//! # tessera-core
//!
//! Core types shared by every tessera crate. This crate has no knowledge of
//! query trees or dialects; it provides the foundation the compiler builds on.
//!
//! ## Modules
//!
//! - [`error`] - The [`TesseraError`] taxonomy and result alias
//! - [`settings`] - Compiler configuration ([`Settings`])
//! - [`settings_loader`] - Loading settings from TOML, JSON, and the environment
//! - [`logging`] - Tracing-based logging integration
//! - [`utils`] - Naming-convention helpers

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;
pub mod utils;

// Re-export the most commonly used types at the crate root.
pub use error::{TesseraError, TesseraResult};
pub use settings::Settings;
pub use utils::text::NamingConvention;
