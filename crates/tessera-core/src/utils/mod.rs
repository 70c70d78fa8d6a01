//! Utility helpers shared across tessera crates.
//!
//! - [`text`] - Naming conventions and identifier case conversion

pub mod text;

pub use text::{to_camel_case, to_snake_case, to_url_case, NamingConvention};
