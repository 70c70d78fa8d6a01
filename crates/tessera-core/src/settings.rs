//! Settings for the tessera compiler.
//!
//! [`Settings`] holds everything a `tessera_db::QueryContext` needs that is not part of
//! a single command: which provider to target, how logical names map to
//! physical ones, the default command timeout and a few MySQL switches.
//! Settings are plain values passed to whoever needs them; there is no
//! process-wide instance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::utils::text::NamingConvention;

/// The complete set of tessera settings.
///
/// # Examples
///
/// ```
/// use tessera_core::settings::Settings;
/// use tessera_core::NamingConvention;
///
/// let settings = Settings::default();
/// assert_eq!(settings.provider, "Sqlite");
/// assert_eq!(settings.naming_convention, NamingConvention::AsIs);
/// assert!(settings.default_command_timeout.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Dialect ──────────────────────────────────────────────────────

    /// Provider name used to pick the dialect (`"SqlServer"`, `"MySql"`,
    /// `"Sqlite"` or one of their aliases).
    pub provider: String,
    /// Convention applied to entity and member names without an explicit
    /// physical name.
    pub naming_convention: NamingConvention,
    /// Timeout in seconds attached to commands that carry no override.
    pub default_command_timeout: Option<u32>,

    // ── MySQL ────────────────────────────────────────────────────────

    /// Emit `LIMIT skip, take` instead of `LIMIT take OFFSET skip`.
    pub mysql_legacy_limit: bool,
    /// Emit positional `?` placeholders instead of `?name`.
    pub mysql_positional_parameters: bool,

    // ── Logging ──────────────────────────────────────────────────────

    /// The log filter directive (e.g. "info", "tessera_db=trace").
    pub log_level: String,
    /// Pretty, human-readable logs instead of JSON.
    pub debug: bool,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: "Sqlite".to_string(),
            naming_convention: NamingConvention::AsIs,
            default_command_timeout: None,
            mysql_legacy_limit: false,
            mysql_positional_parameters: false,
            log_level: "info".to_string(),
            debug: false,
            extra: HashMap::new(),
        }
    }
}

impl Settings {
    /// Returns a copy of these settings targeting another provider.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Returns a copy of these settings with another naming convention.
    #[must_use]
    pub fn with_naming_convention(mut self, convention: NamingConvention) -> Self {
        self.naming_convention = convention;
        self
    }
}
