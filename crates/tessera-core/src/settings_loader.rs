//! Settings loading from configuration files and the environment.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `TESSERA_PROVIDER` | `provider` |
//! | `TESSERA_NAMING_CONVENTION` | `naming_convention` |
//! | `TESSERA_COMMAND_TIMEOUT` | `default_command_timeout` |
//! | `TESSERA_LOG_LEVEL` | `log_level` |
//! | `TESSERA_DEBUG` | `debug` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use tessera_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("tessera.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::TesseraError;
use crate::settings::Settings;
use crate::utils::text::NamingConvention;

/// Loads settings from a TOML string, keeping defaults for absent keys.
///
/// # Errors
///
/// Returns a configuration error if the TOML is malformed or a key has the
/// wrong type.
///
/// ```
/// use tessera_core::settings_loader;
///
/// let settings = settings_loader::from_toml_str("provider = \"MySql\"").unwrap();
/// assert_eq!(settings.provider, "MySql");
/// assert!(settings_loader::from_toml_str("provider = [").is_err());
/// ```
pub fn from_toml_str(toml_str: &str) -> Result<Settings, TesseraError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| TesseraError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, TesseraError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the TOML is malformed or an
/// override does not parse.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, TesseraError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings)?;
    Ok(settings)
}

/// Loads settings from a JSON string, keeping defaults for absent keys.
///
/// # Errors
///
/// Returns a configuration error if the JSON is malformed or cannot be
/// deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, TesseraError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| TesseraError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, TesseraError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from just environment variables (starting from defaults).
///
/// # Errors
///
/// Returns a configuration error if an override does not parse.
pub fn from_env() -> Result<Settings, TesseraError> {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings)?;
    Ok(settings)
}

/// Applies environment variable overrides to a settings struct.
///
/// `TESSERA_DEBUG` accepts "true"/"1"/"yes"; anything else is false.
/// `TESSERA_COMMAND_TIMEOUT` accepts a number of seconds, or an empty string
/// to clear the default. A malformed naming convention or timeout is a
/// configuration error rather than a silent fallback.
///
/// # Errors
///
/// Returns a configuration error for a malformed
/// `TESSERA_NAMING_CONVENTION` or `TESSERA_COMMAND_TIMEOUT`.
pub fn apply_env_overrides(settings: &mut Settings) -> Result<(), TesseraError> {
    if let Ok(val) = std::env::var("TESSERA_PROVIDER") {
        settings.provider = val.trim().to_string();
    }

    if let Ok(val) = std::env::var("TESSERA_NAMING_CONVENTION") {
        settings.naming_convention = val
            .parse::<NamingConvention>()
            .map_err(|e| TesseraError::ConfigurationError(format!("TESSERA_NAMING_CONVENTION: {e}")))?;
    }

    if let Ok(val) = std::env::var("TESSERA_COMMAND_TIMEOUT") {
        let val = val.trim();
        settings.default_command_timeout = if val.is_empty() {
            None
        } else {
            Some(val.parse::<u32>().map_err(|e| {
                TesseraError::ConfigurationError(format!(
                    "TESSERA_COMMAND_TIMEOUT must be a number of seconds, got '{val}': {e}"
                ))
            })?)
        };
    }

    if let Ok(val) = std::env::var("TESSERA_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("TESSERA_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    Ok(())
}

// ============================================================
// Helpers
// ============================================================

fn read_config(path: &Path, format: &str) -> Result<String, TesseraError> {
    std::fs::read_to_string(path).map_err(|e| {
        TesseraError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, TesseraError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        TesseraError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;
    serde_json::from_value(merge_json(default_json, value)).map_err(|e| {
        TesseraError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = match base_map.remove(&key) {
                    Some(base_v) => merge_json(base_v, override_v),
                    None => override_v,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
