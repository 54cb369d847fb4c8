//! Settings loading from configuration files.
//!
//! Documents are merged over [`Settings::default`], so a file only has to
//! mention what it changes:
//!
//! ```toml
//! log_level = "supersql=debug"
//!
//! [databases.default]
//! engine = "postgres"
//! host = "localhost"
//! port = 5432
//! name = "app"
//!
//! [databases.default.pool]
//! pool_max_size = 20
//! pool_timeout = 5
//! ```
//!
//! ```rust,no_run
//! use supersql_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file("config/supersql.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::{SqlError, SqlResult};
use crate::settings::Settings;

/// Loads settings from a TOML string.
pub fn from_toml_str(toml_str: &str) -> SqlResult<Settings> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| SqlError::Configuration(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> SqlResult<Settings> {
    from_toml_str(&read(path.as_ref(), "TOML")?)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> SqlResult<Settings> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| SqlError::Configuration(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> SqlResult<Settings> {
    from_json_str(&read(path.as_ref(), "JSON")?)
}

fn read(path: &Path, format: &str) -> SqlResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        SqlError::Configuration(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(document: serde_json::Value, format: &str) -> SqlResult<Settings> {
    let defaults = serde_json::to_value(Settings::default()).map_err(|e| {
        SqlError::Serialization(format!("Failed to serialize default settings: {e}"))
    })?;
    serde_json::from_value(merge_json(defaults, document)).map_err(|e| {
        SqlError::Configuration(format!("Failed to deserialize settings from {format}: {e}"))
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
