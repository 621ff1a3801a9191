//! Layered configuration loading: hardcoded defaults, overridden by
//! `crossbridge.yml`, overridden by `CROSSBRIDGE_`-prefixed environment
//! variables, overridden last by CLI flags applied at the call site.
//!
//! Grounded on `offload`'s `config::load_config` (`examples/imbue-ai-offload/src/config.rs`)
//! for the overall "read file, parse, return typed config" shape, but that
//! loader only supported TOML with `${VAR}` string interpolation inside
//! provider env maps. This crate's schema has no such env maps, and its
//! external interface names the config file `crossbridge.yml`, so the
//! format switches to `serde_yaml` and layering happens structurally (merge
//! YAML values, then deserialize once) rather than via string substitution.

pub mod schema;

pub use schema::*;

use std::path::Path;

use serde_yaml::Value;
use tracing::warn;

use crate::error::ConfigError;

/// Top-level section names the schema actually understands. An unrecognized
/// key at this level is a typo, not a new feature, and is only warned about
/// (never a hard failure) since the offending key has already been dropped
/// by `#[serde(deny_unknown_fields)]`'s absence — this crate's schema
/// intentionally tolerates unknown *nested* fields via `#[serde(default)]`
/// defaults, but a whole unrecognized top-level section is worth flagging.
const KNOWN_TOP_LEVEL_KEYS: &[&str] = &[
    "orchestrator",
    "strategies",
    "frameworks",
    "sidecar",
    "classifier",
    "persistence",
    "health",
];

/// Loads configuration from `path` (YAML), layered on top of
/// [`Config::default()`], then applies `CROSSBRIDGE_`-prefixed environment
/// variable overrides. A missing file is not an error: the defaults (plus
/// env overrides) are used as-is, since a sidecar or orchestrator run
/// without a config file is a supported "just use the defaults" mode.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let base = match std::fs::read_to_string(path) {
        Ok(content) => parse_yaml_layer(&content, path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Null,
        Err(e) => return Err(ConfigError::Read { path: path.to_path_buf(), source: e }),
    };

    build_config(base)
}

/// Parses `content` as a config layer without touching the filesystem,
/// useful for tests and for embedding configuration programmatically.
pub fn load_config_str(content: &str) -> Result<Config, ConfigError> {
    let layer = parse_yaml_layer(content, Path::new("<string>"))?;
    build_config(layer)
}

fn parse_yaml_layer(content: &str, path: &Path) -> Result<Value, ConfigError> {
    let value: Value = serde_yaml::from_str(content)
        .map_err(|e| ConfigError::Parse { path: path.to_path_buf(), source: Box::new(e) })?;
    warn_on_unknown_top_level_keys(&value);
    Ok(value)
}

fn warn_on_unknown_top_level_keys(value: &Value) {
    let Some(mapping) = value.as_mapping() else { return };
    for key in mapping.keys() {
        let Some(key) = key.as_str() else { continue };
        if !KNOWN_TOP_LEVEL_KEYS.contains(&key) {
            warn!(key, "unknown top-level configuration key, ignoring");
        }
    }
}

fn build_config(file_layer: Value) -> Result<Config, ConfigError> {
    let defaults = serde_yaml::to_value(Config::default())
        .expect("Config::default() always serializes to a YAML value");
    let merged = merge(defaults, file_layer);
    let merged = apply_env_overrides(merged)?;

    serde_yaml::from_value(merged)
        .map_err(|e| ConfigError::Invalid { field: "<root>".to_string(), message: e.to_string() })
}

/// Deep-merges `overlay` onto `base`: mappings merge key-by-key, anything
/// else (including sequences) in `overlay` replaces the corresponding value
/// in `base` wholesale. `Value::Null` in `overlay` (an absent file, or an
/// explicit `key: null`) is treated as "no override".
fn merge(base: Value, overlay: Value) -> Value {
    match overlay {
        Value::Null => base,
        Value::Mapping(overlay_map) => match base {
            Value::Mapping(mut base_map) => {
                for (key, overlay_value) in overlay_map {
                    let base_value = base_map.get(&key).cloned().unwrap_or(Value::Null);
                    base_map.insert(key, merge(base_value, overlay_value));
                }
                Value::Mapping(base_map)
            }
            _ => Value::Mapping(overlay_map),
        },
        other => other,
    }
}

/// Scans the environment for `CROSSBRIDGE_SECTION__FIELD`-style variables
/// and overlays them onto `merged` before final deserialization. Double
/// underscore walks one level of nesting (`CROSSBRIDGE_SIDECAR__BIND_ADDR`
/// sets `sidecar.bind_addr`); the value is parsed as a YAML scalar so
/// numeric and boolean overrides don't require quoting.
fn apply_env_overrides(mut merged: Value) -> Result<Value, ConfigError> {
    const PREFIX: &str = "CROSSBRIDGE_";

    for (key, value) in std::env::vars() {
        let Some(rest) = key.strip_prefix(PREFIX) else { continue };
        if rest.is_empty() {
            continue;
        }
        let path: Vec<String> = rest.split("__").map(|s| s.to_lowercase()).collect();
        let parsed: Value = serde_yaml::from_str(&value).unwrap_or(Value::String(value));
        set_path(&mut merged, &path, parsed)
            .map_err(|message| ConfigError::Env(format!("{key}: {message}")))?;
    }
    Ok(merged)
}

fn set_path(root: &mut Value, path: &[String], value: Value) -> Result<(), String> {
    let Value::Mapping(mapping) = root else {
        return Err("expected a mapping at config root".to_string());
    };
    let Some((head, rest)) = path.split_first() else {
        return Err("empty override path".to_string());
    };
    let key = Value::String(head.clone());
    if rest.is_empty() {
        mapping.insert(key, value);
        return Ok(());
    }
    let entry = mapping
        .entry(key)
        .or_insert_with(|| Value::Mapping(Default::default()));
    set_path(entry, rest, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_str_overrides_defaults() {
        let config = load_config_str(
            "sidecar:\n  bind_addr: \"0.0.0.0:9000\"\n  worker_count: 7\n",
        )
        .unwrap();
        assert_eq!(config.sidecar.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.sidecar.worker_count, 7);
        // Untouched fields keep their defaults.
        assert_eq!(config.sidecar.max_queue_size, SidecarConfig::default().max_queue_size);
    }

    #[test]
    fn test_load_config_str_empty_string_uses_defaults() {
        let config = load_config_str("").unwrap();
        assert_eq!(config.sidecar.bind_addr, SidecarConfig::default().bind_addr);
    }

    #[test]
    fn test_env_override_sets_nested_field() {
        std::env::set_var("CROSSBRIDGE_SIDECAR__WORKER_COUNT", "11");
        let config = load_config_str("").unwrap();
        std::env::remove_var("CROSSBRIDGE_SIDECAR__WORKER_COUNT");
        assert_eq!(config.sidecar.worker_count, 11);
    }

    #[test]
    fn test_unknown_top_level_key_does_not_fail() {
        let result = load_config_str("not_a_real_section:\n  value: 1\n");
        assert!(result.is_ok());
    }
}
