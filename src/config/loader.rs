//! Configuration file loading.
//!
//! ## Responsibility
//! Read a TOML file from disk, parse it into a [`RouterConfig`], and run
//! validation before returning. This is the primary entry point for
//! loading router configuration at startup.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//!
//! ## NOT Responsible For
//! - Hot-reloading on file changes (that belongs to `watcher`)
//! - Defining the config schema (that belongs to `mod.rs`)

use std::path::Path;

use super::validation::{self, ConfigError};
use super::RouterConfig;

/// Load a [`RouterConfig`] from a TOML file.
///
/// Reads the file, parses it as TOML, and validates all semantic
/// constraints.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file.
///
/// # Returns
///
/// - `Ok(RouterConfig)` if the file is readable, well-formed, and valid.
/// - `Err(ConfigError::Io)` if the file cannot be read.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
///
/// # Example
///
/// ```rust,ignore
/// use backend_router::config::loader::load_from_file;
/// use std::path::Path;
///
/// let config = load_from_file(Path::new("router.toml"))?;
/// println!("{} providers configured", config.providers.len());
/// ```
pub fn load_from_file(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load a [`RouterConfig`] from a TOML string.
///
/// Useful for testing or embedding configs without file I/O.
///
/// # Arguments
///
/// * `content` - TOML content as a string.
/// * `source_name` - Identifier for the source (used in error messages).
///
/// # Returns
///
/// - `Ok(RouterConfig)` if the TOML is well-formed and valid.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
pub fn load_from_str(content: &str, source_name: &str) -> Result<RouterConfig, ConfigError> {
    let config: RouterConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validation::validate(&config).map_err(|errors| {
        ConfigError::Validation(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    })?;

    Ok(config)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_TOML: &str = r#"
enabled = true

[cost_limits]
daily_usd = 25.0
per_request_usd = 2.0
monthly_usd = 500.0

[[providers]]
id = "primary"
weight = 3.0
capacity = 8
unit_cost_usd = 0.02

[[providers]]
id = "backup"
weight = 1.0
capacity = 4
unit_cost_usd = 0.01
"#;

    #[test]
    fn test_load_valid_toml_string() {
        let config = load_from_str(VALID_TOML, "inline")
            .unwrap_or_else(|e| std::panic::panic_any(format!("test load: {e}")));
        assert_eq!(config.providers.len(), 2);
        assert!((config.cost_limits.daily_usd - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_malformed_toml_is_parse_error() {
        let result = load_from_str("this is not toml ===", "inline");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_invalid_config_is_validation_error() {
        let toml = r#"
[[providers]]
id = "primary"
weight = -1.0
"#;
        let result = load_from_str(toml, "inline");
        match result {
            Err(ConfigError::Validation(msg)) => {
                assert!(msg.contains("weight"), "message: {msg}");
            }
            other => std::panic::panic_any(format!("expected Validation, got {other:?}")),
        }
    }

    #[test]
    fn test_load_from_file_round_trip() {
        let dir = tempfile::tempdir()
            .unwrap_or_else(|e| std::panic::panic_any(format!("test tempdir: {e}")));
        let path = dir.path().join("router.toml");
        std::fs::write(&path, VALID_TOML)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test write: {e}")));

        let config = load_from_file(&path)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test load: {e}")));
        assert_eq!(config.providers[0].id, "primary");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = load_from_file(Path::new("/definitely/not/here/router.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_error_message_includes_source_name() {
        let result = load_from_str("= broken", "my-config.toml");
        match result {
            Err(e) => assert!(e.to_string().contains("my-config.toml")),
            Ok(_) => std::panic::panic_any("malformed TOML must not parse"),
        }
    }
}
