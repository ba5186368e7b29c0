//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`RouterConfig`] that cannot
//! be expressed through the type system alone (e.g., range checks,
//! cross-field invariants).
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use super::RouterConfig;
use std::collections::HashSet;

/// Errors arising from configuration parsing, validation, or I/O.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "routing.smoothing_alpha").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Validate all semantic constraints on a [`RouterConfig`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Arguments
///
/// * `config` - The parsed config to validate.
///
/// # Returns
///
/// - `Ok(())` if all constraints pass.
/// - `Err(Vec<ConfigError>)` with every violation found.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &RouterConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Cost limits ──────────────────────────────────────────────────
    if config.cost_limits.daily_usd <= 0.0 {
        errors.push(ConfigError::InvalidField {
            field: "cost_limits.daily_usd".into(),
            value: config.cost_limits.daily_usd.to_string(),
            reason: "must be positive".into(),
        });
    }

    if config.cost_limits.per_request_usd <= 0.0 {
        errors.push(ConfigError::InvalidField {
            field: "cost_limits.per_request_usd".into(),
            value: config.cost_limits.per_request_usd.to_string(),
            reason: "must be positive".into(),
        });
    }

    if config.cost_limits.monthly_usd <= 0.0 {
        errors.push(ConfigError::InvalidField {
            field: "cost_limits.monthly_usd".into(),
            value: config.cost_limits.monthly_usd.to_string(),
            reason: "must be positive".into(),
        });
    }

    // ── Quality thresholds ───────────────────────────────────────────
    if !(0.0..=100.0).contains(&config.quality.min_score) {
        errors.push(ConfigError::InvalidField {
            field: "quality.min_score".into(),
            value: config.quality.min_score.to_string(),
            reason: "must be between 0 and 100".into(),
        });
    }

    if !(0.0..=100.0).contains(&config.quality.retry_threshold) {
        errors.push(ConfigError::InvalidField {
            field: "quality.retry_threshold".into(),
            value: config.quality.retry_threshold.to_string(),
            reason: "must be between 0 and 100".into(),
        });
    }

    if config.quality.retry_threshold > config.quality.min_score {
        errors.push(ConfigError::InvalidField {
            field: "quality.retry_threshold".into(),
            value: config.quality.retry_threshold.to_string(),
            reason: "must not exceed quality.min_score".into(),
        });
    }

    if config.quality.base_score < 0.0 || config.quality.points_per_field < 0.0 {
        errors.push(ConfigError::InvalidField {
            field: "quality.base_score".into(),
            value: format!(
                "base={} points={}",
                config.quality.base_score, config.quality.points_per_field
            ),
            reason: "scoring parameters must be non-negative".into(),
        });
    }

    // ── Routing settings ─────────────────────────────────────────────
    if config.routing.smoothing_alpha <= 0.0 || config.routing.smoothing_alpha > 1.0 {
        errors.push(ConfigError::InvalidField {
            field: "routing.smoothing_alpha".into(),
            value: config.routing.smoothing_alpha.to_string(),
            reason: "must be in (0, 1]".into(),
        });
    }

    if !(0.0..=100.0).contains(&config.routing.min_success_rate) {
        errors.push(ConfigError::InvalidField {
            field: "routing.min_success_rate".into(),
            value: config.routing.min_success_rate.to_string(),
            reason: "must be between 0 and 100".into(),
        });
    }

    if config.routing.max_acceptable_latency_ms <= 0.0 {
        errors.push(ConfigError::InvalidField {
            field: "routing.max_acceptable_latency_ms".into(),
            value: config.routing.max_acceptable_latency_ms.to_string(),
            reason: "must be positive".into(),
        });
    }

    if config.routing.max_deadline_ms == 0 {
        errors.push(ConfigError::InvalidField {
            field: "routing.max_deadline_ms".into(),
            value: "0".into(),
            reason: "must be at least 1 millisecond".into(),
        });
    }

    if config.routing.time_cost_usd_per_sec < 0.0 {
        errors.push(ConfigError::InvalidField {
            field: "routing.time_cost_usd_per_sec".into(),
            value: config.routing.time_cost_usd_per_sec.to_string(),
            reason: "must be non-negative".into(),
        });
    }

    // ── Cost table ───────────────────────────────────────────────────
    for (kind, estimate) in &config.cost_table {
        if *estimate < 0.0 {
            errors.push(ConfigError::InvalidField {
                field: format!("cost_table.{kind}"),
                value: estimate.to_string(),
                reason: "estimate must be non-negative".into(),
            });
        }
    }

    // ── Providers ────────────────────────────────────────────────────
    if config.providers.is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "providers".into(),
            value: "[]".into(),
            reason: "at least one provider is required".into(),
        });
    }

    let mut seen_ids = HashSet::new();
    for (idx, provider) in config.providers.iter().enumerate() {
        if provider.id.trim().is_empty() {
            errors.push(ConfigError::InvalidField {
                field: format!("providers[{idx}].id"),
                value: String::new(),
                reason: "provider id must not be empty".into(),
            });
        }

        if !seen_ids.insert(provider.id.clone()) {
            errors.push(ConfigError::InvalidField {
                field: format!("providers[{idx}].id"),
                value: provider.id.clone(),
                reason: "provider ids must be unique".into(),
            });
        }

        if provider.weight <= 0.0 {
            errors.push(ConfigError::InvalidField {
                field: format!("providers[{idx}].weight"),
                value: provider.weight.to_string(),
                reason: "must be positive".into(),
            });
        }

        if provider.capacity == 0 {
            errors.push(ConfigError::InvalidField {
                field: format!("providers[{idx}].capacity"),
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        if provider.unit_cost_usd < 0.0 {
            errors.push(ConfigError::InvalidField {
                field: format!("providers[{idx}].unit_cost_usd"),
                value: provider.unit_cost_usd.to_string(),
                reason: "must be non-negative".into(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
