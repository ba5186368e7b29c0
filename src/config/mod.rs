//! # Declarative Router Configuration
//!
//! ## Responsibility
//! Parse, validate, and hot-reload TOML router configuration: cost
//! ceilings, quality thresholds, routing/eligibility settings, the
//! per-kind cost estimate table, and the provider roster.
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `RouterConfig`
//! - Validated: all semantic constraints are checked before a config is accepted
//! - Type-safe: invalid field combinations are caught at parse time via serde
//! - Hot-reloadable: file changes are detected and validated before applying
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Building the runtime router from config (that belongs to `router`)
//! - Wiring provider call capabilities (that belongs to the embedder)

pub mod loader;
pub mod validation;
pub mod watcher;

use crate::types::RequestKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Default value functions ──────────────────────────────────────────────

/// Default enabled state: true.
fn default_true() -> bool {
    true
}

/// Default daily spend ceiling: $50.
fn default_daily_usd() -> f64 {
    50.0
}

/// Default per-request spend ceiling: $1.
fn default_per_request_usd() -> f64 {
    1.0
}

/// Default monthly spend ceiling: $1000.
fn default_monthly_usd() -> f64 {
    1000.0
}

/// Default minimum acceptable quality score.
fn default_min_score() -> f64 {
    50.0
}

/// Default quality score beneath which a soft failure is retried.
fn default_retry_threshold() -> f64 {
    30.0
}

/// Default base quality score for any successful response.
fn default_base_score() -> f64 {
    40.0
}

/// Default points granted per expected field present.
fn default_points_per_field() -> f64 {
    15.0
}

/// Default expected top-level response fields.
fn default_expected_fields() -> Vec<String> {
    vec![
        "result".to_string(),
        "summary".to_string(),
        "items".to_string(),
        "confidence".to_string(),
    ]
}

/// Default eligibility floor for the rolling success rate.
fn default_min_success_rate() -> f64 {
    80.0
}

/// Default eligibility ceiling for the rolling latency: 10s.
fn default_max_acceptable_latency_ms() -> f64 {
    10_000.0
}

/// Default soft latency ceiling for health classification: 5s.
fn default_soft_latency_ceiling_ms() -> f64 {
    5_000.0
}

/// Default exponential smoothing factor.
fn default_smoothing_alpha() -> f64 {
    0.1
}

/// Default absolute ceiling for a relaxed fallback deadline: 30s.
fn default_max_deadline_ms() -> u64 {
    30_000
}

/// Default time-cost rate: $0.001 per second of provider time.
fn default_time_cost_usd_per_sec() -> f64 {
    0.001
}

/// Default provider weight.
fn default_weight() -> f64 {
    1.0
}

/// Default provider capacity.
fn default_capacity() -> u32 {
    4
}

/// Default per-kind cost estimate table.
fn default_cost_table() -> HashMap<RequestKind, f64> {
    let mut table = HashMap::new();
    table.insert(RequestKind::Comparison, 0.02);
    table.insert(RequestKind::Analysis, 0.05);
    table.insert(RequestKind::Recommendation, 0.03);
    table.insert(RequestKind::TrendScan, 0.01);
    table.insert(RequestKind::Summary, 0.01);
    table
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for a router instance.
///
/// Deserialized from a TOML file and validated before use.
/// Every field has either a required value or a documented default.
///
/// # Example
///
/// ```toml
/// enabled = true
///
/// [cost_limits]
/// daily_usd = 25.0
///
/// [[providers]]
/// id = "primary"
/// weight = 3.0
/// capacity = 8
/// unit_cost_usd = 0.02
/// ```
///
/// # Panics
///
/// This type never panics during construction or access.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RouterConfig {
    /// Master switch. When false, every submit reports no eligible provider.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Spend ceilings enforced by the cost guard.
    #[serde(default)]
    pub cost_limits: CostLimitsConfig,
    /// Quality scoring and fallback settings.
    #[serde(default)]
    pub quality: QualityConfig,
    /// Eligibility ceilings, smoothing, deadlines, and time-cost rate.
    #[serde(default)]
    pub routing: RoutingSection,
    /// Estimated cost per request kind, USD. Tunable policy, not load-bearing.
    #[serde(default = "default_cost_table")]
    pub cost_table: HashMap<RequestKind, f64>,
    /// The provider roster.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cost_limits: CostLimitsConfig::default(),
            quality: QualityConfig::default(),
            routing: RoutingSection::default(),
            cost_table: default_cost_table(),
            providers: Vec::new(),
        }
    }
}

// ── Cost limits ──────────────────────────────────────────────────────────

/// Spend ceilings in USD.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CostLimitsConfig {
    /// Daily ceiling.
    #[serde(default = "default_daily_usd")]
    pub daily_usd: f64,
    /// Per-request ceiling, compared against the kind's estimate.
    #[serde(default = "default_per_request_usd")]
    pub per_request_usd: f64,
    /// Monthly ceiling.
    #[serde(default = "default_monthly_usd")]
    pub monthly_usd: f64,
}

impl Default for CostLimitsConfig {
    fn default() -> Self {
        Self {
            daily_usd: default_daily_usd(),
            per_request_usd: default_per_request_usd(),
            monthly_usd: default_monthly_usd(),
        }
    }
}

// ── Quality ──────────────────────────────────────────────────────────────

/// Quality scoring and fallback settings.
///
/// `retry_threshold` must not exceed `min_score`: scores below
/// `min_score` are soft failures, and only those also below
/// `retry_threshold` are worth the single fallback attempt.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QualityConfig {
    /// Minimum acceptable quality score; below this a success becomes a
    /// soft failure.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Scores below this are retried through fallback; scores in
    /// `[retry_threshold, min_score)` fail without a retry.
    #[serde(default = "default_retry_threshold")]
    pub retry_threshold: f64,
    /// Whether failed dispatches get a fallback attempt at all.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    /// Base score for any successful response.
    #[serde(default = "default_base_score")]
    pub base_score: f64,
    /// Points granted per expected field present in the response body.
    #[serde(default = "default_points_per_field")]
    pub points_per_field: f64,
    /// Expected top-level response fields.
    #[serde(default = "default_expected_fields")]
    pub expected_fields: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            retry_threshold: default_retry_threshold(),
            fallback_enabled: true,
            base_score: default_base_score(),
            points_per_field: default_points_per_field(),
            expected_fields: default_expected_fields(),
        }
    }
}

// ── Routing ──────────────────────────────────────────────────────────────

/// Eligibility ceilings, smoothing, deadlines, and the time-cost rate.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RoutingSection {
    /// Providers with a rolling success rate at or below this are not
    /// eligible.
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    /// Providers with a rolling latency at or above this are not eligible.
    #[serde(default = "default_max_acceptable_latency_ms")]
    pub max_acceptable_latency_ms: f64,
    /// Rolling latency above this marks a provider degraded in health
    /// reports.
    #[serde(default = "default_soft_latency_ceiling_ms")]
    pub soft_latency_ceiling_ms: f64,
    /// Exponential smoothing factor for rolling metrics, in `(0, 1]`.
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,
    /// Absolute ceiling for a relaxed fallback deadline, milliseconds.
    #[serde(default = "default_max_deadline_ms")]
    pub max_deadline_ms: u64,
    /// Linear time-cost rate added to each successful dispatch, USD/s.
    #[serde(default = "default_time_cost_usd_per_sec")]
    pub time_cost_usd_per_sec: f64,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            min_success_rate: default_min_success_rate(),
            max_acceptable_latency_ms: default_max_acceptable_latency_ms(),
            soft_latency_ceiling_ms: default_soft_latency_ceiling_ms(),
            smoothing_alpha: default_smoothing_alpha(),
            max_deadline_ms: default_max_deadline_ms(),
            time_cost_usd_per_sec: default_time_cost_usd_per_sec(),
        }
    }
}

// ── Providers ────────────────────────────────────────────────────────────

/// Static configuration for one provider.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProviderConfig {
    /// Unique provider id; must match a wired call capability.
    pub id: String,
    /// Relative routing preference, > 0.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Maximum concurrent in-flight requests, >= 1.
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Cost per request in USD, >= 0.
    #[serde(default)]
    pub unit_cost_usd: f64,
    /// Whether the provider starts enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// ── Tests ────────────────────────────────────────────────────────────────
