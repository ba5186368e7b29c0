//! # Metrics & Health Monitor
//!
//! ## Responsibility
//! Fold per-provider outcome history into rolling metrics via exponential
//! smoothing, and derive on demand a point-in-time health classification
//! of every provider and of the process as a whole.
//!
//! ## Guarantees
//! - O(1) memory per provider: exponential smoothing, not a sample window.
//! - Updates to one provider's rolling metrics are applied in the order
//!   their outcomes are recorded, serialised behind that provider's own
//!   lock rather than a global one.
//! - A `HealthReport` is derived, never stored; two consecutive checks can
//!   differ as outcomes continue to arrive.
//!
//! ## NOT Responsible For
//! - Deciding eligibility from the metrics (see `registry`)
//! - Recording spend (see `cost`)

use crate::config::RoutingSection;
use crate::cost::CostGuard;
use crate::registry::{BackendRegistry, Provider};
use crate::types::Outcome;
use serde::Serialize;
use std::fmt;

/// Budget fraction above which overall health escalates to critical.
const BUDGET_CRITICAL_FRACTION: f64 = 0.95;

/// Health classification for a provider or the whole process.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Operating normally.
    Healthy,
    /// Impaired but serving: low success rate, high latency, or high load.
    Degraded,
    /// Failing or saturated; intervention likely required.
    Critical,
}

impl HealthStatus {
    /// Severity rank for worst-of aggregation.
    fn rank(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Critical => 2,
        }
    }

    /// The worse of two statuses.
    pub fn worst(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Point-in-time health view of one provider.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// Provider id.
    pub id: String,
    /// Classification at the time of the check.
    pub status: HealthStatus,
    /// Whether the provider is enabled for routing.
    pub enabled: bool,
    /// Rolling success rate, 0-100.
    pub success_rate: f64,
    /// Rolling latency in milliseconds.
    pub latency_ms: f64,
    /// In-flight requests at the time of the check.
    pub load: u32,
    /// Maximum concurrent in-flight requests.
    pub capacity: u32,
    /// `load / capacity`.
    pub utilization: f64,
}

/// Point-in-time health view of the whole router.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Worst provider status, escalated by budget pressure.
    pub overall: HealthStatus,
    /// Per-provider detail, in roster order.
    pub providers: Vec<ProviderHealth>,
    /// Fraction of the daily budget spent.
    pub daily_budget_used: f64,
    /// Fraction of the monthly budget spent.
    pub monthly_budget_used: f64,
}

/// Records outcomes into rolling metrics and derives health reports.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug)]
pub struct HealthMonitor {
    alpha: f64,
    soft_latency_ceiling_ms: f64,
}

impl HealthMonitor {
    /// Build a monitor from the routing settings.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn from_config(routing: &RoutingSection) -> Self {
        Self {
            alpha: routing.smoothing_alpha,
            soft_latency_ceiling_ms: routing.soft_latency_ceiling_ms,
        }
    }

    /// Fold one outcome into the provider's rolling metrics.
    ///
    /// `new = old * (1 - alpha) + sample * alpha` for both the success
    /// rate (sample 100/0) and the latency (sample = elapsed ms).
    ///
    /// # Arguments
    ///
    /// * `provider` - The provider that served the dispatch.
    /// * `outcome` - The outcome to record.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn record(&self, provider: &Provider, outcome: &Outcome) {
        provider.observe(
            self.alpha,
            outcome.succeeded,
            outcome.elapsed.as_secs_f64() * 1000.0,
        );
        tracing::debug!(
            provider = provider.id(),
            succeeded = outcome.succeeded,
            success_rate = provider.success_rate(),
            latency_ms = provider.latency_ms(),
            "outcome recorded"
        );
    }

    /// Classify one provider.
    fn classify(&self, provider: &Provider) -> HealthStatus {
        let success = provider.success_rate();
        let utilization = provider.utilization();
        if success < 60.0 || utilization > 0.9 {
            HealthStatus::Critical
        } else if success < 80.0
            || provider.latency_ms() > self.soft_latency_ceiling_ms
            || utilization > 0.75
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Derive a [`HealthReport`] from the registry and cost guard.
    ///
    /// Overall status is the worst provider status, escalated to critical
    /// when either budget is more than 95% spent.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn health_check(
        &self,
        registry: &BackendRegistry,
        guard: &CostGuard,
    ) -> HealthReport {
        let providers: Vec<ProviderHealth> = registry
            .all()
            .iter()
            .map(|p| ProviderHealth {
                id: p.id().to_string(),
                status: self.classify(p),
                enabled: p.is_enabled(),
                success_rate: p.success_rate(),
                latency_ms: p.latency_ms(),
                load: p.current_load(),
                capacity: p.capacity(),
                utilization: p.utilization(),
            })
            .collect();

        let mut overall = providers
            .iter()
            .map(|p| p.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        let daily_budget_used = guard.daily_budget_used();
        let monthly_budget_used = guard.monthly_budget_used();
        if daily_budget_used > BUDGET_CRITICAL_FRACTION
            || monthly_budget_used > BUDGET_CRITICAL_FRACTION
        {
            overall = HealthStatus::Critical;
        }

        HealthReport {
            overall,
            providers,
            daily_budget_used,
            monthly_budget_used,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
