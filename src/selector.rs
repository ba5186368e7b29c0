//! # Route Selector
//!
//! ## Responsibility
//! Given the currently-eligible providers and a request, pick exactly one
//! provider. The strategy is chosen per request from its priority and kind
//! via a fixed policy table.
//!
//! ## Guarantees
//! - Deterministic given a deterministic [`RandomSource`]: the weighted
//!   draw uses cumulative-weight inverse-CDF sampling over a single
//!   uniform value, so tests can assert exact selections.
//! - Non-blocking pure computation: no I/O, no locking beyond atomic reads
//!   of provider load.
//! - Returns `None` only for an empty eligible set.
//!
//! ## NOT Responsible For
//! - Deciding which providers are eligible (see `registry`)
//! - Executing the dispatch (see `executor`)

use crate::registry::Provider;
use crate::types::{Priority, Request, RequestKind};
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// How to pick one provider among the eligible set.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Provider with the minimum unit cost.
    CostOptimized,
    /// Provider with the maximum rolling success rate.
    QualityOptimized,
    /// Provider with the minimum rolling latency.
    SpeedOptimized,
    /// Weighted random draw over weight, headroom, and success rate.
    LoadBalanced,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CostOptimized => write!(f, "cost_optimized"),
            Self::QualityOptimized => write!(f, "quality_optimized"),
            Self::SpeedOptimized => write!(f, "speed_optimized"),
            Self::LoadBalanced => write!(f, "load_balanced"),
        }
    }
}

/// The fixed policy table mapping a request to its selection strategy.
///
/// Critical priority always wins; otherwise analytical kinds route for
/// reliability, scan-style kinds for cost, and the rest are load-balanced.
///
/// # Panics
///
/// This function never panics.
pub fn strategy_for(request: &Request) -> SelectionStrategy {
    if request.priority == Priority::Critical {
        return SelectionStrategy::SpeedOptimized;
    }
    match request.kind {
        RequestKind::Analysis | RequestKind::Comparison => {
            SelectionStrategy::QualityOptimized
        }
        RequestKind::TrendScan | RequestKind::Summary => {
            SelectionStrategy::CostOptimized
        }
        RequestKind::Recommendation => SelectionStrategy::LoadBalanced,
    }
}

/// Source of uniform random values in `[0, 1)`.
///
/// Abstracted so tests can supply a deterministic sequence and assert
/// exact selection outcomes.
pub trait RandomSource: Send + Sync {
    /// Next uniform value in `[0, 1)`.
    fn next_f64(&self) -> f64;
}

/// Production random source backed by the thread-local RNG.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn next_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Deterministic random source that cycles through a fixed sequence.
///
/// Intended for tests; an empty sequence yields `0.0` forever.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug)]
pub struct SequenceSource {
    values: Vec<f64>,
    next: AtomicUsize,
}

impl SequenceSource {
    /// Create a source that cycles through `values`.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            next: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for SequenceSource {
    fn next_f64(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.values.len();
        self.values[idx]
    }
}

/// Picks one provider per request according to the policy table.
///
/// # Panics
///
/// This type and its methods never panic.
pub struct RouteSelector {
    rng: Arc<dyn RandomSource>,
}

impl std::fmt::Debug for RouteSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteSelector").finish()
    }
}

impl Default for RouteSelector {
    fn default() -> Self {
        Self::new(Arc::new(ThreadRngSource))
    }
}

impl RouteSelector {
    /// Create a selector with the given random source.
    ///
    /// # Arguments
    ///
    /// * `rng` - Uniform random source for the load-balanced draw.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self { rng }
    }

    /// Pick exactly one provider for the request.
    ///
    /// # Arguments
    ///
    /// * `eligible` - Providers currently able to take the request.
    /// * `request` - The request being routed.
    ///
    /// # Returns
    ///
    /// `None` only when `eligible` is empty.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn select(
        &self,
        eligible: &[Arc<Provider>],
        request: &Request,
    ) -> Option<Arc<Provider>> {
        if eligible.is_empty() {
            return None;
        }

        let strategy = strategy_for(request);
        let chosen = match strategy {
            SelectionStrategy::CostOptimized => eligible
                .iter()
                .min_by_key(|p| p.unit_cost_micro())
                .cloned(),
            SelectionStrategy::QualityOptimized => eligible
                .iter()
                .max_by(|a, b| a.success_rate().total_cmp(&b.success_rate()))
                .cloned(),
            SelectionStrategy::SpeedOptimized => eligible
                .iter()
                .min_by(|a, b| a.latency_ms().total_cmp(&b.latency_ms()))
                .cloned(),
            SelectionStrategy::LoadBalanced => self.weighted_draw(eligible),
        };

        if let Some(ref p) = chosen {
            tracing::debug!(
                request = %request.id,
                strategy = %strategy,
                provider = p.id(),
                "provider selected"
            );
        }
        chosen
    }

    /// Weighted random draw via cumulative-weight inverse-CDF sampling.
    ///
    /// Draw weight per provider: `weight * (1 - load/capacity) *
    /// (success_rate/100)`. A uniform value in `[0, total)` is mapped to
    /// the first provider whose cumulative weight exceeds it. When every
    /// draw weight is zero the first eligible provider is returned.
    fn weighted_draw(&self, eligible: &[Arc<Provider>]) -> Option<Arc<Provider>> {
        let weights: Vec<f64> = eligible.iter().map(|p| draw_weight(p)).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return eligible.first().cloned();
        }

        let target = self.rng.next_f64() * total;
        let mut cumulative = 0.0;
        for (provider, weight) in eligible.iter().zip(&weights) {
            cumulative += weight;
            if target < cumulative {
                return Some(Arc::clone(provider));
            }
        }
        // target == total can only happen at the float boundary.
        eligible.last().cloned()
    }
}

/// Draw weight for the load-balanced strategy.
///
/// # Panics
///
/// This function never panics.
pub fn draw_weight(provider: &Provider) -> f64 {
    provider.weight()
        * (1.0 - provider.utilization())
        * (provider.success_rate() / 100.0)
}

// ── Tests ──────────────────────────────────────────────────────────────
