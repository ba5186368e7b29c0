//! # Backend Registry
//!
//! ## Responsibility
//! Hold the roster of backend providers and their live routing statistics:
//! capacity, current load, rolling success rate, rolling latency, and unit
//! cost. Answer the eligibility question for each dispatch.
//!
//! ## Guarantees
//! - `0 <= current_load <= capacity` at all times: slot acquisition is a
//!   compare-exchange loop that refuses to pass capacity, release saturates
//!   at zero.
//! - Rolling metrics for one provider are updated in outcome order behind
//!   that provider's own lock; unrelated providers never contend.
//! - Providers are disabled, never removed, while the process runs.
//! - An empty eligible set is a normal outcome, not an error.
//!
//! ## NOT Responsible For
//! - Choosing among eligible providers (see `selector`)
//! - Acquiring/releasing load slots around a dispatch (see `executor`)
//! - Classifying provider health (see `health`)

use crate::config::RouterConfig;
use crate::cost::{f64_to_micro, micro_to_f64};
use crate::provider::ProviderCall;
use crate::RouterError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Exponentially smoothed per-provider statistics.
///
/// Success rate starts optimistic (100) so new providers are routable;
/// latency is seeded with the first observed sample.
#[derive(Debug, Clone)]
struct RollingStats {
    /// Rolling success rate, 0-100.
    success_rate: f64,
    /// Rolling latency in milliseconds.
    latency_ms: f64,
    /// Number of outcomes observed.
    samples: u64,
}

impl Default for RollingStats {
    fn default() -> Self {
        Self {
            success_rate: 100.0,
            latency_ms: 0.0,
            samples: 0,
        }
    }
}

/// Runtime record for one backend provider.
///
/// Static fields (id, weight, capacity, unit cost) come from config; the
/// load counter is mutated only through the executor's load guard, and the
/// rolling stats only through the health monitor.
///
/// # Panics
///
/// This type and its methods never panic.
pub struct Provider {
    id: String,
    endpoint: Arc<dyn ProviderCall>,
    weight: f64,
    capacity: u32,
    unit_cost_micro: u64,
    enabled: AtomicBool,
    load: AtomicU32,
    rolling: Mutex<RollingStats>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("weight", &self.weight)
            .field("capacity", &self.capacity)
            .field("load", &self.current_load())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Provider {
    /// Create a provider record.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique provider id.
    /// * `endpoint` - The opaque call capability.
    /// * `weight` - Relative routing preference, > 0.
    /// * `capacity` - Maximum concurrent in-flight requests.
    /// * `unit_cost_usd` - Cost per request in USD, >= 0.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new(
        id: impl Into<String>,
        endpoint: Arc<dyn ProviderCall>,
        weight: f64,
        capacity: u32,
        unit_cost_usd: f64,
    ) -> Self {
        Self {
            id: id.into(),
            endpoint,
            weight,
            capacity,
            unit_cost_micro: f64_to_micro(unit_cost_usd),
            enabled: AtomicBool::new(true),
            load: AtomicU32::new(0),
            rolling: Mutex::new(RollingStats::default()),
        }
    }

    /// Provider id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Relative routing weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Maximum concurrent in-flight requests.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Unit cost per request in micro-dollars.
    pub fn unit_cost_micro(&self) -> u64 {
        self.unit_cost_micro
    }

    /// Unit cost per request in USD.
    pub fn unit_cost_usd(&self) -> f64 {
        micro_to_f64(self.unit_cost_micro)
    }

    /// The opaque call capability.
    pub fn endpoint(&self) -> &dyn ProviderCall {
        self.endpoint.as_ref()
    }

    /// Current number of in-flight requests.
    pub fn current_load(&self) -> u32 {
        self.load.load(Ordering::Acquire)
    }

    /// Whether the provider is currently enabled for routing.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable the provider. Disabled providers keep their stats
    /// and remain in the roster.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Rolling success rate, 0-100.
    pub fn success_rate(&self) -> f64 {
        self.rolling
            .lock()
            .map(|s| s.success_rate)
            .unwrap_or_else(|e| e.into_inner().success_rate)
    }

    /// Rolling latency in milliseconds.
    pub fn latency_ms(&self) -> f64 {
        self.rolling
            .lock()
            .map(|s| s.latency_ms)
            .unwrap_or_else(|e| e.into_inner().latency_ms)
    }

    /// Fractional utilization, `load / capacity` in `[0, 1]`.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        f64::from(self.current_load()) / f64::from(self.capacity)
    }

    /// Try to acquire one load slot.
    ///
    /// Returns `false` when the provider is already at capacity. The
    /// compare-exchange loop guarantees the counter never passes capacity
    /// even under concurrent acquisition.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub(crate) fn try_acquire_slot(&self) -> bool {
        let mut current = self.load.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return false;
            }
            match self.load.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Release one load slot. Saturates at zero.
    pub(crate) fn release_slot(&self) {
        let _ = self
            .load
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                v.checked_sub(1)
            });
    }

    /// Apply one outcome sample to the rolling statistics.
    ///
    /// `new = old * (1 - alpha) + sample * alpha`; the first latency sample
    /// seeds the value directly. Updates for one provider are serialised by
    /// this provider's lock, keeping the smoothing well-defined under
    /// concurrent recording.
    pub(crate) fn observe(&self, alpha: f64, success: bool, elapsed_ms: f64) {
        let mut stats = self
            .rolling
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let success_sample = if success { 100.0 } else { 0.0 };
        stats.success_rate =
            stats.success_rate * (1.0 - alpha) + success_sample * alpha;
        if stats.samples == 0 {
            stats.latency_ms = elapsed_ms;
        } else {
            stats.latency_ms = stats.latency_ms * (1.0 - alpha) + elapsed_ms * alpha;
        }
        stats.samples += 1;
    }
}

/// The provider roster plus eligibility thresholds.
///
/// # Panics
///
/// This type and its methods never panic.
pub struct BackendRegistry {
    providers: Vec<Arc<Provider>>,
    min_success_rate: f64,
    max_latency_ms: f64,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("providers", &self.providers.len())
            .field("min_success_rate", &self.min_success_rate)
            .field("max_latency_ms", &self.max_latency_ms)
            .finish()
    }
}

impl BackendRegistry {
    /// Build the registry from config, wiring each configured provider to
    /// its call capability by id.
    ///
    /// # Arguments
    ///
    /// * `config` - Router configuration (providers + eligibility ceilings).
    /// * `endpoints` - Call capability per provider id.
    ///
    /// # Returns
    ///
    /// - `Ok(BackendRegistry)` when every configured provider has an
    ///   endpoint.
    /// - `Err(RouterError::MissingEndpoint)` otherwise.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn from_config(
        config: &RouterConfig,
        endpoints: &HashMap<String, Arc<dyn ProviderCall>>,
    ) -> Result<Self, RouterError> {
        let mut providers = Vec::with_capacity(config.providers.len());
        for pc in &config.providers {
            let endpoint = endpoints.get(&pc.id).cloned().ok_or_else(|| {
                RouterError::MissingEndpoint { id: pc.id.clone() }
            })?;
            let provider = Provider::new(
                pc.id.clone(),
                endpoint,
                pc.weight,
                pc.capacity,
                pc.unit_cost_usd,
            );
            provider.set_enabled(pc.enabled);
            providers.push(Arc::new(provider));
        }

        Ok(Self {
            providers,
            min_success_rate: config.routing.min_success_rate,
            max_latency_ms: config.routing.max_acceptable_latency_ms,
        })
    }

    /// Build a registry directly from provider records. Primarily for
    /// tests and embedding.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn from_providers(
        providers: Vec<Arc<Provider>>,
        min_success_rate: f64,
        max_latency_ms: f64,
    ) -> Self {
        Self {
            providers,
            min_success_rate,
            max_latency_ms,
        }
    }

    /// All registered providers, in config order.
    pub fn all(&self) -> &[Arc<Provider>] {
        &self.providers
    }

    /// Look up a provider by id.
    pub fn get(&self, id: &str) -> Option<Arc<Provider>> {
        self.providers.iter().find(|p| p.id() == id).cloned()
    }

    /// Enable or disable a provider by id. Returns `false` when the id is
    /// unknown.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        match self.get(id) {
            Some(p) => {
                p.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// Providers currently able to take a request: enabled, below
    /// capacity, rolling success rate above the floor, rolling latency
    /// below the ceiling.
    ///
    /// An empty result is a normal, expected outcome.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn eligible(&self) -> Vec<Arc<Provider>> {
        self.providers
            .iter()
            .filter(|p| {
                p.is_enabled()
                    && p.current_load() < p.capacity()
                    && p.success_rate() > self.min_success_rate
                    && p.latency_ms() < self.max_latency_ms
            })
            .cloned()
            .collect()
    }

    /// Like [`eligible`](Self::eligible), excluding the given provider
    /// ids. Used by the fallback path so a retry lands on a different
    /// provider than the one that just failed.
    pub fn eligible_excluding(&self, excluded: &HashSet<String>) -> Vec<Arc<Provider>> {
        self.eligible()
            .into_iter()
            .filter(|p| !excluded.contains(p.id()))
            .collect()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
