//! # Backend Router Core
//!
//! ## Responsibility
//! The single entry point tying the pipeline together: admit each request
//! through the cost guard, select a provider, execute with a deadline,
//! record the outcome, and drive the bounded fallback state machine on
//! failure.
//!
//! ## States
//! - **Pending**: admission and provider selection for the first attempt
//! - **Dispatched**: first attempt executing
//! - **Failed**: first attempt failed; decide whether to fall back
//! - **FallbackDispatched**: the single fallback attempt executing
//! - **Succeeded / TerminalFailed**: final, returned to the caller
//!
//! A request that fails while already a fallback attempt terminates; the
//! enum transitions make a second fallback structurally impossible rather
//! than relying on a flag threaded through recursive calls.
//!
//! ## Guarantees
//! - `submit` returns exactly one [`Outcome`] and never an `Err`; every
//!   failure mode is a typed outcome.
//! - Thread-safe: a `BackendRouter` behind `Arc` serves many concurrent
//!   submits.
//! - The ledger and rolling metrics are touched exactly once per executed
//!   dispatch, and never for requests denied before dispatch.
//!
//! ## NOT Responsible For
//! - Provider call semantics (see `provider`)
//! - Eligibility criteria (see `registry`)
//! - Health classification (see `health`)

use crate::config::{validation, RouterConfig};
use crate::cost::{Admission, CostGuard, CostSnapshot};
use crate::executor::Executor;
use crate::health::{HealthMonitor, HealthReport};
use crate::provider::ProviderCall;
use crate::registry::{BackendRegistry, Provider};
use crate::selector::{RandomSource, RouteSelector};
use crate::types::{ErrorKind, Outcome, Request};
use crate::RouterError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Dispatch lifecycle for one submitted request.
enum DispatchState {
    /// Awaiting admission and first selection.
    Pending(Request),
    /// First attempt chosen and about to execute.
    Dispatched {
        /// The request being dispatched.
        request: Request,
        /// The selected provider.
        provider: Arc<Provider>,
    },
    /// First attempt failed; fallback decision pending.
    Failed {
        /// The original (non-fallback) request.
        request: Request,
        /// The failed outcome, returned if no fallback is taken.
        outcome: Outcome,
    },
    /// Fallback attempt chosen and about to execute.
    FallbackDispatched {
        /// The derived fallback request.
        request: Request,
        /// The selected fallback provider.
        provider: Arc<Provider>,
    },
    /// Final success.
    Succeeded(Outcome),
    /// Final failure.
    TerminalFailed(Outcome),
}

/// The backend request router.
///
/// An explicit, owned instance: construct once with [`BackendRouter::new`]
/// and share behind `Arc`. Independent instances are fully isolated, which
/// keeps tests hermetic.
///
/// # Example
///
/// ```no_run
/// use backend_router::config::RouterConfig;
/// use backend_router::provider::{EchoProvider, ProviderCall};
/// use backend_router::router::BackendRouter;
/// use backend_router::types::{Request, RequestKind};
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), backend_router::RouterError> {
/// let config = backend_router::config::loader::load_from_str(
///     r#"
///     [[providers]]
///     id = "primary"
///     "#,
///     "inline",
/// ).map_err(|e| backend_router::RouterError::Config(e.to_string()))?;
///
/// let mut endpoints: HashMap<String, Arc<dyn ProviderCall>> = HashMap::new();
/// endpoints.insert("primary".to_string(), Arc::new(EchoProvider::new()));
///
/// let router = BackendRouter::new(config, endpoints)?;
/// let outcome = router.submit(Request::new(RequestKind::Summary, "hi")).await;
/// assert!(outcome.succeeded);
/// # Ok(()) }
/// ```
///
/// # Panics
///
/// This type and its methods never panic.
pub struct BackendRouter {
    enabled: AtomicBool,
    registry: BackendRegistry,
    guard: CostGuard,
    selector: RouteSelector,
    executor: Executor,
    monitor: HealthMonitor,
    fallback_enabled: bool,
    min_score: f64,
    retry_threshold: f64,
    max_deadline: Duration,
}

impl std::fmt::Debug for BackendRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRouter")
            .field("enabled", &self.is_enabled())
            .field("registry", &self.registry)
            .field("fallback_enabled", &self.fallback_enabled)
            .finish()
    }
}

impl BackendRouter {
    /// Build a router from a validated config and the call capability for
    /// each configured provider.
    ///
    /// # Arguments
    ///
    /// * `config` - Router configuration.
    /// * `endpoints` - Call capability per provider id.
    ///
    /// # Returns
    ///
    /// - `Ok(BackendRouter)` ready to accept submits.
    /// - `Err(RouterError::Config)` when the config fails validation.
    /// - `Err(RouterError::MissingEndpoint)` when a configured provider
    ///   has no wired capability.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new(
        config: RouterConfig,
        endpoints: HashMap<String, Arc<dyn ProviderCall>>,
    ) -> Result<Self, RouterError> {
        validation::validate(&config).map_err(|errors| {
            RouterError::Config(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        })?;

        let registry = BackendRegistry::from_config(&config, &endpoints)?;

        Ok(Self {
            enabled: AtomicBool::new(config.enabled),
            registry,
            guard: CostGuard::new(&config.cost_limits, &config.cost_table),
            selector: RouteSelector::default(),
            executor: Executor::from_config(&config.quality, &config.routing),
            monitor: HealthMonitor::from_config(&config.routing),
            fallback_enabled: config.quality.fallback_enabled,
            min_score: config.quality.min_score,
            retry_threshold: config.quality.retry_threshold,
            max_deadline: Duration::from_millis(config.routing.max_deadline_ms),
        })
    }

    /// Replace the random source used by the load-balanced strategy.
    ///
    /// Primarily for tests that need deterministic selection.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn with_random_source(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.selector = RouteSelector::new(rng);
        self
    }

    /// Route one request to completion.
    ///
    /// Synchronous from the caller's perspective: awaiting this returns
    /// the final [`Outcome`], after at most one fallback attempt.
    ///
    /// # Arguments
    ///
    /// * `request` - The request to route.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub async fn submit(&self, request: Request) -> Outcome {
        if !self.is_enabled() {
            tracing::warn!(request = %request.id, "router disabled, rejecting");
            return Outcome::failure(
                request.id,
                None,
                ErrorKind::NoEligibleProvider,
                Duration::ZERO,
                false,
            );
        }

        tracing::info!(
            request = %request.id,
            kind = %request.kind,
            priority = %request.priority,
            "request submitted"
        );

        let mut state = DispatchState::Pending(request);
        loop {
            state = match state {
                DispatchState::Pending(request) => {
                    if let Admission::Denied { reason } = self.guard.admit(&request) {
                        tracing::warn!(request = %request.id, %reason, "admission denied");
                        return Outcome::failure(
                            request.id,
                            None,
                            ErrorKind::CostLimitExceeded,
                            Duration::ZERO,
                            false,
                        );
                    }

                    let eligible = self.registry.eligible();
                    match self.selector.select(&eligible, &request) {
                        Some(provider) => DispatchState::Dispatched { request, provider },
                        None => {
                            tracing::warn!(request = %request.id, "no eligible provider");
                            return Outcome::failure(
                                request.id,
                                None,
                                ErrorKind::NoEligibleProvider,
                                Duration::ZERO,
                                false,
                            );
                        }
                    }
                }

                DispatchState::Dispatched { request, provider } => {
                    let outcome = self.dispatch(&provider, &request).await;
                    if outcome.succeeded {
                        DispatchState::Succeeded(outcome)
                    } else {
                        DispatchState::Failed { request, outcome }
                    }
                }

                DispatchState::Failed { request, outcome } => {
                    self.decide_fallback(request, outcome)
                }

                DispatchState::FallbackDispatched { request, provider } => {
                    let outcome = self.dispatch(&provider, &request).await;
                    if outcome.succeeded {
                        DispatchState::Succeeded(outcome)
                    } else {
                        // A fallback attempt gets no further retries.
                        DispatchState::TerminalFailed(outcome)
                    }
                }

                DispatchState::Succeeded(outcome) => {
                    tracing::info!(request = %outcome.request_id, %outcome, "request completed");
                    return outcome;
                }

                DispatchState::TerminalFailed(outcome) => {
                    tracing::warn!(request = %outcome.request_id, %outcome, "request failed");
                    return outcome;
                }
            };
        }
    }

    /// Execute one attempt and record it in metrics and the ledger.
    ///
    /// Rolling metrics reflect the provider call itself, so they are
    /// recorded before the quality gate converts a low-scoring success
    /// into a soft failure.
    async fn dispatch(&self, provider: &Arc<Provider>, request: &Request) -> Outcome {
        let mut outcome = self.executor.execute(provider, request).await;

        self.monitor.record(provider, &outcome);
        self.guard.ledger().record(outcome.cost_usd);

        if outcome.succeeded && outcome.quality_score < self.min_score {
            tracing::warn!(
                request = %request.id,
                provider = provider.id(),
                quality = outcome.quality_score,
                min_score = self.min_score,
                "response quality below threshold"
            );
            outcome.succeeded = false;
            outcome.error_kind = Some(ErrorKind::QualityBelowThreshold);
        }

        outcome
    }

    /// Decide whether a failed first attempt gets the single fallback.
    fn decide_fallback(&self, request: Request, outcome: Outcome) -> DispatchState {
        if request.fallback_attempt || !self.fallback_enabled {
            return DispatchState::TerminalFailed(outcome);
        }

        // Soft quality failures in [retry_threshold, min_score) are not
        // worth burning the fallback.
        if outcome.error_kind == Some(ErrorKind::QualityBelowThreshold)
            && outcome.quality_score >= self.retry_threshold
        {
            return DispatchState::TerminalFailed(outcome);
        }

        let fallback = request.derive_fallback(self.max_deadline);

        if let Admission::Denied { reason } = self.guard.admit(&fallback) {
            tracing::warn!(request = %fallback.id, %reason, "fallback admission denied");
            return DispatchState::TerminalFailed(Outcome::failure(
                fallback.id,
                None,
                ErrorKind::CostLimitExceeded,
                Duration::ZERO,
                true,
            ));
        }

        // Retry on a different provider than the one that just failed.
        let mut excluded = HashSet::new();
        if let Some(failed_id) = &outcome.provider_id {
            excluded.insert(failed_id.clone());
        }
        let eligible = self.registry.eligible_excluding(&excluded);

        match self.selector.select(&eligible, &fallback) {
            Some(provider) => {
                tracing::info!(
                    request = %fallback.id,
                    provider = provider.id(),
                    deadline_ms = fallback.deadline.as_millis() as u64,
                    "fallback dispatched"
                );
                DispatchState::FallbackDispatched {
                    request: fallback,
                    provider,
                }
            }
            None => {
                tracing::warn!(request = %fallback.id, "no eligible fallback provider");
                DispatchState::TerminalFailed(Outcome::failure(
                    fallback.id,
                    None,
                    ErrorKind::NoEligibleProvider,
                    Duration::ZERO,
                    true,
                ))
            }
        }
    }

    /// Whether the router currently accepts requests.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Toggle the router on or off without rebuilding it. Used by config
    /// hot-reload consumers.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Enable or disable one provider. Returns `false` for an unknown id.
    pub fn set_provider_enabled(&self, id: &str, enabled: bool) -> bool {
        self.registry.set_enabled(id, enabled)
    }

    /// Derive a point-in-time [`HealthReport`].
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn health(&self) -> HealthReport {
        self.monitor.health_check(&self.registry, &self.guard)
    }

    /// Spend and budget usage snapshot.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn cost_snapshot(&self) -> CostSnapshot {
        self.guard.cost_snapshot()
    }

    /// The provider roster.
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
//
// Unit tests here cover construction and the fallback decision table;
// end-to-end pipeline behaviour lives in tests/router_integration.rs.
