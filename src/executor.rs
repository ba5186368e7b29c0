//! # Executor
//!
//! ## Responsibility
//! Dispatch one request to one chosen provider with a deadline, await the
//! outcome, and normalize it: timeout and provider failures become typed
//! error kinds, successes get a quality score and a cost.
//!
//! ## Guarantees
//! - The provider's load slot is acquired immediately before dispatch and
//!   released on *every* exit path, including timeout and cancellation,
//!   via an RAII guard.
//! - A deadline overrun cancels the in-flight provider call (the future
//!   is dropped), so capacity is released promptly instead of leaking
//!   until the call eventually returns.
//! - Failed outcomes carry zero cost; the ledger therefore sums exactly
//!   the costs of successful dispatches.
//!
//! ## NOT Responsible For
//! - Choosing the provider (see `selector`)
//! - Fallback policy (see `router`)
//! - Recording metrics or spend (see `health`, `cost`)

use crate::config::{QualityConfig, RoutingSection};
use crate::cost::{f64_to_micro, micro_to_f64};
use crate::provider::{CallError, RawResponse};
use crate::registry::Provider;
use crate::types::{ErrorKind, Outcome, Request};
use std::sync::Arc;
use std::time::Instant;

/// RAII holder of one provider load slot.
///
/// Releases the slot on drop, which runs on success, timeout,
/// cancellation, and unwind alike.
struct LoadGuard {
    provider: Arc<Provider>,
}

impl LoadGuard {
    /// Acquire a slot, or `None` when the provider is at capacity.
    fn acquire(provider: &Arc<Provider>) -> Option<Self> {
        if provider.try_acquire_slot() {
            Some(Self {
                provider: Arc::clone(provider),
            })
        } else {
            None
        }
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.provider.release_slot();
    }
}

/// Field-presence quality heuristic.
///
/// A response body scores the base plus a fixed increment per expected
/// top-level field present, capped at 100. Provider-agnostic: only the
/// shape of the body is inspected, never its meaning.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug, Clone)]
pub struct QualityPolicy {
    base_score: f64,
    points_per_field: f64,
    expected_fields: Vec<String>,
}

impl QualityPolicy {
    /// Build the policy from config.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn from_config(config: &QualityConfig) -> Self {
        Self {
            base_score: config.base_score,
            points_per_field: config.points_per_field,
            expected_fields: config.expected_fields.clone(),
        }
    }

    /// Score a response body, 0-100.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn score(&self, response: &RawResponse) -> f64 {
        let present = response.body.as_object().map_or(0, |obj| {
            self.expected_fields
                .iter()
                .filter(|f| obj.contains_key(f.as_str()))
                .count()
        });
        (self.base_score + self.points_per_field * present as f64).min(100.0)
    }
}

/// Dispatches requests to providers under a deadline.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug)]
pub struct Executor {
    quality: QualityPolicy,
    time_cost_micro_per_sec: u64,
}

impl Executor {
    /// Build an executor from config.
    ///
    /// # Arguments
    ///
    /// * `quality` - Quality scoring policy settings.
    /// * `routing` - Routing settings (time-cost rate).
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn from_config(quality: &QualityConfig, routing: &RoutingSection) -> Self {
        Self {
            quality: QualityPolicy::from_config(quality),
            time_cost_micro_per_sec: f64_to_micro(routing.time_cost_usd_per_sec),
        }
    }

    /// Execute one dispatch.
    ///
    /// # Arguments
    ///
    /// * `provider` - The chosen provider.
    /// * `request` - The request to dispatch.
    ///
    /// # Returns
    ///
    /// Exactly one [`Outcome`]; all failure modes are normalized into it.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub async fn execute(&self, provider: &Arc<Provider>, request: &Request) -> Outcome {
        let Some(_guard) = LoadGuard::acquire(provider) else {
            // Lost an acquisition race since eligibility was checked.
            tracing::warn!(
                request = %request.id,
                provider = provider.id(),
                "provider at capacity at dispatch time"
            );
            return Outcome::failure(
                request.id,
                Some(provider.id().to_string()),
                ErrorKind::ProviderError,
                std::time::Duration::ZERO,
                request.fallback_attempt,
            );
        };

        let started = Instant::now();
        let call = provider
            .endpoint()
            .call(&request.payload, &request.parameters, request.deadline);

        // timeout() drops the call future on expiry, cancelling the
        // outstanding provider call so the slot is not held hostage.
        let result = tokio::time::timeout(request.deadline, call).await;
        let elapsed = started.elapsed();

        match result {
            Err(_) => {
                tracing::warn!(
                    request = %request.id,
                    provider = provider.id(),
                    deadline_ms = request.deadline.as_millis() as u64,
                    "dispatch exceeded deadline"
                );
                Outcome::failure(
                    request.id,
                    Some(provider.id().to_string()),
                    ErrorKind::Timeout,
                    elapsed,
                    request.fallback_attempt,
                )
            }
            Ok(Err(CallError::Timeout)) => Outcome::failure(
                request.id,
                Some(provider.id().to_string()),
                ErrorKind::Timeout,
                elapsed,
                request.fallback_attempt,
            ),
            Ok(Err(CallError::Failed(message))) => {
                tracing::warn!(
                    request = %request.id,
                    provider = provider.id(),
                    error = %message,
                    "provider call failed"
                );
                Outcome::failure(
                    request.id,
                    Some(provider.id().to_string()),
                    ErrorKind::ProviderError,
                    elapsed,
                    request.fallback_attempt,
                )
            }
            Ok(Ok(response)) => {
                let quality_score = self.quality.score(&response);
                let cost_micro = provider
                    .unit_cost_micro()
                    .saturating_add(self.time_cost_micro(elapsed));
                tracing::debug!(
                    request = %request.id,
                    provider = provider.id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    quality = quality_score,
                    "dispatch succeeded"
                );
                Outcome {
                    request_id: request.id,
                    provider_id: Some(provider.id().to_string()),
                    succeeded: true,
                    data: Some(response.body),
                    error_kind: None,
                    elapsed,
                    cost_usd: micro_to_f64(cost_micro),
                    quality_score,
                    fallback_attempt: request.fallback_attempt,
                }
            }
        }
    }

    /// Linear time cost in micro-dollars for the elapsed duration.
    ///
    /// Discourages routing slow requests to cheap-but-slow providers.
    fn time_cost_micro(&self, elapsed: std::time::Duration) -> u64 {
        (elapsed.as_secs_f64() * self.time_cost_micro_per_sec as f64) as u64
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{EchoProvider, ProviderCall};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Provider that always fails.
    struct FailingProvider;

    #[async_trait]
    impl ProviderCall for FailingProvider {
        async fn call(
            &self,
            _payload: &str,
            _parameters: &HashMap<String, String>,
            _deadline: Duration,
        ) -> Result<RawResponse, CallError> {
            Err(CallError::Failed("backend unavailable".to_string()))
        }
    }

    /// Provider that sleeps past any reasonable deadline.
    struct SlowProvider;

    #[async_trait]
    impl ProviderCall for SlowProvider {
        async fn call(
            &self,
            payload: &str,
            _parameters: &HashMap<String, String>,
            _deadline: Duration,
        ) -> Result<RawResponse, CallError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(RawResponse {
                body: serde_json::json!({ "result": payload }),
            })
        }
    }

    fn executor() -> Executor {
        Executor::from_config(&QualityConfig::default(), &RoutingSection::default())
    }

    fn echo_provider(id: &str) -> Arc<Provider> {
        Arc::new(Provider::new(
            id,
            Arc::new(EchoProvider::with_delay(Duration::ZERO)),
            1.0,
            2,
            0.01,
        ))
    }

    // -- quality policy --------------------------------------------------

    #[test]
    fn test_quality_score_counts_expected_fields() {
        let policy = QualityPolicy::from_config(&QualityConfig::default());
        let all_fields = RawResponse {
            body: serde_json::json!({
                "result": 1, "summary": 2, "items": [], "confidence": 0.9
            }),
        };
        assert!((policy.score(&all_fields) - 100.0).abs() < 1e-9);

        let one_field = RawResponse {
            body: serde_json::json!({ "result": 1 }),
        };
        // base 40 + 15
        assert!((policy.score(&one_field) - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_score_non_object_body_gets_base() {
        let policy = QualityPolicy::from_config(&QualityConfig::default());
        let response = RawResponse {
            body: serde_json::json!("bare string"),
        };
        assert!((policy.score(&response) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_score_capped_at_100() {
        let config = QualityConfig {
            base_score: 90.0,
            points_per_field: 50.0,
            ..QualityConfig::default()
        };
        let policy = QualityPolicy::from_config(&config);
        let response = RawResponse {
            body: serde_json::json!({ "result": 1, "summary": 2 }),
        };
        assert!((policy.score(&response) - 100.0).abs() < 1e-9);
    }

    // -- execution -------------------------------------------------------

    #[tokio::test]
    async fn test_execute_success_scores_and_prices() {
        let exec = executor();
        let provider = echo_provider("p1");
        let request = Request::new(crate::types::RequestKind::Summary, "hello");

        let outcome = exec.execute(&provider, &request).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.provider_id.as_deref(), Some("p1"));
        assert!(outcome.data.is_some());
        // Echo returns result + summary: base 40 + 2 * 15 = 70.
        assert!((outcome.quality_score - 70.0).abs() < 1e-9);
        // At least the unit cost.
        assert!(outcome.cost_usd >= 0.01 - 1e-9);
    }

    #[tokio::test]
    async fn test_execute_releases_slot_on_success() {
        let exec = executor();
        let provider = echo_provider("p1");
        let request = Request::new(crate::types::RequestKind::Summary, "x");
        let _ = exec.execute(&provider, &request).await;
        assert_eq!(provider.current_load(), 0);
    }

    #[tokio::test]
    async fn test_execute_provider_failure_normalized() {
        let exec = executor();
        let provider = Arc::new(Provider::new(
            "flaky",
            Arc::new(FailingProvider),
            1.0,
            2,
            0.01,
        ));
        let request = Request::new(crate::types::RequestKind::Summary, "x");

        let outcome = exec.execute(&provider, &request).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error_kind, Some(ErrorKind::ProviderError));
        assert!(outcome.cost_usd.abs() < f64::EPSILON, "failures cost zero");
        assert_eq!(provider.current_load(), 0, "slot released on failure");
    }

    #[tokio::test]
    async fn test_execute_timeout_cancels_and_releases() {
        let exec = executor();
        let provider = Arc::new(Provider::new(
            "slow",
            Arc::new(SlowProvider),
            1.0,
            1,
            0.01,
        ));
        let request = Request::new(crate::types::RequestKind::Summary, "x")
            .with_deadline(Duration::from_millis(20));

        let outcome = exec.execute(&provider, &request).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Timeout));
        assert_eq!(
            provider.current_load(),
            0,
            "slot must be released promptly after timeout"
        );
    }

    #[tokio::test]
    async fn test_execute_at_capacity_reports_provider_error() {
        let exec = executor();
        let provider = Arc::new(Provider::new(
            "p1",
            Arc::new(EchoProvider::with_delay(Duration::ZERO)),
            1.0,
            1,
            0.01,
        ));
        assert!(provider.try_acquire_slot());

        let request = Request::new(crate::types::RequestKind::Summary, "x");
        let outcome = exec.execute(&provider, &request).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error_kind, Some(ErrorKind::ProviderError));
        provider.release_slot();
    }

    #[tokio::test]
    async fn test_execute_reflects_fallback_flag() {
        let exec = executor();
        let provider = echo_provider("p1");
        let request = Request::new(crate::types::RequestKind::Summary, "x")
            .derive_fallback(Duration::from_secs(30));
        let outcome = exec.execute(&provider, &request).await;
        assert!(outcome.fallback_attempt);
    }

    // -- time cost -------------------------------------------------------

    #[test]
    fn test_time_cost_linear_in_elapsed() {
        let exec = Executor {
            quality: QualityPolicy::from_config(&QualityConfig::default()),
            time_cost_micro_per_sec: 1_000, // $0.001/s
        };
        assert_eq!(exec.time_cost_micro(Duration::from_secs(2)), 2_000);
        assert_eq!(exec.time_cost_micro(Duration::from_millis(500)), 500);
        assert_eq!(exec.time_cost_micro(Duration::ZERO), 0);
    }
}
