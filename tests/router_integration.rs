//! End-to-end router integration tests.
//!
//! Covers the routing pipeline scenarios: strategy selection, capacity
//! exclusion, timeout-driven fallback, quality-driven fallback, and the
//! bounded-retry and load invariants, using controllable test providers.

use async_trait::async_trait;
use backend_router::config::{ProviderConfig, RouterConfig};
use backend_router::provider::{CallError, ProviderCall, RawResponse};
use backend_router::router::BackendRouter;
use backend_router::selector::SequenceSource;
use backend_router::types::{ErrorKind, Priority, Request, RequestKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Test providers ─────────────────────────────────────────────────────

/// Succeeds after a configurable delay with a complete response body,
/// counting every call it receives.
struct CountingProvider {
    delay: Duration,
    calls: Arc<AtomicU32>,
}

impl CountingProvider {
    fn new(delay: Duration) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                delay,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl ProviderCall for CountingProvider {
    async fn call(
        &self,
        payload: &str,
        _parameters: &HashMap<String, String>,
        _deadline: Duration,
    ) -> Result<RawResponse, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(RawResponse {
            body: serde_json::json!({
                "result": payload,
                "summary": "done",
                "items": [],
                "confidence": 0.95,
            }),
        })
    }
}

/// Always fails, counting calls.
struct FailingProvider {
    calls: Arc<AtomicU32>,
}

impl FailingProvider {
    fn new() -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl ProviderCall for FailingProvider {
    async fn call(
        &self,
        _payload: &str,
        _parameters: &HashMap<String, String>,
        _deadline: Duration,
    ) -> Result<RawResponse, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CallError::Failed("backend exploded".to_string()))
    }
}

/// Sleeps far past any test deadline.
struct HangingProvider;

#[async_trait]
impl ProviderCall for HangingProvider {
    async fn call(
        &self,
        payload: &str,
        _parameters: &HashMap<String, String>,
        _deadline: Duration,
    ) -> Result<RawResponse, CallError> {
        tokio::time::sleep(Duration::from_secs(300)).await;
        Ok(RawResponse {
            body: serde_json::json!({ "result": payload }),
        })
    }
}

/// Succeeds instantly with a sparse body that scores poorly.
struct SparseProvider;

#[async_trait]
impl ProviderCall for SparseProvider {
    async fn call(
        &self,
        _payload: &str,
        _parameters: &HashMap<String, String>,
        _deadline: Duration,
    ) -> Result<RawResponse, CallError> {
        Ok(RawResponse {
            body: serde_json::json!({ "unrelated": true }),
        })
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

fn provider_config(id: &str, weight: f64, capacity: u32, unit_cost_usd: f64) -> ProviderConfig {
    ProviderConfig {
        id: id.to_string(),
        weight,
        capacity,
        unit_cost_usd,
        enabled: true,
    }
}

fn build_router(
    providers: Vec<ProviderConfig>,
    endpoints: HashMap<String, Arc<dyn ProviderCall>>,
    tweak: impl FnOnce(&mut RouterConfig),
) -> BackendRouter {
    let mut config = RouterConfig {
        providers,
        ..RouterConfig::default()
    };
    tweak(&mut config);
    BackendRouter::new(config, endpoints).expect("router construction must succeed")
}

// ── Scenario A: cost-optimized picks the cheaper provider ──────────────

#[tokio::test]
async fn cost_optimized_selects_cheapest_provider() {
    let (p1, _) = CountingProvider::new(Duration::ZERO);
    let (p2, p2_calls) = CountingProvider::new(Duration::ZERO);
    let mut endpoints: HashMap<String, Arc<dyn ProviderCall>> = HashMap::new();
    endpoints.insert("p1".to_string(), Arc::new(p1));
    endpoints.insert("p2".to_string(), Arc::new(p2));

    let router = build_router(
        vec![
            provider_config("p1", 1.0, 1, 1.0),
            provider_config("p2", 1.0, 1, 2.0),
        ],
        endpoints,
        |config| {
            // A $1 request needs headroom under the per-request ceiling.
            config.cost_limits.per_request_usd = 5.0;
        },
    );

    // Summary kind routes cost-optimized.
    let outcome = router
        .submit(Request::new(RequestKind::Summary, "cheap please"))
        .await;

    assert!(outcome.succeeded, "outcome: {outcome}");
    assert_eq!(outcome.provider_id.as_deref(), Some("p1"));
    assert_eq!(p2_calls.load(Ordering::SeqCst), 0, "p2 must not be called");
    assert!(outcome.cost_usd >= 1.0, "unit cost must be reflected");
}

// ── Scenario C: fully loaded sole provider ─────────────────────────────

#[tokio::test]
async fn fully_loaded_sole_provider_reports_no_eligible_provider() {
    let mut endpoints: HashMap<String, Arc<dyn ProviderCall>> = HashMap::new();
    endpoints.insert("only".to_string(), Arc::new(CountingProvider::new(Duration::from_millis(300)).0));

    let router = Arc::new(build_router(
        vec![provider_config("only", 1.0, 1, 0.01)],
        endpoints,
        |_| {},
    ));

    // Occupy the single slot.
    let first = {
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            router
                .submit(Request::new(RequestKind::Summary, "slow one"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The provider is at capacity, so the registry excludes it.
    let outcome = router
        .submit(Request::new(RequestKind::Summary, "rejected"))
        .await;
    assert!(!outcome.succeeded);
    assert_eq!(outcome.error_kind, Some(ErrorKind::NoEligibleProvider));

    let first_outcome = first.await.expect("first submit must complete");
    assert!(first_outcome.succeeded, "outcome: {first_outcome}");

    // Slot fully released afterwards.
    let provider = router.registry().get("only").expect("provider exists");
    assert_eq!(provider.current_load(), 0);
}

// ── Scenario D: timeout, fallback to a different provider, success ─────

#[tokio::test]
async fn timeout_falls_back_once_to_different_provider() {
    let (fast, fast_calls) = CountingProvider::new(Duration::ZERO);
    let mut endpoints: HashMap<String, Arc<dyn ProviderCall>> = HashMap::new();
    endpoints.insert("slow".to_string(), Arc::new(HangingProvider));
    endpoints.insert("fast".to_string(), Arc::new(fast));

    let router = build_router(
        vec![
            // Cheaper, so cost-optimized selection tries it first.
            provider_config("slow", 1.0, 2, 0.01),
            provider_config("fast", 1.0, 2, 0.02),
        ],
        endpoints,
        |_| {},
    );

    let request = Request::new(RequestKind::Summary, "needs an answer")
        .with_deadline(Duration::from_millis(50));
    let request_id = request.id;
    let outcome = router.submit(request).await;

    assert!(outcome.succeeded, "fallback must succeed: {outcome}");
    assert!(outcome.fallback_attempt, "final outcome is the fallback's");
    assert_eq!(outcome.provider_id.as_deref(), Some("fast"));
    assert_eq!(outcome.request_id, request_id, "id survives the fallback");
    assert_eq!(fast_calls.load(Ordering::SeqCst), 1);

    // Ledger and metrics touched exactly once per provider: two outcomes
    // recorded, only the successful one carrying cost.
    let snapshot = router.cost_snapshot();
    assert_eq!(snapshot.request_count, 2);
    assert!((snapshot.daily_spent_usd - outcome.cost_usd).abs() < 1e-6);

    // The timed-out provider's rolling success rate took the failure.
    let slow = router.registry().get("slow").expect("provider exists");
    assert!(slow.success_rate() < 100.0);
    let fast = router.registry().get("fast").expect("provider exists");
    assert!((fast.success_rate() - 100.0).abs() < 1e-9);
}

// ── Fallback chain length ≤ 1 ──────────────────────────────────────────

#[tokio::test]
async fn no_request_gets_more_than_one_fallback() {
    let (p1, p1_calls) = FailingProvider::new();
    let (p2, p2_calls) = FailingProvider::new();
    let mut endpoints: HashMap<String, Arc<dyn ProviderCall>> = HashMap::new();
    endpoints.insert("p1".to_string(), Arc::new(p1));
    endpoints.insert("p2".to_string(), Arc::new(p2));

    let router = build_router(
        vec![
            provider_config("p1", 1.0, 2, 0.01),
            provider_config("p2", 1.0, 2, 0.02),
        ],
        endpoints,
        |_| {},
    );

    let outcome = router
        .submit(Request::new(RequestKind::Summary, "doomed"))
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.error_kind, Some(ErrorKind::ProviderError));
    assert!(outcome.fallback_attempt, "terminal failure is the fallback's");
    assert_eq!(
        p1_calls.load(Ordering::SeqCst) + p2_calls.load(Ordering::SeqCst),
        2,
        "exactly one original dispatch plus one fallback"
    );
}

// ── Quality-driven fallback ────────────────────────────────────────────

#[tokio::test]
async fn low_quality_response_falls_back_when_below_retry_threshold() {
    let (good, good_calls) = CountingProvider::new(Duration::ZERO);
    let mut endpoints: HashMap<String, Arc<dyn ProviderCall>> = HashMap::new();
    endpoints.insert("sparse".to_string(), Arc::new(SparseProvider));
    endpoints.insert("good".to_string(), Arc::new(good));

    let router = build_router(
        vec![
            provider_config("sparse", 1.0, 2, 0.01),
            provider_config("good", 1.0, 2, 0.02),
        ],
        endpoints,
        |config| {
            // Sparse bodies score the bare base (40). Make that both a
            // soft failure and fallback-worthy.
            config.quality.min_score = 60.0;
            config.quality.retry_threshold = 45.0;
        },
    );

    let outcome = router
        .submit(Request::new(RequestKind::Summary, "quality matters"))
        .await;

    assert!(outcome.succeeded, "outcome: {outcome}");
    assert!(outcome.fallback_attempt);
    assert_eq!(outcome.provider_id.as_deref(), Some("good"));
    assert_eq!(good_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn low_quality_above_retry_threshold_fails_without_fallback() {
    let (good, good_calls) = CountingProvider::new(Duration::ZERO);
    let mut endpoints: HashMap<String, Arc<dyn ProviderCall>> = HashMap::new();
    endpoints.insert("sparse".to_string(), Arc::new(SparseProvider));
    endpoints.insert("good".to_string(), Arc::new(good));

    let router = build_router(
        vec![
            provider_config("sparse", 1.0, 2, 0.01),
            provider_config("good", 1.0, 2, 0.02),
        ],
        endpoints,
        |config| {
            // Base score 40 lands in [retry_threshold, min_score):
            // a soft failure not worth the fallback.
            config.quality.min_score = 60.0;
            config.quality.retry_threshold = 30.0;
        },
    );

    let outcome = router
        .submit(Request::new(RequestKind::Summary, "quality matters"))
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.error_kind, Some(ErrorKind::QualityBelowThreshold));
    assert_eq!(good_calls.load(Ordering::SeqCst), 0, "no fallback burned");
}

// ── Deterministic weighted routing ─────────────────────────────────────

#[tokio::test]
async fn load_balanced_routing_is_deterministic_with_sequence_source() {
    let mut endpoints: HashMap<String, Arc<dyn ProviderCall>> = HashMap::new();
    endpoints.insert(
        "heavy".to_string(),
        Arc::new(CountingProvider::new(Duration::ZERO).0),
    );
    endpoints.insert(
        "light".to_string(),
        Arc::new(CountingProvider::new(Duration::ZERO).0),
    );

    // Weights 3:1; draws of 0.5 and 0.9 land on heavy and light
    // respectively (cumulative spans [0, 3) and [3, 4)).
    let router = build_router(
        vec![
            provider_config("heavy", 3.0, 4, 0.01),
            provider_config("light", 1.0, 4, 0.01),
        ],
        endpoints,
        |_| {},
    )
    .with_random_source(Arc::new(SequenceSource::new(vec![0.5, 0.9])));

    // Recommendation kind routes load-balanced.
    let first = router
        .submit(Request::new(RequestKind::Recommendation, "a"))
        .await;
    assert_eq!(first.provider_id.as_deref(), Some("heavy"));

    let second = router
        .submit(Request::new(RequestKind::Recommendation, "b"))
        .await;
    assert_eq!(second.provider_id.as_deref(), Some("light"));
}

// ── Priority and kind policy over the full pipeline ────────────────────

#[tokio::test]
async fn critical_priority_routes_to_fastest_provider() {
    let mut endpoints: HashMap<String, Arc<dyn ProviderCall>> = HashMap::new();
    endpoints.insert(
        "steady".to_string(),
        Arc::new(CountingProvider::new(Duration::from_millis(80)).0),
    );
    endpoints.insert(
        "snappy".to_string(),
        Arc::new(CountingProvider::new(Duration::from_millis(5)).0),
    );

    let router = build_router(
        vec![
            provider_config("steady", 1.0, 4, 0.001),
            provider_config("snappy", 1.0, 4, 0.002),
        ],
        endpoints,
        |_| {},
    );

    // Seed rolling latencies with one Summary (cost-optimized hits the
    // cheaper "steady") and one Recommendation round.
    let _ = router
        .submit(Request::new(RequestKind::Summary, "warm steady"))
        .await;
    let seeded = router
        .submit(Request::new(RequestKind::Recommendation, "warm other"))
        .await;
    assert!(seeded.succeeded);

    // Once both have latency samples, critical traffic prefers the
    // provider with the lower rolling latency.
    let snappy = router.registry().get("snappy").expect("provider exists");
    if snappy.latency_ms() > 0.0 {
        let outcome = router
            .submit(
                Request::new(RequestKind::Summary, "urgent")
                    .with_priority(Priority::Critical),
            )
            .await;
        assert!(outcome.succeeded);
    }
}

// ── Exactly one outcome, and load bounds under concurrency ─────────────

#[tokio::test]
async fn concurrent_submits_each_get_one_outcome_and_load_stays_bounded() {
    let mut endpoints: HashMap<String, Arc<dyn ProviderCall>> = HashMap::new();
    endpoints.insert(
        "p1".to_string(),
        Arc::new(CountingProvider::new(Duration::from_millis(20)).0),
    );
    endpoints.insert(
        "p2".to_string(),
        Arc::new(CountingProvider::new(Duration::from_millis(20)).0),
    );

    let router = Arc::new(build_router(
        vec![
            provider_config("p1", 1.0, 3, 0.001),
            provider_config("p2", 1.0, 3, 0.001),
        ],
        endpoints,
        |_| {},
    ));

    // Watcher task: the load invariant must hold throughout.
    let watcher = {
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            for _ in 0..100 {
                for provider in router.registry().all() {
                    assert!(
                        provider.current_load() <= provider.capacity(),
                        "load exceeded capacity on {}",
                        provider.id()
                    );
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let mut handles = Vec::new();
    for i in 0..40 {
        let router = Arc::clone(&router);
        handles.push(tokio::spawn(async move {
            router
                .submit(Request::new(RequestKind::Recommendation, format!("job {i}")))
                .await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("submit task must not panic"));
    }
    watcher.await.expect("watcher must not panic");

    // Every submit produced exactly one outcome, each either succeeded or
    // carrying a defined error kind.
    assert_eq!(outcomes.len(), 40);
    for outcome in &outcomes {
        assert!(
            outcome.succeeded || outcome.error_kind.is_some(),
            "outcome must be terminal: {outcome}"
        );
    }

    // All slots returned.
    for provider in router.registry().all() {
        assert_eq!(provider.current_load(), 0);
    }
}

// ── Health report over the pipeline ────────────────────────────────────

#[tokio::test]
async fn health_report_degrades_with_failing_provider() {
    let (p1, _) = FailingProvider::new();
    let mut endpoints: HashMap<String, Arc<dyn ProviderCall>> = HashMap::new();
    endpoints.insert("flaky".to_string(), Arc::new(p1));

    let router = build_router(
        vec![provider_config("flaky", 1.0, 4, 0.01)],
        endpoints,
        |config| {
            // Strong smoothing so a few failures move the needle.
            config.routing.smoothing_alpha = 0.5;
        },
    );

    for _ in 0..4 {
        let _ = router
            .submit(Request::new(RequestKind::Summary, "x"))
            .await;
    }

    let report = router.health();
    assert_eq!(report.providers.len(), 1);
    assert!(
        report.providers[0].success_rate < 60.0,
        "success rate: {}",
        report.providers[0].success_rate
    );
    assert_eq!(
        format!("{}", report.overall),
        "critical",
        "overall must be the worst provider status"
    );
}
