//! # Core Request and Outcome Types
//!
//! ## Responsibility
//! Define the fundamental data types the router operates on: work requests,
//! dispatch outcomes, and the error taxonomy for failed dispatches.
//!
//! ## Guarantees
//! - All types are `Send + Sync` for safe cross-task sharing.
//! - Serde (de)serialisable for config files and API responses.
//! - `Display` implemented for human-readable logging.
//! - A `Request` is immutable once built; a fallback attempt is a *new*
//!   request derived via [`Request::derive_fallback`], never a mutation.
//!
//! ## NOT Responsible For
//! - Routing decisions (see `selector`)
//! - Dispatch execution (see `executor`)
//! - Provider bookkeeping (see `registry`)

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Default deadline applied when a request does not specify one.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

/// Unique identifier for a request submitted to the router.
///
/// Survives across the original dispatch and its fallback attempt, so logs
/// and outcomes for both can be correlated.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh random request id.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// The category of work a request represents.
///
/// The selection policy table keys off this: analytical kinds prefer the
/// most reliable provider, scan-style kinds prefer the cheapest, and the
/// rest are load-balanced.
///
/// # Panics
///
/// This type never panics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Side-by-side comparison of items.
    Comparison,
    /// In-depth analysis of a single subject.
    Analysis,
    /// Personalised recommendation generation.
    Recommendation,
    /// Broad trend scanning over many items.
    TrendScan,
    /// Short summary generation.
    Summary,
}

impl RequestKind {
    /// All kinds, in declaration order. Used by config defaults and tests.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub const fn all() -> [RequestKind; 5] {
        [
            Self::Comparison,
            Self::Analysis,
            Self::Recommendation,
            Self::TrendScan,
            Self::Summary,
        ]
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison => write!(f, "comparison"),
            Self::Analysis => write!(f, "analysis"),
            Self::Recommendation => write!(f, "recommendation"),
            Self::TrendScan => write!(f, "trend_scan"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// Request priority, from least to most urgent.
///
/// `Critical` requests are routed speed-optimized regardless of kind.
///
/// # Panics
///
/// This type never panics.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work, no urgency.
    Low,
    /// Normal interactive work. The default.
    Medium,
    /// Elevated urgency.
    High,
    /// Latency-critical; always routed to the fastest provider.
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A unit of work submitted to the router.
///
/// Built with [`Request::new`] and the `with_*` methods, then treated as
/// immutable. The router derives a fallback variant via
/// [`Request::derive_fallback`] rather than mutating the original.
///
/// # Example
///
/// ```rust
/// use backend_router::types::{Priority, Request, RequestKind};
/// use std::time::Duration;
///
/// let req = Request::new(RequestKind::Analysis, "analyse product 42")
///     .with_priority(Priority::High)
///     .with_deadline(Duration::from_secs(5))
///     .with_parameter("depth", "full");
/// assert!(!req.fallback_attempt);
/// ```
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique identifier, preserved across a fallback attempt.
    pub id: RequestId,
    /// The category of work.
    pub kind: RequestKind,
    /// Opaque request content. The router never interprets it.
    pub payload: String,
    /// Arbitrary key-value parameters forwarded to the provider.
    pub parameters: HashMap<String, String>,
    /// Request priority.
    pub priority: Priority,
    /// Wall-clock budget for the provider call.
    pub deadline: Duration,
    /// True only on the single derived fallback attempt.
    pub fallback_attempt: bool,
}

impl Request {
    /// Create a request with default priority (`Medium`) and deadline
    /// ([`DEFAULT_DEADLINE`]).
    ///
    /// # Arguments
    ///
    /// * `kind` - The category of work.
    /// * `payload` - Opaque request content.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new(kind: RequestKind, payload: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            kind,
            payload: payload.into(),
            parameters: HashMap::new(),
            priority: Priority::Medium,
            deadline: DEFAULT_DEADLINE,
            fallback_attempt: false,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Add one parameter.
    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Derive the single fallback attempt for this request.
    ///
    /// The derived request keeps the id, kind, payload, parameters, and
    /// priority; its deadline is doubled (clamped to `max_deadline`) to
    /// absorb the reduced provider pool's typically higher latency, and
    /// `fallback_attempt` is set so the router cannot fall back again.
    ///
    /// # Arguments
    ///
    /// * `max_deadline` - Absolute ceiling for the relaxed deadline.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn derive_fallback(&self, max_deadline: Duration) -> Self {
        let relaxed = self
            .deadline
            .checked_mul(2)
            .unwrap_or(max_deadline)
            .min(max_deadline);
        Self {
            id: self.id,
            kind: self.kind,
            payload: self.payload.clone(),
            parameters: self.parameters.clone(),
            priority: self.priority,
            deadline: relaxed,
            fallback_attempt: true,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, {}, deadline={}ms{})",
            self.id,
            self.kind,
            self.priority,
            self.deadline.as_millis(),
            if self.fallback_attempt { ", fallback" } else { "" }
        )
    }
}

/// Classification of a failed dispatch.
///
/// Every failure surfaced by the router carries exactly one of these; the
/// router never propagates a panic or a raw provider error past its
/// boundary.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Denied by the cost guard before dispatch. Not retried.
    CostLimitExceeded,
    /// The registry had no provider able to take the request. The caller
    /// may retry after a short delay; the router itself does not.
    NoEligibleProvider,
    /// The provider exceeded the request deadline. Eligible for fallback.
    Timeout,
    /// The provider returned or raised a failure. Eligible for fallback.
    ProviderError,
    /// The call succeeded but the response scored below the quality
    /// threshold. Treated as a soft failure, eligible for fallback.
    QualityBelowThreshold,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CostLimitExceeded => write!(f, "cost_limit_exceeded"),
            Self::NoEligibleProvider => write!(f, "no_eligible_provider"),
            Self::Timeout => write!(f, "timeout"),
            Self::ProviderError => write!(f, "provider_error"),
            Self::QualityBelowThreshold => write!(f, "quality_below_threshold"),
        }
    }
}

/// The result of routing one request: exactly one `Outcome` per submit.
///
/// Either `succeeded` is true and `data` holds the provider's response
/// body, or `succeeded` is false and `error_kind` names the failure.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Id of the request this outcome answers.
    pub request_id: RequestId,
    /// Provider that served (or failed) the dispatch, when one was reached.
    pub provider_id: Option<String>,
    /// Whether the dispatch succeeded.
    pub succeeded: bool,
    /// Response body on success.
    pub data: Option<serde_json::Value>,
    /// Failure classification when `succeeded` is false.
    pub error_kind: Option<ErrorKind>,
    /// Wall-clock time spent in the provider call.
    pub elapsed: Duration,
    /// Cost attributed to this dispatch, in USD. Zero for failures.
    pub cost_usd: f64,
    /// Heuristic completeness score of the response, 0-100.
    pub quality_score: f64,
    /// Whether this outcome came from the fallback attempt.
    pub fallback_attempt: bool,
}

impl Outcome {
    /// Build a failure outcome with zero cost and zero quality.
    ///
    /// # Arguments
    ///
    /// * `request_id` - Id of the failing request.
    /// * `provider_id` - Provider reached, if any.
    /// * `kind` - Failure classification.
    /// * `elapsed` - Time spent before the failure was known.
    /// * `fallback_attempt` - Whether this was the fallback attempt.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn failure(
        request_id: RequestId,
        provider_id: Option<String>,
        kind: ErrorKind,
        elapsed: Duration,
        fallback_attempt: bool,
    ) -> Self {
        Self {
            request_id,
            provider_id,
            succeeded: false,
            data: None,
            error_kind: Some(kind),
            elapsed,
            cost_usd: 0.0,
            quality_score: 0.0,
            fallback_attempt,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.succeeded {
            write!(
                f,
                "{} ok via {} ({}ms, ${:.4}, q={:.0})",
                self.request_id,
                self.provider_id.as_deref().unwrap_or("?"),
                self.elapsed.as_millis(),
                self.cost_usd,
                self.quality_score
            )
        } else {
            write!(
                f,
                "{} failed: {} ({}ms)",
                self.request_id,
                self.error_kind
                    .map_or_else(|| "unknown".to_string(), |k| k.to_string()),
                self.elapsed.as_millis()
            )
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
