//! # Cost Ledger and Cost Guard
//!
//! ## Responsibility
//! Track cumulative spend against daily, monthly, and per-request ceilings,
//! and admit or reject each request *before* dispatch. Estimated costs are
//! bounded ahead of execution so budgets are enforced before spend, not
//! only after.
//!
//! ## Guarantees
//! - Spend counters use atomics in micro-dollars (1 USD = 1 000 000), the
//!   fixed-point convention that avoids floating-point drift in
//!   long-running aggregations.
//! - Admission never mutates the ledger; only real outcomes are recorded,
//!   so denied requests never contaminate cost tracking.
//! - Daily and monthly counters reset on period rollover.
//!
//! ## NOT Responsible For
//! - Computing the actual cost of an outcome (see `executor`)
//! - Deciding when to record an outcome (see `router`)

use crate::config::CostLimitsConfig;
use crate::types::{Request, RequestKind};
use chrono::{Datelike, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Fallback estimate for a kind missing from the cost table: $0.05.
const DEFAULT_ESTIMATE_MICRO: u64 = 50_000;

/// Convert a USD amount to micro-dollars.
pub(crate) fn f64_to_micro(usd: f64) -> u64 {
    (usd * 1_000_000.0) as u64
}

/// Convert micro-dollars to USD.
pub(crate) fn micro_to_f64(micro: u64) -> f64 {
    micro as f64 / 1_000_000.0
}

/// Calendar keys identifying the current daily and monthly periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeriodKeys {
    /// Day ordinal (days since the common era).
    day: i32,
    /// Month index (`year * 12 + month0`).
    month: i32,
}

impl PeriodKeys {
    fn now() -> Self {
        let today = Utc::now().date_naive();
        Self {
            day: today.num_days_from_ce(),
            month: today.year() * 12 + today.month0() as i32,
        }
    }
}

/// Shared spend ledger.
///
/// All counters are atomic; the period keys sit behind a short-held mutex
/// that is only contended on rollover checks.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug)]
pub struct CostLedger {
    daily_micro: AtomicU64,
    monthly_micro: AtomicU64,
    requests: AtomicU64,
    period: Mutex<PeriodKeys>,
}

impl Default for CostLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl CostLedger {
    /// Create an empty ledger anchored to the current period.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new() -> Self {
        Self {
            daily_micro: AtomicU64::new(0),
            monthly_micro: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            period: Mutex::new(PeriodKeys::now()),
        }
    }

    /// Record one completed dispatch.
    ///
    /// Adds the outcome's cost to the daily and monthly counters and
    /// increments the request count. Failed outcomes carry zero cost but
    /// still count as requests.
    ///
    /// # Arguments
    ///
    /// * `cost_usd` - Cost of the recorded outcome in USD.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn record(&self, cost_usd: f64) {
        self.record_at(f64_to_micro(cost_usd), PeriodKeys::now());
    }

    fn record_at(&self, cost_micro: u64, now: PeriodKeys) {
        self.roll_over(now);
        self.daily_micro.fetch_add(cost_micro, Ordering::Relaxed);
        self.monthly_micro.fetch_add(cost_micro, Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Current daily spend in micro-dollars, after rollover.
    pub(crate) fn daily_micro(&self) -> u64 {
        self.roll_over(PeriodKeys::now());
        self.daily_micro.load(Ordering::Relaxed)
    }

    /// Current monthly spend in micro-dollars, after rollover.
    pub(crate) fn monthly_micro(&self) -> u64 {
        self.roll_over(PeriodKeys::now());
        self.monthly_micro.load(Ordering::Relaxed)
    }

    /// Reset expired period counters.
    fn roll_over(&self, now: PeriodKeys) {
        let mut period = self.period.lock().unwrap_or_else(|e| e.into_inner());
        if period.day != now.day {
            self.daily_micro.store(0, Ordering::Relaxed);
            self.requests.store(0, Ordering::Relaxed);
            period.day = now.day;
        }
        if period.month != now.month {
            self.monthly_micro.store(0, Ordering::Relaxed);
            period.month = now.month;
        }
    }

    /// Point-in-time snapshot of the ledger.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.roll_over(PeriodKeys::now());
        LedgerSnapshot {
            daily_spent_usd: micro_to_f64(self.daily_micro.load(Ordering::Relaxed)),
            monthly_spent_usd: micro_to_f64(self.monthly_micro.load(Ordering::Relaxed)),
            request_count: self.requests.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the spend counters.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LedgerSnapshot {
    /// Spend recorded today, USD.
    pub daily_spent_usd: f64,
    /// Spend recorded this month, USD.
    pub monthly_spent_usd: f64,
    /// Outcomes recorded today.
    pub request_count: u64,
}

/// Admission decision for one request.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The request may be dispatched. The ledger is untouched.
    Allowed,
    /// The request is rejected before dispatch.
    Denied {
        /// Human-readable denial reason, for logs and the caller.
        reason: String,
    },
}

impl Admission {
    /// `true` for [`Admission::Allowed`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Admission control against spend ceilings.
///
/// Denial rules, all computed from the configured per-kind estimate:
/// - estimated cost exceeds the per-request ceiling;
/// - projected daily spend (`daily_spent + estimate`) exceeds the daily
///   ceiling;
/// - projected monthly spend exceeds the monthly ceiling.
///
/// Projection (rather than comparing spent against the limit alone) means
/// a request that *would* overrun the budget is denied before any money
/// moves.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug)]
pub struct CostGuard {
    daily_limit_micro: u64,
    per_request_limit_micro: u64,
    monthly_limit_micro: u64,
    estimates_micro: HashMap<RequestKind, u64>,
    ledger: CostLedger,
}

impl CostGuard {
    /// Build a guard from the configured limits and estimate table.
    ///
    /// # Arguments
    ///
    /// * `limits` - Daily, per-request, and monthly ceilings in USD.
    /// * `cost_table` - Estimated cost per request kind in USD.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new(limits: &CostLimitsConfig, cost_table: &HashMap<RequestKind, f64>) -> Self {
        Self {
            daily_limit_micro: f64_to_micro(limits.daily_usd),
            per_request_limit_micro: f64_to_micro(limits.per_request_usd),
            monthly_limit_micro: f64_to_micro(limits.monthly_usd),
            estimates_micro: cost_table
                .iter()
                .map(|(k, v)| (*k, f64_to_micro(*v)))
                .collect(),
            ledger: CostLedger::new(),
        }
    }

    /// Estimated cost for a request kind, in micro-dollars.
    pub fn estimate_micro(&self, kind: RequestKind) -> u64 {
        self.estimates_micro
            .get(&kind)
            .copied()
            .unwrap_or(DEFAULT_ESTIMATE_MICRO)
    }

    /// Decide whether a request may be dispatched.
    ///
    /// Never mutates the ledger.
    ///
    /// # Arguments
    ///
    /// * `request` - The request seeking admission.
    ///
    /// # Returns
    ///
    /// [`Admission::Allowed`] or [`Admission::Denied`] with a reason.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn admit(&self, request: &Request) -> Admission {
        let estimate = self.estimate_micro(request.kind);

        if estimate > self.per_request_limit_micro {
            return Admission::Denied {
                reason: format!(
                    "estimated cost ${:.4} for kind {} exceeds per-request limit ${:.4}",
                    micro_to_f64(estimate),
                    request.kind,
                    micro_to_f64(self.per_request_limit_micro)
                ),
            };
        }

        let daily = self.ledger.daily_micro();
        if daily.saturating_add(estimate) > self.daily_limit_micro {
            return Admission::Denied {
                reason: format!(
                    "daily spend ${:.4} + estimate ${:.4} exceeds daily limit ${:.4}",
                    micro_to_f64(daily),
                    micro_to_f64(estimate),
                    micro_to_f64(self.daily_limit_micro)
                ),
            };
        }

        let monthly = self.ledger.monthly_micro();
        if monthly.saturating_add(estimate) > self.monthly_limit_micro {
            return Admission::Denied {
                reason: format!(
                    "monthly spend ${:.4} + estimate ${:.4} exceeds monthly limit ${:.4}",
                    micro_to_f64(monthly),
                    micro_to_f64(estimate),
                    micro_to_f64(self.monthly_limit_micro)
                ),
            };
        }

        Admission::Allowed
    }

    /// The shared ledger.
    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    /// Fraction of the daily budget spent, `0.0` when no limit is set.
    pub fn daily_budget_used(&self) -> f64 {
        if self.daily_limit_micro == 0 {
            return 0.0;
        }
        self.ledger.daily_micro() as f64 / self.daily_limit_micro as f64
    }

    /// Fraction of the monthly budget spent, `0.0` when no limit is set.
    pub fn monthly_budget_used(&self) -> f64 {
        if self.monthly_limit_micro == 0 {
            return 0.0;
        }
        self.ledger.monthly_micro() as f64 / self.monthly_limit_micro as f64
    }

    /// Snapshot of spend plus budget fractions, for the health surface.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn cost_snapshot(&self) -> CostSnapshot {
        let ledger = self.ledger.snapshot();
        CostSnapshot {
            daily_spent_usd: ledger.daily_spent_usd,
            daily_limit_usd: micro_to_f64(self.daily_limit_micro),
            daily_budget_used: self.daily_budget_used(),
            monthly_spent_usd: ledger.monthly_spent_usd,
            monthly_limit_usd: micro_to_f64(self.monthly_limit_micro),
            monthly_budget_used: self.monthly_budget_used(),
            request_count: ledger.request_count,
        }
    }
}

/// Spend and budget usage, as exposed by the health endpoint.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CostSnapshot {
    /// Spend recorded today, USD.
    pub daily_spent_usd: f64,
    /// Daily ceiling, USD.
    pub daily_limit_usd: f64,
    /// `daily_spent / daily_limit`.
    pub daily_budget_used: f64,
    /// Spend recorded this month, USD.
    pub monthly_spent_usd: f64,
    /// Monthly ceiling, USD.
    pub monthly_limit_usd: f64,
    /// `monthly_spent / monthly_limit`.
    pub monthly_budget_used: f64,
    /// Outcomes recorded today.
    pub request_count: u64,
}

// ── Tests ──────────────────────────────────────────────────────────────
