//! # backend-router
//!
//! A budget-aware request router over interchangeable backend providers.
//!
//! ## Architecture
//!
//! Each submitted request flows through a fixed pipeline:
//! ```text
//! Request → CostGuard → RouteSelector → Executor → (ok → Metrics)
//!                                         │
//!                                         └ (fail → Fallback → RouteSelector …)
//! ```
//!
//! The cost guard admits or denies before any money moves, the selector
//! picks one provider per request via a priority/kind policy table, the
//! executor bounds the call with a deadline and normalizes the result,
//! and a failed first attempt gets at most one fallback on a different
//! provider. Every failure becomes a typed [`types::Outcome`]; nothing is
//! thrown past [`router::BackendRouter::submit`].

// ── Lint policy (aerospace-grade) ─────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod cost;
pub mod executor;
pub mod health;
pub mod provider;
pub mod registry;
pub mod router;
pub mod selector;
pub mod types;

#[cfg(feature = "health-endpoint")]
pub mod health_endpoint;

// Re-exports for convenience
pub use router::BackendRouter;
pub use types::{ErrorKind, Outcome, Priority, Request, RequestId, RequestKind};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"` — structured JSON output for production log aggregators
/// - anything else (including unset) — human-readable pretty output
///   for local development
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`RouterError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Panics
///
/// This function never panics.
///
/// # Example
///
/// ```no_run
/// # use backend_router::{init_tracing, RouterError};
/// # fn example() -> Result<(), RouterError> {
/// init_tracing()?;
/// # Ok(()) }
/// ```
pub fn init_tracing() -> Result<(), RouterError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| RouterError::Other(format!("tracing init failed: {e}")))
}

/// Construction-time router errors.
///
/// Request-path failures never use this type; they are reported as typed
/// [`types::Outcome`] values. `RouterError` surfaces misconfiguration
/// immediately at startup rather than at the first dispatch.
#[derive(Error, Debug)]
pub enum RouterError {
    /// The configuration failed semantic validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// A configured provider has no wired call capability.
    #[error("no endpoint wired for provider '{id}'")]
    MissingEndpoint {
        /// The provider id missing from the endpoint map.
        id: String,
    },

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_includes_message() {
        let err = RouterError::Config("providers must not be empty".to_string());
        assert!(err.to_string().contains("providers must not be empty"));
    }

    #[test]
    fn test_missing_endpoint_display_names_provider() {
        let err = RouterError::MissingEndpoint {
            id: "backup".to_string(),
        };
        assert!(err.to_string().contains("backup"));
    }

    #[test]
    fn test_init_tracing_second_call_returns_err() {
        // First call may succeed or fail depending on test execution order
        // (another test may have already installed a subscriber).
        let _ = init_tracing();
        // Second call must not panic — it should return Err.
        let result = init_tracing();
        assert!(result.is_err(), "double init must return Err, not panic");
    }
}
