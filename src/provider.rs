//! Provider capability abstraction.
//!
//! Defines the [`ProviderCall`] trait the router dispatches through, plus
//! [`EchoProvider`], a testing/demo implementation.
//!
//! The router treats a provider as an opaque capability: it forwards the
//! request payload and parameters, bounds the call with a deadline, and
//! interprets nothing about the response beyond its top-level shape.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Raw response returned by a provider call.
///
/// The body is opaque JSON; the executor only inspects which top-level
/// fields are present when computing the quality score.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The response body.
    pub body: serde_json::Value,
}

/// Failure modes of a provider call.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The provider gave up on its own deadline.
    #[error("provider call timed out")]
    Timeout,

    /// The provider returned or raised a failure.
    #[error("provider call failed: {0}")]
    Failed(String),
}

/// Trait for backend providers.
///
/// Implementations must be thread-safe (Send + Sync) for use across tasks.
/// The trait is object-safe to allow dynamic dispatch via
/// `Arc<dyn ProviderCall>`.
#[async_trait]
pub trait ProviderCall: Send + Sync {
    /// Execute one unit of work.
    ///
    /// The `deadline` is advisory for the provider; the executor enforces
    /// it independently and cancels the call when it elapses.
    async fn call(
        &self,
        payload: &str,
        parameters: &HashMap<String, String>,
        deadline: Duration,
    ) -> Result<RawResponse, CallError>;
}

// ============================================================================
// Echo Provider (Testing)
// ============================================================================

/// Dummy echo provider for testing and demos.
///
/// Sleeps for a configurable delay, then returns the payload wrapped in a
/// `result` field. Useful for router smoke tests without real backends.
pub struct EchoProvider {
    /// Simulated call delay.
    pub delay: Duration,
}

impl EchoProvider {
    /// Create an echo provider with a 10ms simulated delay.
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(10),
        }
    }

    /// Create an echo provider with a specific simulated delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderCall for EchoProvider {
    async fn call(
        &self,
        payload: &str,
        parameters: &HashMap<String, String>,
        _deadline: Duration,
    ) -> Result<RawResponse, CallError> {
        tokio::time::sleep(self.delay).await;

        Ok(RawResponse {
            body: serde_json::json!({
                "result": payload,
                "summary": format!("echo of {} bytes", payload.len()),
                "parameters_seen": parameters.len(),
            }),
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_provider_returns_payload_in_result_field() {
        let provider = EchoProvider::with_delay(Duration::ZERO);
        let response = provider
            .call("hello", &HashMap::new(), Duration::from_secs(1))
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test call: {e}")));
        assert_eq!(response.body["result"], "hello");
        assert!(response.body.get("summary").is_some());
    }

    #[tokio::test]
    async fn test_echo_provider_counts_parameters() {
        let provider = EchoProvider::with_delay(Duration::ZERO);
        let mut params = HashMap::new();
        params.insert("a".to_string(), "1".to_string());
        params.insert("b".to_string(), "2".to_string());
        let response = provider
            .call("x", &params, Duration::from_secs(1))
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test call: {e}")));
        assert_eq!(response.body["parameters_seen"], 2);
    }

    #[test]
    fn test_call_error_display() {
        assert_eq!(format!("{}", CallError::Timeout), "provider call timed out");
        assert!(
            format!("{}", CallError::Failed("boom".to_string())).contains("boom")
        );
    }
}
