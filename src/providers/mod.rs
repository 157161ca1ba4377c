//! AI backends behind one capability: send a prompt, get text back or a classified failure.
//!
//! - `gemini`: primary engine (Google Generative Language REST API)
//! - `openrouter`: backup engine (OpenAI-compatible chat completions)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::ProviderError;

pub mod gemini;
pub mod openrouter;

pub use gemini::Gemini;
pub use openrouter::OpenRouter;

const USER_AGENT_VALUE: &str = "study-buddy-backend/0.1";

#[async_trait]
pub trait ProviderClient: Send + Sync {
  /// Backend name used for provenance and logs (e.g. "gemini").
  fn name(&self) -> &str;

  /// Human-readable name for user-facing notices.
  fn display_name(&self) -> &str {
    self.name()
  }

  /// Whether credentials are present. Unconfigured clients fail every call with `AuthError`.
  fn is_configured(&self) -> bool;

  /// One call, bounded by `timeout`. No retries here.
  async fn call(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError>;
}

/// Map a non-success HTTP status to a failure class.
pub(crate) fn classify_status(status: StatusCode, message: String) -> ProviderError {
  let detail = format!("HTTP {}: {}", status.as_u16(), message);
  match status {
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthError(detail),
    StatusCode::TOO_MANY_REQUESTS => ProviderError::QuotaExceeded(detail),
    StatusCode::REQUEST_TIMEOUT => ProviderError::TransientError(detail),
    s if s.is_server_error() => ProviderError::TransientError(detail),
    _ => ProviderError::UnknownError(detail),
  }
}

/// Map a transport-level reqwest failure to a failure class.
pub(crate) fn classify_transport(e: reqwest::Error, timeout: Duration) -> ProviderError {
  if e.is_timeout() {
    ProviderError::Timeout(timeout)
  } else if e.is_connect() || e.is_request() || e.is_body() {
    ProviderError::TransientError(e.to_string())
  } else if e.is_decode() {
    ProviderError::UnknownError(format!("undecodable response: {e}"))
  } else {
    ProviderError::UnknownError(e.to_string())
  }
}

/// Build the shared HTTP client. Per-call timeouts are set on each request.
pub(crate) fn http_client() -> reqwest::Client {
  reqwest::Client::builder()
    .user_agent(USER_AGENT_VALUE)
    .build()
    .unwrap_or_else(|_| reqwest::Client::new())
}
