//! Bounded retries with exponential backoff around a single provider client.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::config::RetrySettings;
use crate::domain::Engine;
use crate::error::{ExhaustedError, ProviderError};
use crate::providers::ProviderClient;

/// Text produced by a client together with the attempts it took.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempted {
  pub text: String,
  pub attempts: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
  max_attempts: u32,
  base_delay: Duration,
  multiplier: f64,
  max_delay: Duration,
}

impl RetryPolicy {
  pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      base_delay,
      multiplier: if multiplier.is_finite() && multiplier >= 1.0 { multiplier } else { 1.0 },
      max_delay,
    }
  }

  pub fn max_attempts(&self) -> u32 {
    self.max_attempts
  }

  /// `min(base_delay * multiplier^(attempt-1), max_delay)`, `attempt` starting at 1.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
    if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
      self.max_delay
    } else {
      Duration::from_secs_f64(scaled)
    }
  }

  /// Upper bound on time spent sleeping between attempts for one full budget.
  pub fn total_backoff(&self) -> Duration {
    (1..self.max_attempts).map(|a| self.delay_for(a)).sum()
  }

  /// Call `client` until it succeeds, fails with a non-retryable error, or the budget runs out.
  /// Each attempt is cut off after `timeout`.
  #[instrument(level = "info", target = "provider", skip(self, client, prompt), fields(%engine, client = client.name(), max_attempts = self.max_attempts))]
  pub async fn execute(
    &self,
    engine: Engine,
    client: &dyn ProviderClient,
    prompt: &str,
    timeout: Duration,
  ) -> Result<Attempted, ExhaustedError> {
    let mut attempt = 1;
    loop {
      // The deadline holds even for clients that ignore `timeout` themselves.
      let outcome = tokio::time::timeout(timeout, client.call(prompt, timeout))
        .await
        .unwrap_or(Err(ProviderError::Timeout(timeout)));
      match outcome {
        Ok(text) => {
          debug!(target: "provider", attempt, "Provider call succeeded");
          return Ok(Attempted { text, attempts: attempt });
        }
        Err(e) if e.is_retryable() && attempt < self.max_attempts => {
          let delay = self.delay_for(attempt);
          warn!(target: "provider", attempt, kind = e.kind(), error = %e, ?delay, "Retryable provider failure; backing off");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e) => {
          warn!(target: "provider", attempt, kind = e.kind(), error = %e, retryable = e.is_retryable(), "Provider failure; giving up on this engine");
          return Err(ExhaustedError { engine, attempts: attempt, last: e });
        }
      }
    }
  }
}

impl From<&RetrySettings> for RetryPolicy {
  fn from(s: &RetrySettings) -> Self {
    RetryPolicy::new(
      s.max_attempts,
      Duration::from_millis(s.base_delay_ms),
      s.multiplier,
      Duration::from_millis(s.max_delay_ms),
    )
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;

  use async_trait::async_trait;

  use super::*;

  /// Client that replays a fixed script of results, then repeats the last one.
  pub(crate) struct ScriptedClient {
    name: &'static str,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    last: Mutex<Option<Result<String, ProviderError>>>,
    pub calls: AtomicU32,
  }

  impl ScriptedClient {
    pub(crate) fn new(name: &'static str, script: Vec<Result<String, ProviderError>>) -> Self {
      Self { name, script: Mutex::new(script.into()), last: Mutex::new(None), calls: AtomicU32::new(0) }
    }

    pub(crate) fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl ProviderClient for ScriptedClient {
    fn name(&self) -> &str { self.name }
    fn is_configured(&self) -> bool { true }

    async fn call(&self, _prompt: &str, _timeout: Duration) -> Result<String, ProviderError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let next = self.script.lock().unwrap().pop_front();
      let mut last = self.last.lock().unwrap();
      match next {
        Some(r) => {
          *last = Some(r.clone());
          r
        }
        None => last.clone().unwrap_or_else(|| Err(ProviderError::UnknownError("empty script".into()))),
      }
    }
  }

  pub(crate) fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1), 2.0, Duration::from_millis(4))
  }

  fn transient() -> Result<String, ProviderError> {
    Err(ProviderError::TransientError("503".into()))
  }

  #[test]
  fn delays_grow_then_cap() {
    let p = RetryPolicy::new(5, Duration::from_secs(1), 2.0, Duration::from_secs(4));
    assert_eq!(p.delay_for(1), Duration::from_secs(1));
    assert_eq!(p.delay_for(2), Duration::from_secs(2));
    assert_eq!(p.delay_for(3), Duration::from_secs(4));
    assert_eq!(p.delay_for(4), Duration::from_secs(4));
    assert_eq!(p.total_backoff(), Duration::from_secs(11));
  }

  #[test]
  fn zero_attempts_is_clamped_to_one() {
    let p = RetryPolicy::new(0, Duration::ZERO, 2.0, Duration::ZERO);
    assert_eq!(p.max_attempts(), 1);
  }

  #[tokio::test]
  async fn retries_transient_failures_until_success() {
    let client = ScriptedClient::new("p", vec![transient(), Err(ProviderError::Timeout(Duration::from_secs(1))), Ok("done".into())]);
    let out = fast_policy(3).execute(Engine::Primary, &client, "prompt", Duration::from_secs(1)).await.unwrap();
    assert_eq!(out, Attempted { text: "done".into(), attempts: 3 });
    assert_eq!(client.calls(), 3);
  }

  #[tokio::test]
  async fn exhaustion_carries_last_failure() {
    let client = ScriptedClient::new("p", vec![transient()]);
    let err = fast_policy(3).execute(Engine::Backup, &client, "prompt", Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err.engine, Engine::Backup);
    assert_eq!(err.attempts, 3);
    assert!(matches!(err.last, ProviderError::TransientError(_)));
    assert_eq!(client.calls(), 3);
  }

  #[tokio::test]
  async fn quota_and_auth_fail_fast() {
    for failure in [ProviderError::QuotaExceeded("429".into()), ProviderError::AuthError("401".into())] {
      let client = ScriptedClient::new("p", vec![Err(failure.clone())]);
      let err = fast_policy(5).execute(Engine::Primary, &client, "prompt", Duration::from_secs(1)).await.unwrap_err();
      assert_eq!(err.attempts, 1);
      assert_eq!(err.last, failure);
      assert_eq!(client.calls(), 1);
    }
  }

  /// Never answers within any reasonable deadline.
  struct StalledClient;

  #[async_trait]
  impl ProviderClient for StalledClient {
    fn name(&self) -> &str { "stalled" }
    fn is_configured(&self) -> bool { true }

    async fn call(&self, _prompt: &str, _timeout: Duration) -> Result<String, ProviderError> {
      tokio::time::sleep(Duration::from_secs(30)).await;
      Ok("too late".into())
    }
  }

  #[tokio::test]
  async fn stalled_client_is_cut_off_at_the_timeout() {
    let timeout = Duration::from_millis(20);
    let started = std::time::Instant::now();
    let err = fast_policy(2).execute(Engine::Primary, &StalledClient, "prompt", timeout).await.unwrap_err();
    assert_eq!(err.attempts, 2);
    assert_eq!(err.last, ProviderError::Timeout(timeout));
    assert!(started.elapsed() < Duration::from_secs(5));
  }
}
