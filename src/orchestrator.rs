//! Provider failover: primary first, backup on any primary failure (auto mode),
//! or a single pinned engine. Each engine gets its own full retry budget.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::domain::{Engine, ProviderChoice, ProviderOutcome};
use crate::error::{AllProvidersFailedError, ExhaustedError};
use crate::providers::ProviderClient;
use crate::retry::{Attempted, RetryPolicy};

/// A client paired with the retry budget it runs under.
#[derive(Clone)]
pub struct EngineSlot {
  pub client: Arc<dyn ProviderClient>,
  pub policy: RetryPolicy,
}

#[derive(Clone)]
pub struct ProviderOrchestrator {
  primary: EngineSlot,
  backup: EngineSlot,
  timeout: Duration,
}

impl ProviderOrchestrator {
  pub fn new(primary: EngineSlot, backup: EngineSlot, timeout: Duration) -> Self {
    Self { primary, backup, timeout }
  }

  pub fn slot(&self, engine: Engine) -> &EngineSlot {
    match engine {
      Engine::Primary => &self.primary,
      Engine::Backup => &self.backup,
    }
  }

  pub fn engine_name(&self, engine: Engine) -> &str {
    self.slot(engine).client.name()
  }

  /// Worst-case wall time for one run: every attempt times out and every backoff is taken.
  pub fn worst_case_duration(&self, choice: ProviderChoice) -> Duration {
    let budget = |s: &EngineSlot| self.timeout * s.policy.max_attempts() + s.policy.total_backoff();
    match choice.pinned() {
      Some(engine) => budget(self.slot(engine)),
      None => budget(&self.primary) + budget(&self.backup),
    }
  }

  /// Generate text for `prompt`. The same prompt goes to every engine tried.
  #[instrument(level = "info", target = "provider", skip(self, prompt), fields(?choice, prompt_len = prompt.len()))]
  pub async fn run(&self, prompt: &str, choice: ProviderChoice) -> Result<ProviderOutcome, AllProvidersFailedError> {
    if let Some(engine) = choice.pinned() {
      return match self.attempt(engine, prompt).await {
        Ok(done) => Ok(self.outcome(engine, done, None, None)),
        Err(failure) => {
          error!(target: "provider", %engine, error = %failure, "Pinned engine failed; no failover in single-provider mode");
          Err(AllProvidersFailedError { failures: vec![failure] })
        }
      };
    }

    let primary_failure = match self.attempt(Engine::Primary, prompt).await {
      Ok(done) => return Ok(self.outcome(Engine::Primary, done, None, None)),
      Err(failure) => failure,
    };

    warn!(target: "provider", error = %primary_failure, backup = self.engine_name(Engine::Backup), "Primary engine failed; failing over");
    match self.attempt(Engine::Backup, prompt).await {
      Ok(done) => {
        let notice = format!(
          "{} unavailable. Switched to {} backup.",
          self.primary.client.display_name(),
          self.backup.client.display_name(),
        );
        Ok(self.outcome(Engine::Backup, done, Some(&primary_failure), Some(notice)))
      }
      Err(backup_failure) => {
        error!(target: "provider", primary = %primary_failure, backup = %backup_failure, "All engines failed");
        Err(AllProvidersFailedError { failures: vec![primary_failure, backup_failure] })
      }
    }
  }

  async fn attempt(&self, engine: Engine, prompt: &str) -> Result<Attempted, ExhaustedError> {
    let slot = self.slot(engine);
    slot.policy.execute(engine, slot.client.as_ref(), prompt, self.timeout).await
  }

  fn outcome(
    &self,
    engine: Engine,
    done: Attempted,
    primary_failure: Option<&ExhaustedError>,
    failover_notice: Option<String>,
  ) -> ProviderOutcome {
    info!(target: "provider", %engine, name = self.engine_name(engine), attempts = done.attempts, text_len = done.text.len(), "Generation succeeded");
    ProviderOutcome {
      engine_used: engine,
      engine_name: self.engine_name(engine).to_string(),
      raw_text: done.text,
      attempts: primary_failure.map_or(0, |f| f.attempts) + done.attempts,
      succeeded: true,
      failover_notice,
      primary_failure: primary_failure.map(|f| f.to_string()),
    }
  }
}
