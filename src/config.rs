//! Loading service configuration (prompts, retry policies, XP rules, quiz policy) from TOML,
//! plus provider credentials from the environment.
//!
//! See `AppConfig` for the expected schema. Every section is optional.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub retry: RetrySection,
  #[serde(default)]
  pub xp: XpRules,
  #[serde(default)]
  pub quiz: QuizPolicy,
}

/// Prompt templates. Placeholders: `{topic}`, `{difficulty}`, `{count}`.
/// The quiz template carries the block format the quiz parser relies on;
/// override it only with a format that keeps `Q<n>.`, `A)` and `Answer:` markers.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub explain_template: String,
  pub summarize_template: String,
  pub flashcards_template: String,
  pub quiz_template: String,
  pub document_heading: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      explain_template: "Explain clearly in structured, easy language for a {difficulty} level learner:\n{topic}".into(),
      summarize_template: "Summarize clearly with key points and concise examples ({difficulty} level):\n{topic}".into(),
      flashcards_template: "Generate {count} {difficulty} level flashcards.\nFormat:\nQ: Question\nA: Answer\n\nTopic:\n{topic}".into(),
      quiz_template: concat!(
        "Generate {count} {difficulty} level multiple-choice questions.\n",
        "\n",
        "Format STRICTLY, one block per question, separated by a blank line:\n",
        "Q1. Question\n",
        "A) Option\n",
        "B) Option\n",
        "C) Option\n",
        "D) Option\n",
        "Answer: <single correct option letter>\n",
        "\n",
        "Rules: exactly one correct option per question; no duplicate options; no explanations.\n",
        "\n",
        "Topic:\n",
        "{topic}",
      )
      .into(),
      document_heading: "Document content:".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RetrySection {
  #[serde(default)]
  pub primary: RetrySettings,
  #[serde(default)]
  pub backup: RetrySettings,
}

/// Per-engine retry budget: `min(base * multiplier^(attempt-1), max)` between attempts.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
  pub max_attempts: u32,
  pub base_delay_ms: u64,
  pub multiplier: f64,
  pub max_delay_ms: u64,
}

impl Default for RetrySettings {
  fn default() -> Self {
    Self { max_attempts: 3, base_delay_ms: 1000, multiplier: 2.0, max_delay_ms: 4000 }
  }
}

/// XP awarded per event kind.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct XpRules {
  pub explain: u64,
  pub summarize: u64,
  pub flashcards: u64,
  pub quiz: u64,
  pub document_bonus: u64,
  pub quiz_submit_base: u64,
  pub per_correct_answer: u64,
}

impl Default for XpRules {
  fn default() -> Self {
    Self {
      explain: 8,
      summarize: 10,
      flashcards: 12,
      quiz: 15,
      document_bonus: 5,
      quiz_submit_base: 20,
      per_correct_answer: 5,
    }
  }
}

/// What to do when the AI text yields no usable quiz.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailurePolicy {
  /// Report the parse failure to the caller right away.
  Surface,
  /// Regenerate with the engine that produced the unusable text.
  SameEngine,
  /// Regenerate with the other engine (same engine when the request pinned one).
  OtherEngine,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuizPolicy {
  pub on_parse_failure: ParseFailurePolicy,
  pub max_regenerations: u32,
  /// Seconds an unsubmitted quiz is kept before it expires.
  pub pending_ttl_secs: u64,
  /// Unsubmitted quizzes kept per user; the oldest is evicted past this.
  pub max_pending_per_user: usize,
}

impl Default for QuizPolicy {
  fn default() -> Self {
    Self {
      on_parse_failure: ParseFailurePolicy::OtherEngine,
      max_regenerations: 1,
      pending_ttl_secs: 2 * 60 * 60,
      max_pending_per_user: 20,
    }
  }
}

/// Credentials and endpoints for both engines, read from the environment.
#[derive(Clone, Debug)]
pub struct ProviderEnv {
  pub gemini_api_key: Option<String>,
  pub gemini_base_url: String,
  pub gemini_model: String,
  pub openrouter_api_key: Option<String>,
  pub openrouter_base_url: String,
  pub openrouter_model: String,
  pub request_timeout: Duration,
}

impl ProviderEnv {
  pub fn from_env() -> Self {
    let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
    let timeout_secs = var("REQUEST_TIMEOUT").and_then(|s| s.parse::<u64>().ok()).unwrap_or(25);
    Self {
      gemini_api_key: var("GEMINI_API_KEY"),
      gemini_base_url: var("GEMINI_BASE_URL")
        .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".into()),
      gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| "gemini-flash-latest".into()),
      openrouter_api_key: var("OPENROUTER_API_KEY"),
      openrouter_base_url: var("OPENROUTER_BASE_URL").unwrap_or_else(|| "https://openrouter.ai/api/v1".into()),
      openrouter_model: var("OPENROUTER_MODEL").unwrap_or_else(|| "openai/gpt-3.5-turbo".into()),
      request_timeout: Duration::from_secs(timeout_secs.max(1)),
    }
  }
}

/// Attempt to load `AppConfig` from STUDY_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("STUDY_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "study_buddy", %path, "Loaded service config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "study_buddy", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "study_buddy", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults_elsewhere() {
    let cfg: AppConfig = toml::from_str(
      r#"
      [retry.backup]
      max_attempts = 5

      [quiz]
      on_parse_failure = "surface"

      [xp]
      per_correct_answer = 7
      "#,
    )
    .unwrap();
    assert_eq!(cfg.retry.backup.max_attempts, 5);
    assert_eq!(cfg.retry.backup.base_delay_ms, 1000);
    assert_eq!(cfg.retry.primary, RetrySettings::default());
    assert_eq!(cfg.quiz.on_parse_failure, ParseFailurePolicy::Surface);
    assert_eq!(cfg.quiz.max_regenerations, 1);
    assert_eq!(cfg.xp.per_correct_answer, 7);
    assert_eq!(cfg.xp.quiz_submit_base, 20);
    assert!(cfg.prompts.quiz_template.contains("Answer:"));
  }
}
