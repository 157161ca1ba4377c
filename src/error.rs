//! Error taxonomy: request validation, provider failures, retry exhaustion,
//! quiz extraction and progression events.

use std::time::Duration;

use thiserror::Error;

use crate::domain::Engine;

/// Bad enum value or out-of-bounds field. Raised before any I/O; never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct InvalidRequestError {
  pub field: &'static str,
  pub reason: String,
}

impl InvalidRequestError {
  pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
    Self { field, reason: reason.into() }
  }
}

/// One failed call to one backend, classified for retry eligibility.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
  #[error("timed out after {0:?}")]
  Timeout(Duration),
  #[error("quota exceeded: {0}")]
  QuotaExceeded(String),
  #[error("authentication failed: {0}")]
  AuthError(String),
  #[error("transient failure: {0}")]
  TransientError(String),
  #[error("unexpected failure: {0}")]
  UnknownError(String),
}

impl ProviderError {
  /// Only timeouts and transient failures are worth another attempt.
  pub fn is_retryable(&self) -> bool {
    matches!(self, ProviderError::Timeout(_) | ProviderError::TransientError(_))
  }

  pub fn kind(&self) -> &'static str {
    match self {
      ProviderError::Timeout(_) => "timeout",
      ProviderError::QuotaExceeded(_) => "quota_exceeded",
      ProviderError::AuthError(_) => "auth_error",
      ProviderError::TransientError(_) => "transient_error",
      ProviderError::UnknownError(_) => "unknown_error",
    }
  }
}

/// One engine's retry budget is spent (or it failed with a fail-fast error).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{engine} gave up after {attempts} attempt(s): {last}")]
pub struct ExhaustedError {
  pub engine: Engine,
  pub attempts: u32,
  pub last: ProviderError,
}

/// Every engine allowed for the request failed. Terminal for the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("all providers failed: {}", summarize(.failures))]
pub struct AllProvidersFailedError {
  pub failures: Vec<ExhaustedError>,
}

fn summarize(failures: &[ExhaustedError]) -> String {
  failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; ")
}

/// Why a single quiz block was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRejection {
  MissingStem,
  TooFewOptions(usize),
  NoAnswerMarked,
  MultipleAnswersMarked(usize),
  AnswerOutOfRange(String),
}

/// The AI text did not yield a single usable question.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no valid questions found in {blocks_seen} block(s)")]
pub struct ParseError {
  pub blocks_seen: usize,
  pub rejections: Vec<BlockRejection>,
}

/// Unknown or inconsistent progression event. A caller defect, not a user error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid progression event: {0}")]
pub struct InvalidEventError(pub String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
  /// Someone else updated the record between our load and save.
  #[error("concurrent update for user '{0}'")]
  Conflict(String),
  #[error("store backend failure: {0}")]
  Backend(String),
}

/// Everything a request can fail with, as surfaced to the web layer.
#[derive(Debug, Error)]
pub enum AppError {
  #[error(transparent)]
  InvalidRequest(#[from] InvalidRequestError),
  #[error(transparent)]
  AllProvidersFailed(#[from] AllProvidersFailedError),
  #[error(transparent)]
  Parse(#[from] ParseError),
  #[error(transparent)]
  InvalidEvent(#[from] InvalidEventError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error("unknown or already submitted quiz '{0}'")]
  UnknownQuiz(String),
}
