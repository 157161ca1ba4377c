//! Domain models: generation requests, provider provenance, quizzes, grading results
//! and progression state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvalidRequestError;

/// Longest topic text we keep; anything beyond is cut, not rejected.
pub const MAX_TOPIC_CHARS: usize = 2000;
/// Longest document (PDF-derived) text appended to a prompt.
pub const MAX_DOCUMENT_CHARS: usize = 12000;
/// Supported question count bounds for quizzes and flashcards.
pub const MIN_QUESTIONS: u32 = 1;
pub const MAX_QUESTIONS: u32 = 50;
pub const DEFAULT_QUESTIONS: u32 = 5;

/// What kind of study content is requested?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  Explain,
  Summarize,
  Quiz,
  Flashcards,
}

impl Mode {
  pub fn as_str(self) -> &'static str {
    match self {
      Mode::Explain => "explain",
      Mode::Summarize => "summarize",
      Mode::Quiz => "quiz",
      Mode::Flashcards => "flashcards",
    }
  }
}

impl FromStr for Mode {
  type Err = InvalidRequestError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "explain" => Ok(Mode::Explain),
      "summarize" => Ok(Mode::Summarize),
      "quiz" => Ok(Mode::Quiz),
      "flashcards" => Ok(Mode::Flashcards),
      other => Err(InvalidRequestError::new("mode", format!("unsupported mode '{other}'"))),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  /// Capitalized label, as embedded into prompts and stored with attempts.
  pub fn label(self) -> &'static str {
    match self {
      Difficulty::Easy => "Easy",
      Difficulty::Medium => "Medium",
      Difficulty::Hard => "Hard",
    }
  }
}

impl FromStr for Difficulty {
  type Err = InvalidRequestError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "easy" => Ok(Difficulty::Easy),
      "medium" => Ok(Difficulty::Medium),
      "hard" => Ok(Difficulty::Hard),
      other => Err(InvalidRequestError::new("difficulty", format!("unsupported difficulty '{other}'"))),
    }
  }
}

/// One of the two configured AI backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
  Primary,
  Backup,
}

impl Engine {
  pub fn other(self) -> Engine {
    match self {
      Engine::Primary => Engine::Backup,
      Engine::Backup => Engine::Primary,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Engine::Primary => "primary",
      Engine::Backup => "backup",
    }
  }
}

impl fmt::Display for Engine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Which engine(s) the caller allows: `auto` enables failover, the others pin one engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderChoice {
  #[default]
  Auto,
  Primary,
  Backup,
}

impl ProviderChoice {
  pub fn pinned(self) -> Option<Engine> {
    match self {
      ProviderChoice::Auto => None,
      ProviderChoice::Primary => Some(Engine::Primary),
      ProviderChoice::Backup => Some(Engine::Backup),
    }
  }
}

impl From<Engine> for ProviderChoice {
  fn from(e: Engine) -> Self {
    match e {
      Engine::Primary => ProviderChoice::Primary,
      Engine::Backup => ProviderChoice::Backup,
    }
  }
}

impl FromStr for ProviderChoice {
  type Err = InvalidRequestError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "auto" => Ok(ProviderChoice::Auto),
      "primary" => Ok(ProviderChoice::Primary),
      "backup" => Ok(ProviderChoice::Backup),
      other => Err(InvalidRequestError::new("provider", format!("unsupported provider '{other}'"))),
    }
  }
}

/// Validated generation request. Build it with `Request::parse` (string input from the
/// web layer) or directly from typed fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
  pub mode: Mode,
  pub provider: ProviderChoice,
  pub topic_or_text: String,
  pub difficulty: Difficulty,
  pub question_count: u32,
  /// Plain text extracted from an uploaded document, if any.
  pub document_text: Option<String>,
}

impl Request {
  /// Validate raw string fields. Rejected before any AI call is made.
  pub fn parse(
    mode: &str,
    provider: Option<&str>,
    topic_or_text: &str,
    difficulty: Option<&str>,
    question_count: Option<u32>,
    document_text: Option<String>,
  ) -> Result<Self, InvalidRequestError> {
    let request = Request {
      mode: mode.parse()?,
      provider: provider.map(str::parse).transpose()?.unwrap_or_default(),
      topic_or_text: truncate_chars(topic_or_text.trim(), MAX_TOPIC_CHARS),
      difficulty: difficulty.map(str::parse).transpose()?.unwrap_or(Difficulty::Easy),
      question_count: question_count.unwrap_or(DEFAULT_QUESTIONS),
      document_text: document_text
        .map(|d| truncate_chars(d.trim(), MAX_DOCUMENT_CHARS))
        .filter(|d| !d.is_empty()),
    };
    request.validate()?;
    Ok(request)
  }

  /// Bounds checks that typed construction cannot express.
  pub fn validate(&self) -> Result<(), InvalidRequestError> {
    if !(MIN_QUESTIONS..=MAX_QUESTIONS).contains(&self.question_count) {
      return Err(InvalidRequestError::new(
        "question_count",
        format!("must be between {MIN_QUESTIONS} and {MAX_QUESTIONS}, got {}", self.question_count),
      ));
    }
    if self.topic_or_text.trim().is_empty() && self.document_text.is_none() {
      return Err(InvalidRequestError::new("topic", "enter prompt text or attach a document"));
    }
    Ok(())
  }
}

fn truncate_chars(s: &str, max: usize) -> String {
  s.chars().take(max).collect()
}

/// Result of one orchestrated generation. Immutable once created.
#[derive(Clone, Debug, Serialize)]
pub struct ProviderOutcome {
  pub engine_used: Engine,
  /// Backend name of the engine that answered (e.g. "gemini").
  pub engine_name: String,
  pub raw_text: String,
  /// Attempts across every engine tried for this run.
  pub attempts: u32,
  pub succeeded: bool,
  /// User-facing note when the answer came from the backup after a primary failure.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub failover_notice: Option<String>,
  /// Why the primary was abandoned, when failover happened.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub primary_failure: Option<String>,
}

/// A single multiple-choice question. Only the quiz parser creates these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
  text: String,
  options: Vec<String>,
  correct_index: usize,
}

impl Question {
  /// Invariants (>= 2 distinct non-empty options, index in range) are upheld by the parser.
  pub(crate) fn new(text: String, options: Vec<String>, correct_index: usize) -> Self {
    debug_assert!(options.len() >= 2 && correct_index < options.len());
    Self { text, options, correct_index }
  }

  pub fn text(&self) -> &str { &self.text }
  pub fn options(&self) -> &[String] { &self.options }
  pub fn correct_index(&self) -> usize { self.correct_index }
}

/// Ordered, non-empty list of questions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quiz(Vec<Question>);

impl Quiz {
  pub(crate) fn new(questions: Vec<Question>) -> Self {
    debug_assert!(!questions.is_empty());
    Quiz(questions)
  }

  pub fn questions(&self) -> &[Question] { &self.0 }
  pub fn len(&self) -> usize { self.0.len() }
  #[allow(dead_code)]
  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// Question index -> selected option index. Unanswered questions are absent.
pub type SubmittedAnswers = BTreeMap<usize, usize>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
  pub is_correct: bool,
}

/// Graded submission. Computed fresh each time, never cached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
  pub correct_count: u32,
  pub total: u32,
  pub per_question: Vec<QuestionOutcome>,
}

impl GradeResult {
  /// 0.0 for an empty quiz instead of dividing by zero.
  pub fn percentage(&self) -> f64 {
    if self.total == 0 {
      0.0
    } else {
      f64::from(self.correct_count) / f64::from(self.total) * 100.0
    }
  }
}

/// Badge tiers, ascending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Badge {
  Bronze,
  Silver,
  Gold,
  Platinum,
  Legend,
}

impl Badge {
  pub fn icon(self) -> &'static str {
    match self {
      Badge::Bronze => "🥉",
      Badge::Silver => "🥈",
      Badge::Gold => "🥇",
      Badge::Platinum => "💠",
      Badge::Legend => "👑",
    }
  }
}

/// Progression state. `level` and `badge` are always derived from `total_xp`
/// (see `xp::XpLedger::state_for`), never trusted from storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpState {
  pub total_xp: u64,
  pub level: u32,
  pub badge: Badge,
}

/// What a finished quiz attempt looked like, for history and stats.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuizSummary {
  pub topic: String,
  pub difficulty: Difficulty,
  pub engine: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_accepts_enumerated_values_case_insensitively() {
    let r = Request::parse("Quiz", Some("AUTO"), "  Photosynthesis ", Some("Medium"), Some(3), None).unwrap();
    assert_eq!(r.mode, Mode::Quiz);
    assert_eq!(r.provider, ProviderChoice::Auto);
    assert_eq!(r.difficulty, Difficulty::Medium);
    assert_eq!(r.topic_or_text, "Photosynthesis");
    assert_eq!(r.question_count, 3);
  }

  #[test]
  fn parse_rejects_unknown_enums_and_bounds() {
    let err = Request::parse("poem", None, "x", None, None, None).unwrap_err();
    assert_eq!(err.field, "mode");
    let err = Request::parse("quiz", Some("gpt"), "x", None, None, None).unwrap_err();
    assert_eq!(err.field, "provider");
    let err = Request::parse("quiz", None, "x", Some("insane"), None, None).unwrap_err();
    assert_eq!(err.field, "difficulty");
    let err = Request::parse("quiz", None, "x", None, Some(0), None).unwrap_err();
    assert_eq!(err.field, "question_count");
    let err = Request::parse("quiz", None, "x", None, Some(51), None).unwrap_err();
    assert_eq!(err.field, "question_count");
  }

  #[test]
  fn empty_topic_needs_a_document() {
    assert!(Request::parse("explain", None, "   ", None, None, None).is_err());
    let r = Request::parse("explain", None, "", None, None, Some("Chapter 1 text".into())).unwrap();
    assert_eq!(r.document_text.as_deref(), Some("Chapter 1 text"));
  }

  #[test]
  fn long_topics_are_cut() {
    let long = "a".repeat(MAX_TOPIC_CHARS + 50);
    let r = Request::parse("explain", None, &long, None, None, None).unwrap();
    assert_eq!(r.topic_or_text.chars().count(), MAX_TOPIC_CHARS);
  }

  #[test]
  fn percentage_guards_empty_total() {
    let r = GradeResult { correct_count: 0, total: 0, per_question: vec![] };
    assert_eq!(r.percentage(), 0.0);
  }
}
