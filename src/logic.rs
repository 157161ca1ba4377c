//! Request flows shared by the HTTP handlers: generate study content, submit a quiz,
//! and read back progress.
//!
//! Handlers stay thin; every decision about regeneration, XP and persistence lives here.

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ParseFailurePolicy;
use crate::domain::{
  Engine, GradeResult, Mode, ProviderChoice, ProviderOutcome, Quiz, QuizSummary, Request, SubmittedAnswers, XpState,
};
use crate::error::{AppError, ParseError, StoreError};
use crate::prompt::PromptBuilder;
use crate::scoring;
use crate::state::{AppState, PendingQuiz};
use crate::store::{AttemptRecord, LeaderboardEntry, ProgressUpdate, QuizStats, XpEventRecord};
use crate::util::{sanitize_text, trunc_for_log};
use crate::xp::{motivation, LevelInfo, XpEvent, XpLedger};

/// Load/apply/save rounds before giving up on a contended user record.
const MAX_SAVE_ROUNDS: usize = 5;

#[derive(Clone, Debug)]
pub enum Content {
  /// Explanation, summary or flashcards, sanitized for display.
  Text(String),
  /// A parsed quiz waiting for submission under `quiz_id`.
  Quiz { quiz_id: String, quiz: Quiz },
}

#[derive(Clone, Debug)]
pub struct Generated {
  pub request: Request,
  pub outcome: ProviderOutcome,
  pub content: Content,
  /// Extra generations spent because the first text held no usable quiz.
  pub regenerations: u32,
  pub award: Award,
}

/// XP movement caused by one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Award {
  pub points: u64,
  pub before: XpState,
  pub after: XpState,
}

impl Award {
  pub fn leveled_up(&self) -> bool {
    self.after.level > self.before.level
  }
}

#[derive(Clone, Debug)]
pub struct Submission {
  pub result: GradeResult,
  pub correct_answers: Vec<usize>,
  pub summary: QuizSummary,
  pub award: Award,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
  pub xp: XpState,
  pub level: LevelInfo,
  pub recent_events: Vec<XpEventRecord>,
  pub motivation: &'static str,
}

/// Build the prompt, run it through the engines, and turn the text into content.
/// Quiz text that fails to parse is regenerated per `[quiz]` config before giving up.
#[instrument(level = "info", skip(state, request), fields(%user_id, mode = request.mode.as_str(), provider = ?request.provider))]
pub async fn generate(state: &AppState, user_id: &str, request: Request) -> Result<Generated, AppError> {
  let prompt = PromptBuilder::new(&state.config.prompts).build(&request)?;
  let mut outcome = state.orchestrator.run(&prompt, request.provider).await?;

  let mut regenerations = 0;
  let parsed = match request.mode {
    Mode::Quiz => {
      let expected = request.question_count as usize;
      let quiz = loop {
        let err = match crate::quiz::parse(&outcome.raw_text, expected) {
          Ok(quiz) => break quiz,
          Err(err) => err,
        };
        let Some(choice) = regeneration_choice(state, &request, outcome.engine_used, regenerations) else {
          warn!(target: "quiz", blocks = err.blocks_seen, regenerations, "No usable quiz; surfacing parse failure");
          return Err(err.into());
        };
        warn!(target: "quiz", blocks = err.blocks_seen, ?choice, "No usable quiz; regenerating");
        debug!(target: "quiz", preview = %trunc_for_log(&outcome.raw_text, 160), "Unparseable quiz text");
        regenerations += 1;
        outcome = regenerate(state, &prompt, choice, err).await?;
      };

      if quiz.len() != expected {
        info!(target: "quiz", expected, got = quiz.len(), "Quiz question count differs from request");
      }
      let summary = QuizSummary {
        topic: quiz_topic(&request),
        difficulty: request.difficulty,
        engine: outcome.engine_name.clone(),
      };
      Some(PendingQuiz::new(user_id, quiz, summary))
    }
    _ => None,
  };

  let event = XpEvent::TaskCompleted { mode: request.mode, with_document: request.document_text.is_some() };
  let award = award_xp(state, user_id, &event, None).await?;

  // Only a generation whose XP was recorded leaves a quiz open for submission.
  let content = match parsed {
    Some(pending) => {
      let quiz = pending.quiz.clone();
      let quiz_id = state.stash_quiz(pending).await;
      Content::Quiz { quiz_id, quiz }
    }
    None => Content::Text(sanitize_text(&outcome.raw_text)),
  };

  info!(target: "study_buddy", engine = %outcome.engine_name, attempts = outcome.attempts, regenerations, points = award.points, "Generation complete");
  Ok(Generated { request, outcome, content, regenerations, award })
}

/// Which engine to ask next after unparseable quiz text, or `None` to surface the failure.
fn regeneration_choice(state: &AppState, request: &Request, last: Engine, done: u32) -> Option<ProviderChoice> {
  let policy = &state.config.quiz;
  if done >= policy.max_regenerations {
    return None;
  }
  match policy.on_parse_failure {
    ParseFailurePolicy::Surface => None,
    ParseFailurePolicy::SameEngine => Some(last.into()),
    ParseFailurePolicy::OtherEngine => Some(match request.provider.pinned() {
      Some(pinned) => pinned.into(),
      None => last.other().into(),
    }),
  }
}

/// A regeneration that cannot reach its engine reports the original parse failure.
async fn regenerate(state: &AppState, prompt: &str, choice: ProviderChoice, parse_err: ParseError) -> Result<ProviderOutcome, AppError> {
  match state.orchestrator.run(prompt, choice).await {
    Ok(outcome) => Ok(outcome),
    Err(e) => {
      warn!(target: "quiz", error = %e, "Regeneration failed");
      Err(parse_err.into())
    }
  }
}

fn quiz_topic(request: &Request) -> String {
  let topic = request.topic_or_text.trim();
  if topic.is_empty() {
    "Uploaded document".into()
  } else {
    topic.chars().take(120).collect()
  }
}

/// Grade a pending quiz, award XP and record the attempt. Each quiz can be submitted once.
#[instrument(level = "info", skip(state, answers), fields(%user_id, %quiz_id, answered = answers.len()))]
pub async fn submit_quiz(
  state: &AppState,
  user_id: &str,
  quiz_id: &str,
  answers: &SubmittedAnswers,
) -> Result<Submission, AppError> {
  let pending = state
    .take_quiz(quiz_id, user_id)
    .await
    .ok_or_else(|| AppError::UnknownQuiz(quiz_id.to_string()))?;

  let result = scoring::grade(&pending.quiz, answers);
  let attempt = AttemptRecord::new(&pending.summary, &result);
  let award = match award_xp(state, user_id, &XpEvent::quiz(&result), Some(attempt)).await {
    Ok(a) => a,
    Err(e) => {
      state.restore_quiz(quiz_id.to_string(), pending).await;
      return Err(e);
    }
  };

  info!(
    target: "quiz",
    correct = result.correct_count,
    total = result.total,
    points = award.points,
    leveled_up = award.leveled_up(),
    "Quiz submitted"
  );
  Ok(Submission {
    correct_answers: pending.quiz.questions().iter().map(|q| q.correct_index()).collect(),
    summary: pending.summary,
    result,
    award,
  })
}

/// Apply a progression event reported by an outer layer (e.g. a document analysis done there).
#[instrument(level = "info", skip(state, raw), fields(%user_id))]
pub async fn record_event(state: &AppState, user_id: &str, raw: serde_json::Value) -> Result<Award, AppError> {
  let event = XpEvent::from_json(raw).map_err(|e| {
    error!(target: "xp", error = %e, "Rejected progression event");
    e
  })?;
  award_xp(state, user_id, &event, None).await
}

/// Load, apply, compare-and-save; reload and retry when another request got there first.
async fn award_xp(
  state: &AppState,
  user_id: &str,
  event: &XpEvent,
  attempt: Option<AttemptRecord>,
) -> Result<Award, AppError> {
  for round in 1..=MAX_SAVE_ROUNDS {
    let before = state.store.load_xp_state(user_id).await?;
    let after = state.ledger.apply(&before, event).map_err(|e| {
      error!(target: "xp", %user_id, error = %e, "Invalid progression event");
      e
    })?;
    let points = after.total_xp - before.total_xp;
    let update = ProgressUpdate {
      next: after,
      event: XpEventRecord::new(event.action(), points),
      attempt: attempt.clone(),
    };
    match state.store.save_progress(user_id, before.total_xp, update).await {
      Ok(()) => return Ok(Award { points, before, after }),
      Err(StoreError::Conflict(_)) => {
        warn!(target: "xp", %user_id, round, "XP save conflicted; reloading");
      }
      Err(e) => return Err(e.into()),
    }
  }
  error!(target: "xp", %user_id, "XP save kept conflicting; giving up");
  Err(StoreError::Conflict(user_id.to_string()).into())
}

pub async fn progress(state: &AppState, user_id: &str, events_limit: usize) -> Result<Progress, AppError> {
  let xp = state.store.load_xp_state(user_id).await?;
  Ok(Progress {
    level: XpLedger::level_info(&xp),
    recent_events: state.store.xp_events(user_id, events_limit).await?,
    motivation: motivation(),
    xp,
  })
}

pub async fn history(state: &AppState, user_id: &str, limit: usize, topic: Option<&str>) -> Result<Vec<AttemptRecord>, AppError> {
  Ok(state.store.recent_attempts(user_id, limit, topic).await?)
}

pub async fn stats(state: &AppState, user_id: &str) -> Result<(QuizStats, XpState), AppError> {
  Ok((state.store.stats(user_id).await?, state.store.load_xp_state(user_id).await?))
}

pub async fn leaderboard(state: &AppState, limit: usize) -> Result<Vec<LeaderboardEntry>, AppError> {
  Ok(state.store.leaderboard(limit).await?)
}
