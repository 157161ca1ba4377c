//! Progress persistence: per-user XP, quiz attempt history and the XP event log.
//!
//! `ProgressStore` is the seam for a real database. `InMemoryStore` keeps everything
//! behind a tokio `RwLock` and is what the service runs with by default.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::domain::{Badge, Difficulty, GradeResult, QuizSummary, XpState};
use crate::error::StoreError;
use crate::xp::XpLedger;

/// One graded quiz attempt, as kept in history.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
  pub topic: String,
  pub difficulty: Difficulty,
  pub engine: String,
  pub correct_count: u32,
  pub total: u32,
  pub percentage: f64,
  /// Unix seconds.
  pub recorded_at: u64,
}

impl AttemptRecord {
  pub fn new(summary: &QuizSummary, result: &GradeResult) -> Self {
    Self {
      topic: summary.topic.clone(),
      difficulty: summary.difficulty,
      engine: summary.engine.clone(),
      correct_count: result.correct_count,
      total: result.total,
      percentage: result.percentage(),
      recorded_at: now_secs(),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpEventRecord {
  pub action: String,
  pub points: u64,
  pub recorded_at: u64,
}

impl XpEventRecord {
  pub fn new(action: String, points: u64) -> Self {
    Self { action, points, recorded_at: now_secs() }
  }
}

/// Everything one progression step writes, committed together.
#[derive(Clone, Debug)]
pub struct ProgressUpdate {
  pub next: XpState,
  pub event: XpEventRecord,
  pub attempt: Option<AttemptRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizStats {
  pub attempts: u32,
  pub total_score: u64,
  pub total_questions: u64,
  /// Mean of per-attempt percentages, two decimals.
  pub avg_percent: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
  /// Competition ranking: equal XP shares a rank, the next distinct XP skips ahead.
  pub rank: u32,
  pub user_id: String,
  pub total_xp: u64,
  pub level: u32,
  pub badge: Badge,
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
  /// Current state; unknown users start at zero.
  async fn load_xp_state(&self, user_id: &str) -> Result<XpState, StoreError>;

  /// Commit `update` only if the stored total still equals `expected_total_xp`.
  /// Otherwise `StoreError::Conflict`; the caller reloads and recomputes.
  async fn save_progress(&self, user_id: &str, expected_total_xp: u64, update: ProgressUpdate) -> Result<(), StoreError>;

  /// Newest first. `topic` filters by case-insensitive substring.
  async fn recent_attempts(&self, user_id: &str, limit: usize, topic: Option<&str>) -> Result<Vec<AttemptRecord>, StoreError>;

  /// Newest first.
  async fn xp_events(&self, user_id: &str, limit: usize) -> Result<Vec<XpEventRecord>, StoreError>;

  async fn stats(&self, user_id: &str) -> Result<QuizStats, StoreError>;

  async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError>;
}

#[derive(Default)]
struct UserRecord {
  /// Registration order, breaks leaderboard ties.
  seq: u64,
  total_xp: u64,
  attempts: Vec<AttemptRecord>,
  events: Vec<XpEventRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
  users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl ProgressStore for InMemoryStore {
  async fn load_xp_state(&self, user_id: &str) -> Result<XpState, StoreError> {
    let total = self.users.read().await.get(user_id).map(|u| u.total_xp).unwrap_or(0);
    Ok(XpLedger::state_for(total))
  }

  #[instrument(level = "debug", target = "store", skip(self, update), fields(%user_id, expected_total_xp, next_total_xp = update.next.total_xp))]
  async fn save_progress(&self, user_id: &str, expected_total_xp: u64, update: ProgressUpdate) -> Result<(), StoreError> {
    let mut users = self.users.write().await;
    let next_seq = users.len() as u64;
    let user = users
      .entry(user_id.to_string())
      .or_insert_with(|| UserRecord { seq: next_seq, ..UserRecord::default() });

    if user.total_xp != expected_total_xp {
      warn!(target: "store", stored = user.total_xp, expected_total_xp, "Stale XP state; rejecting save");
      return Err(StoreError::Conflict(user_id.to_string()));
    }

    user.total_xp = update.next.total_xp;
    user.events.push(update.event);
    if let Some(attempt) = update.attempt {
      user.attempts.push(attempt);
    }
    debug!(target: "store", total_xp = user.total_xp, "Progress saved");
    Ok(())
  }

  async fn recent_attempts(&self, user_id: &str, limit: usize, topic: Option<&str>) -> Result<Vec<AttemptRecord>, StoreError> {
    let needle = topic.map(str::trim).filter(|t| !t.is_empty()).map(str::to_lowercase);
    let users = self.users.read().await;
    let Some(user) = users.get(user_id) else { return Ok(vec![]) };
    Ok(user
      .attempts
      .iter()
      .rev()
      .filter(|a| needle.as_ref().map_or(true, |n| a.topic.to_lowercase().contains(n)))
      .take(limit)
      .cloned()
      .collect())
  }

  async fn xp_events(&self, user_id: &str, limit: usize) -> Result<Vec<XpEventRecord>, StoreError> {
    let users = self.users.read().await;
    Ok(users.get(user_id).map(|u| u.events.iter().rev().take(limit).cloned().collect()).unwrap_or_default())
  }

  async fn stats(&self, user_id: &str) -> Result<QuizStats, StoreError> {
    let users = self.users.read().await;
    let Some(user) = users.get(user_id) else { return Ok(QuizStats::default()) };
    Ok(summarize_attempts(&user.attempts))
  }

  async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
    let users = self.users.read().await;
    let mut rows: Vec<(&String, &UserRecord)> = users.iter().collect();
    rows.sort_by(|(_, a), (_, b)| b.total_xp.cmp(&a.total_xp).then(a.seq.cmp(&b.seq)));
    Ok(rank_rows(rows.into_iter().take(limit).map(|(id, u)| (id.clone(), u.total_xp))))
  }
}

fn summarize_attempts(attempts: &[AttemptRecord]) -> QuizStats {
  if attempts.is_empty() {
    return QuizStats::default();
  }
  let total_score = attempts.iter().map(|a| u64::from(a.correct_count)).sum();
  let total_questions = attempts.iter().map(|a| u64::from(a.total)).sum();
  let mean = attempts.iter().map(|a| a.percentage).sum::<f64>() / attempts.len() as f64;
  QuizStats {
    attempts: u32::try_from(attempts.len()).unwrap_or(u32::MAX),
    total_score,
    total_questions,
    avg_percent: (mean * 100.0).round() / 100.0,
  }
}

/// Rows must already be sorted by XP, descending.
fn rank_rows(rows: impl Iterator<Item = (String, u64)>) -> Vec<LeaderboardEntry> {
  let mut out: Vec<LeaderboardEntry> = Vec::new();
  for (idx, (user_id, total_xp)) in rows.enumerate() {
    let rank = match out.last() {
      Some(prev) if prev.total_xp == total_xp => prev.rank,
      _ => idx as u32 + 1,
    };
    let state = XpLedger::state_for(total_xp);
    out.push(LeaderboardEntry { rank, user_id, total_xp, level: state.level, badge: state.badge });
  }
  out
}

fn now_secs() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn update(total: u64, action: &str, attempt: Option<AttemptRecord>) -> ProgressUpdate {
    ProgressUpdate { next: XpLedger::state_for(total), event: XpEventRecord::new(action.into(), 10), attempt }
  }

  fn attempt(topic: &str, correct: u32, total: u32) -> AttemptRecord {
    let summary = QuizSummary { topic: topic.into(), difficulty: Difficulty::Easy, engine: "gemini".into() };
    let result = GradeResult {
      correct_count: correct,
      total,
      per_question: vec![],
    };
    AttemptRecord::new(&summary, &result)
  }

  #[tokio::test]
  async fn unknown_user_starts_at_zero() {
    let s = InMemoryStore::new();
    let st = s.load_xp_state("nobody").await.unwrap();
    assert_eq!(st.total_xp, 0);
    assert_eq!(st.badge, Badge::Bronze);
    assert!(s.recent_attempts("nobody", 10, None).await.unwrap().is_empty());
    assert_eq!(s.stats("nobody").await.unwrap(), QuizStats::default());
  }

  #[tokio::test]
  async fn stale_save_is_a_conflict() {
    let s = InMemoryStore::new();
    s.save_progress("u", 0, update(35, "quiz_submit", None)).await.unwrap();
    let err = s.save_progress("u", 0, update(70, "quiz_submit", None)).await.unwrap_err();
    assert_eq!(err, StoreError::Conflict("u".into()));
    assert_eq!(s.load_xp_state("u").await.unwrap().total_xp, 35);
    assert_eq!(s.xp_events("u", 10).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn history_is_newest_first_and_filterable() {
    let s = InMemoryStore::new();
    s.save_progress("u", 0, update(10, "a", Some(attempt("Cell Biology", 1, 2)))).await.unwrap();
    s.save_progress("u", 10, update(20, "b", Some(attempt("World History", 2, 2)))).await.unwrap();
    s.save_progress("u", 20, update(30, "c", Some(attempt("cell division", 0, 2)))).await.unwrap();

    let all = s.recent_attempts("u", 10, None).await.unwrap();
    assert_eq!(all.iter().map(|a| a.topic.as_str()).collect::<Vec<_>>(), ["cell division", "World History", "Cell Biology"]);
    let cells = s.recent_attempts("u", 10, Some("CELL")).await.unwrap();
    assert_eq!(cells.len(), 2);
    assert_eq!(s.recent_attempts("u", 1, None).await.unwrap().len(), 1);

    let events = s.xp_events("u", 2).await.unwrap();
    assert_eq!(events.iter().map(|e| e.action.as_str()).collect::<Vec<_>>(), ["c", "b"]);
  }

  #[tokio::test]
  async fn stats_average_per_attempt_percentages() {
    let s = InMemoryStore::new();
    s.save_progress("u", 0, update(10, "a", Some(attempt("t", 1, 3)))).await.unwrap();
    s.save_progress("u", 10, update(20, "b", Some(attempt("t", 5, 5)))).await.unwrap();
    let stats = s.stats("u").await.unwrap();
    assert_eq!(stats.attempts, 2);
    assert_eq!(stats.total_score, 6);
    assert_eq!(stats.total_questions, 8);
    assert_eq!(stats.avg_percent, 66.67);
  }

  #[tokio::test]
  async fn leaderboard_uses_competition_ranking() {
    let s = InMemoryStore::new();
    s.save_progress("ana", 0, update(200, "x", None)).await.unwrap();
    s.save_progress("ben", 0, update(500, "x", None)).await.unwrap();
    s.save_progress("cy", 0, update(200, "x", None)).await.unwrap();
    s.save_progress("dee", 0, update(50, "x", None)).await.unwrap();

    let board = s.leaderboard(10).await.unwrap();
    let view: Vec<(u32, &str)> = board.iter().map(|e| (e.rank, e.user_id.as_str())).collect();
    assert_eq!(view, [(1, "ben"), (2, "ana"), (2, "cy"), (4, "dee")]);
    assert_eq!(board[0].badge, Badge::Gold);
    assert_eq!(s.leaderboard(2).await.unwrap().len(), 2);
  }
}
