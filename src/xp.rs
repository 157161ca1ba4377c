//! XP ledger: turns progression events into XP, then derives level and badge from the total.
//!
//! Level and badge are pure functions of `total_xp`; anything stored alongside is ignored.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::config::XpRules;
use crate::domain::{Badge, GradeResult, Mode, XpState};
use crate::error::InvalidEventError;

/// Ascending tier table: minimum total XP for each level, starting at level 1.
const TIERS: [(u64, Badge); 5] = [
  (0, Badge::Bronze),
  (150, Badge::Silver),
  (400, Badge::Gold),
  (800, Badge::Platinum),
  (1500, Badge::Legend),
];

const MOTIVATION_QUOTES: [&str; 5] = [
  "Small progress every day beats big plans someday.",
  "You are one focused session away from a breakthrough.",
  "Discipline creates confidence. Keep going.",
  "Learn deeply, not quickly. Depth wins.",
  "Consistency is your superpower.",
];

/// A random line of encouragement for progress views.
pub fn motivation() -> &'static str {
  let mut rng = rand::thread_rng();
  MOTIVATION_QUOTES.choose(&mut rng).copied().unwrap_or(MOTIVATION_QUOTES[0])
}

/// Something the user did that earns XP.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum XpEvent {
  /// Generated study content (explain, summarize, flashcards, quiz).
  TaskCompleted {
    mode: Mode,
    #[serde(default, alias = "withDocument")]
    with_document: bool,
  },
  /// Submitted a quiz.
  QuizCompleted {
    #[serde(alias = "correctCount")]
    correct_count: u32,
    total: u32,
  },
}

impl XpEvent {
  pub fn quiz(result: &GradeResult) -> Self {
    XpEvent::QuizCompleted { correct_count: result.correct_count, total: result.total }
  }

  /// Decode an event from its wire form. Unknown kinds are rejected.
  pub fn from_json(value: serde_json::Value) -> Result<Self, InvalidEventError> {
    serde_json::from_value(value).map_err(|e| InvalidEventError(e.to_string()))
  }

  /// Label recorded in the XP history.
  pub fn action(&self) -> String {
    match self {
      XpEvent::TaskCompleted { mode, with_document: true } => format!("task_{}_document", mode.as_str()),
      XpEvent::TaskCompleted { mode, .. } => format!("task_{}", mode.as_str()),
      XpEvent::QuizCompleted { .. } => "quiz_submit".into(),
    }
  }
}

/// Tier view for display: where the user stands and how far the next badge is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelInfo {
  pub level: u32,
  pub badge: Badge,
  pub icon: &'static str,
  pub next_threshold: Option<u64>,
  /// 0..=100 toward `next_threshold`; 100 at the top tier.
  pub progress: u8,
}

#[derive(Clone, Debug)]
pub struct XpLedger {
  rules: XpRules,
}

impl XpLedger {
  pub fn new(rules: XpRules) -> Self {
    Self { rules }
  }

  /// XP earned by `event`.
  pub fn delta(&self, event: &XpEvent) -> Result<u64, InvalidEventError> {
    match *event {
      XpEvent::TaskCompleted { mode, with_document } => {
        let base = match mode {
          Mode::Explain => self.rules.explain,
          Mode::Summarize => self.rules.summarize,
          Mode::Flashcards => self.rules.flashcards,
          Mode::Quiz => self.rules.quiz,
        };
        Ok(base.saturating_add(if with_document { self.rules.document_bonus } else { 0 }))
      }
      XpEvent::QuizCompleted { correct_count, total } => {
        if total == 0 || correct_count > total {
          return Err(InvalidEventError(format!("quiz result {correct_count}/{total} is not a valid score")));
        }
        let per_answer = u64::from(correct_count).saturating_mul(self.rules.per_correct_answer);
        Ok(self.rules.quiz_submit_base.saturating_add(per_answer))
      }
    }
  }

  /// New state after `event`. XP only ever grows.
  pub fn apply(&self, prior: &XpState, event: &XpEvent) -> Result<XpState, InvalidEventError> {
    let delta = self.delta(event)?;
    Ok(Self::state_for(prior.total_xp.saturating_add(delta)))
  }

  /// Level = number of tiers whose threshold is reached; badge = that tier's badge.
  pub fn state_for(total_xp: u64) -> XpState {
    let reached = TIERS.iter().take_while(|(threshold, _)| *threshold <= total_xp).count().max(1);
    XpState { total_xp, level: reached as u32, badge: TIERS[reached - 1].1 }
  }

  pub fn level_info(state: &XpState) -> LevelInfo {
    let idx = (state.level as usize).clamp(1, TIERS.len()) - 1;
    let current = TIERS[idx].0;
    let next_threshold = TIERS.get(idx + 1).map(|(t, _)| *t);
    let progress = match next_threshold {
      Some(next) => {
        let span = next.saturating_sub(current).max(1);
        ((state.total_xp.saturating_sub(current)) * 100 / span).min(100) as u8
      }
      None => 100,
    };
    LevelInfo { level: state.level, badge: state.badge, icon: state.badge.icon(), next_threshold, progress }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ledger() -> XpLedger {
    XpLedger::new(XpRules::default())
  }

  #[test]
  fn thresholds_map_to_levels_and_badges() {
    assert_eq!(XpLedger::state_for(0), XpState { total_xp: 0, level: 1, badge: Badge::Bronze });
    assert_eq!(XpLedger::state_for(149).badge, Badge::Bronze);
    assert_eq!(XpLedger::state_for(150), XpState { total_xp: 150, level: 2, badge: Badge::Silver });
    assert_eq!(XpLedger::state_for(400).badge, Badge::Gold);
    assert_eq!(XpLedger::state_for(799).level, 3);
    assert_eq!(XpLedger::state_for(1500).badge, Badge::Legend);
    assert_eq!(XpLedger::state_for(u64::MAX).level, 5);
  }

  #[test]
  fn quiz_xp_is_base_plus_per_correct() {
    let prior = XpLedger::state_for(130);
    let next = ledger().apply(&prior, &XpEvent::QuizCompleted { correct_count: 3, total: 5 }).unwrap();
    assert_eq!(next.total_xp, 130 + 20 + 15);
    assert_eq!(next.badge, Badge::Silver);
  }

  #[test]
  fn task_xp_includes_document_bonus() {
    let l = ledger();
    assert_eq!(l.delta(&XpEvent::TaskCompleted { mode: Mode::Explain, with_document: false }).unwrap(), 8);
    assert_eq!(l.delta(&XpEvent::TaskCompleted { mode: Mode::Flashcards, with_document: true }).unwrap(), 17);
  }

  #[test]
  fn xp_is_monotonic_over_event_sequences() {
    let l = ledger();
    let events = [
      XpEvent::TaskCompleted { mode: Mode::Quiz, with_document: false },
      XpEvent::QuizCompleted { correct_count: 0, total: 5 },
      XpEvent::TaskCompleted { mode: Mode::Summarize, with_document: true },
      XpEvent::QuizCompleted { correct_count: 5, total: 5 },
    ];
    let mut state = XpLedger::state_for(0);
    for e in events.iter().cycle().take(40) {
      let next = l.apply(&state, e).unwrap();
      assert!(next.total_xp >= state.total_xp);
      assert!(next.level >= state.level);
      state = next;
    }
  }

  #[test]
  fn huge_totals_saturate_instead_of_failing() {
    let next = ledger().apply(&XpLedger::state_for(u64::MAX - 1), &XpEvent::QuizCompleted { correct_count: 1, total: 1 }).unwrap();
    assert_eq!(next.total_xp, u64::MAX);
  }

  #[test]
  fn oversized_rules_saturate_the_delta() {
    let rules = XpRules {
      quiz: u64::MAX,
      document_bonus: u64::MAX,
      quiz_submit_base: u64::MAX,
      per_correct_answer: u64::MAX,
      ..XpRules::default()
    };
    let ledger = XpLedger::new(rules);
    let quiz = XpEvent::QuizCompleted { correct_count: 10, total: 10 };
    assert_eq!(ledger.delta(&quiz).unwrap(), u64::MAX);
    let task = XpEvent::TaskCompleted { mode: Mode::Quiz, with_document: true };
    assert_eq!(ledger.delta(&task).unwrap(), u64::MAX);
    assert_eq!(ledger.apply(&XpLedger::state_for(500), &quiz).unwrap().total_xp, u64::MAX);
  }

  #[test]
  fn camel_case_event_fields_are_accepted() {
    let ev = XpEvent::from_json(serde_json::json!({"kind": "quiz_completed", "correctCount": 3, "total": 4})).unwrap();
    assert_eq!(ev, XpEvent::QuizCompleted { correct_count: 3, total: 4 });
    let ev = XpEvent::from_json(serde_json::json!({"kind": "task_completed", "mode": "summarize", "withDocument": true})).unwrap();
    assert_eq!(ev, XpEvent::TaskCompleted { mode: Mode::Summarize, with_document: true });
  }

  #[test]
  fn inconsistent_or_unknown_events_are_rejected() {
    let prior = XpLedger::state_for(0);
    assert!(ledger().apply(&prior, &XpEvent::QuizCompleted { correct_count: 6, total: 5 }).is_err());
    assert!(ledger().apply(&prior, &XpEvent::QuizCompleted { correct_count: 0, total: 0 }).is_err());
    let err = XpEvent::from_json(serde_json::json!({"kind": "daily_login"})).unwrap_err();
    assert!(err.0.contains("daily_login"));
    let ok = XpEvent::from_json(serde_json::json!({"kind": "task_completed", "mode": "explain"})).unwrap();
    assert_eq!(ok, XpEvent::TaskCompleted { mode: Mode::Explain, with_document: false });
  }

  #[test]
  fn motivation_is_one_of_the_quotes() {
    assert!(MOTIVATION_QUOTES.contains(&motivation()));
  }

  #[test]
  fn level_info_reports_progress_to_next_tier() {
    let info = XpLedger::level_info(&XpLedger::state_for(275));
    assert_eq!(info.badge, Badge::Silver);
    assert_eq!(info.next_threshold, Some(400));
    assert_eq!(info.progress, 50);
    let top = XpLedger::level_info(&XpLedger::state_for(5000));
    assert_eq!(top.next_threshold, None);
    assert_eq!(top.progress, 100);
  }
}
