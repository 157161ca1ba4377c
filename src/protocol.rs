//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Engine, Quiz, XpState};
use crate::logic::{Award, Content, Generated, Submission};
use crate::xp::{LevelInfo, XpLedger};

//
// Generation
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateIn {
    pub user_id: String,
    pub mode: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub question_count: Option<u32>,
    /// Plain text already extracted from an uploaded document.
    #[serde(default)]
    pub document_text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOut {
    pub mode: &'static str,
    pub engine: Engine,
    pub engine_name: String,
    pub attempts: u32,
    pub regenerations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover_notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz: Option<QuizOut>,
    pub xp: AwardOut,
}

/// Quiz as shown to the learner: no correct answers until submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOut {
    pub quiz_id: String,
    pub questions: Vec<QuestionOut>,
}

#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub text: String,
    pub options: Vec<String>,
}

fn quiz_out(quiz_id: &str, quiz: &Quiz) -> QuizOut {
    QuizOut {
        quiz_id: quiz_id.to_string(),
        questions: quiz
            .questions()
            .iter()
            .map(|q| QuestionOut { text: q.text().to_string(), options: q.options().to_vec() })
            .collect(),
    }
}

impl From<Generated> for GenerateOut {
    fn from(g: Generated) -> Self {
        let (text, quiz) = match &g.content {
            Content::Text(t) => (Some(t.clone()), None),
            Content::Quiz { quiz_id, quiz } => (None, Some(quiz_out(quiz_id, quiz))),
        };
        GenerateOut {
            mode: g.request.mode.as_str(),
            engine: g.outcome.engine_used,
            engine_name: g.outcome.engine_name,
            attempts: g.outcome.attempts,
            regenerations: g.regenerations,
            failover_notice: g.outcome.failover_notice,
            text,
            quiz,
            xp: g.award.into(),
        }
    }
}

//
// Quiz submission
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIn {
    pub user_id: String,
    pub quiz_id: String,
    /// Question index -> chosen option index; unanswered questions are omitted.
    #[serde(default)]
    pub answers: BTreeMap<usize, usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOut {
    pub topic: String,
    pub correct_count: u32,
    pub total: u32,
    pub percentage: f64,
    pub per_question: Vec<bool>,
    pub correct_answers: Vec<usize>,
    pub xp: AwardOut,
}

impl From<Submission> for SubmitOut {
    fn from(s: Submission) -> Self {
        SubmitOut {
            topic: s.summary.topic,
            percentage: s.result.percentage(),
            correct_count: s.result.correct_count,
            total: s.result.total,
            per_question: s.result.per_question.iter().map(|o| o.is_correct).collect(),
            correct_answers: s.correct_answers,
            xp: s.award.into(),
        }
    }
}

//
// Progress
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardOut {
    pub points: u64,
    pub total_xp: u64,
    pub leveled_up: bool,
    pub level: LevelInfo,
}

impl From<Award> for AwardOut {
    fn from(a: Award) -> Self {
        AwardOut {
            points: a.points,
            total_xp: a.after.total_xp,
            leveled_up: a.leveled_up(),
            level: XpLedger::level_info(&a.after),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub user_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Topic substring filter.
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOut {
    pub attempts: u32,
    pub total_score: u64,
    pub total_questions: u64,
    pub avg_percent: f64,
    pub xp: XpState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventIn {
    pub user_id: String,
    /// Tagged by `kind`, e.g. `{"kind": "task_completed", "mode": "summarize"}`.
    pub event: serde_json::Value,
}

//
// Misc
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub engines: Vec<EngineHealth>,
}

#[derive(Serialize)]
pub struct EngineHealth {
    pub role: Engine,
    pub name: String,
    pub configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<&'static str>,
}
