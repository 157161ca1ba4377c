//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; failures become JSON error bodies with a matching status.

use std::sync::Arc;
use axum::{
  extract::{Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, info, instrument, warn};

use crate::domain::{Engine, Request};
use crate::error::AppError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 10;
const DEFAULT_LEADERBOARD_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;
const PROGRESS_EVENTS: usize = 20;

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let (status, error, retry, message) = match &self {
      AppError::InvalidRequest(e) => (StatusCode::BAD_REQUEST, "invalid_request", None, e.to_string()),
      AppError::UnknownQuiz(_) => (StatusCode::NOT_FOUND, "unknown_quiz", None, self.to_string()),
      AppError::Parse(e) => (
        StatusCode::UNPROCESSABLE_ENTITY,
        "quiz_unusable",
        Some("regenerate"),
        format!("The AI answer did not contain a usable quiz ({e}). Please generate again."),
      ),
      AppError::AllProvidersFailed(e) => {
        warn!(target: "study_buddy", error = %e, "Reporting provider outage to caller");
        (
          StatusCode::SERVICE_UNAVAILABLE,
          "providers_unavailable",
          None,
          "AI service temporarily unavailable. Please try again in a moment.".to_string(),
        )
      }
      AppError::InvalidEvent(e) => {
        error!(target: "study_buddy", error = %e, "Invalid progression event reached the API");
        (StatusCode::INTERNAL_SERVER_ERROR, "invalid_event", None, e.to_string())
      }
      AppError::Store(e) => {
        error!(target: "study_buddy", error = %e, "Progress store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, "store_failure", None, "Progress could not be saved.".to_string())
      }
    };
    (status, Json(ErrorOut { error, message, retry })).into_response()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let engines = [Engine::Primary, Engine::Backup]
    .into_iter()
    .map(|role| {
      let client = &state.orchestrator.slot(role).client;
      EngineHealth { role, name: client.name().to_string(), configured: client.is_configured() }
    })
    .collect();
  Json(HealthOut { ok: true, engines })
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, mode = %body.mode, topic_len = body.topic.len()))]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Result<Json<GenerateOut>, AppError> {
  let request = Request::parse(
    &body.mode,
    body.provider.as_deref(),
    &body.topic,
    body.difficulty.as_deref(),
    body.question_count,
    body.document_text,
  )?;
  let generated = logic::generate(&state, &body.user_id, request).await?;
  info!(target: "study_buddy", engine = %generated.outcome.engine_name, failover = generated.outcome.failover_notice.is_some(), "HTTP generate served");
  Ok(Json(generated.into()))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, quiz_id = %body.quiz_id))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SubmitIn>,
) -> Result<Json<SubmitOut>, AppError> {
  let submission = logic::submit_quiz(&state, &body.user_id, &body.quiz_id, &body.answers).await?;
  Ok(Json(submission.into()))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id))]
pub async fn http_get_progress(
  State(state): State<Arc<AppState>>,
  Query(q): Query<UserQuery>,
) -> Result<Json<logic::Progress>, AppError> {
  Ok(Json(logic::progress(&state, &q.user_id, PROGRESS_EVENTS).await?))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id))]
pub async fn http_post_event(
  State(state): State<Arc<AppState>>,
  Json(body): Json<EventIn>,
) -> Result<Json<AwardOut>, AppError> {
  let award = logic::record_event(&state, &body.user_id, body.event).await?;
  Ok(Json(award.into()))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id))]
pub async fn http_get_history(
  State(state): State<Arc<AppState>>,
  Query(q): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
  let limit = q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_LIST_LIMIT);
  let rows = logic::history(&state, &q.user_id, limit, q.q.as_deref()).await?;
  Ok(Json(rows))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id))]
pub async fn http_get_stats(
  State(state): State<Arc<AppState>>,
  Query(q): Query<UserQuery>,
) -> Result<Json<StatsOut>, AppError> {
  let (stats, xp) = logic::stats(&state, &q.user_id).await?;
  Ok(Json(StatsOut {
    attempts: stats.attempts,
    total_score: stats.total_score,
    total_questions: stats.total_questions,
    avg_percent: stats.avg_percent,
    xp,
  }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_leaderboard(
  State(state): State<Arc<AppState>>,
  Query(q): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, AppError> {
  let limit = q.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT).clamp(1, MAX_LIST_LIMIT);
  Ok(Json(logic::leaderboard(&state, limit).await?))
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request as HttpRequest, StatusCode},
    Router,
  };
  use serde_json::{json, Value};
  use tower::ServiceExt;

  use super::*;
  use crate::config::AppConfig;
  use crate::error::ProviderError;
  use crate::retry::tests::ScriptedClient;
  use crate::routes::build_router;
  use crate::state::tests::scripted_state;

  const QUIZ_TEXT: &str = "Q1. Largest planet?\nA) Mars\nB) Jupiter\nC) Venus\nD) Earth\nAnswer: B";

  fn app(primary: Vec<Result<String, ProviderError>>, backup: Vec<Result<String, ProviderError>>) -> Router {
    let state = scripted_state(
      Arc::new(ScriptedClient::new("gemini", primary)),
      Arc::new(ScriptedClient::new("openrouter", backup)),
      AppConfig::default(),
    );
    build_router(Arc::new(state))
  }

  async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = HttpRequest::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        req = req.header("content-type", "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let response = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
  }

  #[tokio::test]
  async fn health_lists_both_engines() {
    let app = app(vec![], vec![]);
    let (status, body) = call(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["engines"][0]["role"], "primary");
    assert_eq!(body["engines"][1]["name"], "openrouter");
  }

  #[tokio::test]
  async fn quiz_generate_hides_answers_then_submit_grades() {
    let app = app(vec![Ok(QUIZ_TEXT.into())], vec![]);
    let (status, body) = call(
      &app,
      "POST",
      "/api/v1/generate",
      Some(json!({"userId": "u1", "mode": "quiz", "topic": "Planets", "questionCount": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["engineName"], "gemini");
    assert_eq!(body["xp"]["points"], 15);
    let quiz = &body["quiz"];
    assert_eq!(quiz["questions"][0]["options"][1], "Jupiter");
    assert!(quiz["questions"][0].get("correct_index").is_none());
    let quiz_id = quiz["quizId"].as_str().unwrap().to_string();

    let submit = json!({"userId": "u1", "quizId": quiz_id, "answers": {"0": 1}});
    let (status, body) = call(&app, "POST", "/api/v1/quiz/submit", Some(submit.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["correctCount"], 1);
    assert_eq!(body["percentage"], 100.0);
    assert_eq!(body["xp"]["points"], 25);
    assert_eq!(body["xp"]["totalXp"], 40);

    let (status, body) = call(&app, "POST", "/api/v1/quiz/submit", Some(submit)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_quiz");

    let (_, history) = call(&app, "GET", "/api/v1/history?userId=u1&q=planet", None).await;
    assert_eq!(history.as_array().map(Vec::len), Some(1));
    let (_, stats) = call(&app, "GET", "/api/v1/stats?userId=u1", None).await;
    assert_eq!(stats["attempts"], 1);
    assert_eq!(stats["avgPercent"], 100.0);
  }

  #[tokio::test]
  async fn invalid_request_is_400_before_any_call() {
    let app = app(vec![], vec![]);
    let (status, body) = call(
      &app,
      "POST",
      "/api/v1/generate",
      Some(json!({"userId": "u1", "mode": "quiz", "topic": "x", "questionCount": 99})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
  }

  #[tokio::test]
  async fn outage_is_503_with_fallback_message() {
    let app = app(vec![Err(ProviderError::AuthError("401".into()))], vec![Err(ProviderError::QuotaExceeded("429".into()))]);
    let (status, body) = call(&app, "POST", "/api/v1/generate", Some(json!({"userId": "u1", "mode": "explain", "topic": "x"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "providers_unavailable");
    assert!(body["message"].as_str().unwrap().contains("temporarily unavailable"));
  }

  #[tokio::test]
  async fn unusable_quiz_is_422_with_regenerate_hint() {
    let app = app(vec![Ok("nothing useful".into())], vec![Ok("still nothing".into())]);
    let (status, body) = call(&app, "POST", "/api/v1/generate", Some(json!({"userId": "u1", "mode": "quiz", "topic": "x"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["retry"], "regenerate");
  }

  #[tokio::test]
  async fn failover_notice_reaches_the_caller() {
    let app = app(vec![Err(ProviderError::QuotaExceeded("429".into()))], vec![Ok("Backup text".into())]);
    let (status, body) = call(&app, "POST", "/api/v1/generate", Some(json!({"userId": "u1", "mode": "summarize", "topic": "x"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["engine"], "backup");
    assert_eq!(body["text"], "Backup text");
    assert_eq!(body["failoverNotice"], "gemini unavailable. Switched to openrouter backup.");
  }

  #[tokio::test]
  async fn events_and_leaderboard() {
    let app = app(vec![], vec![]);
    let ok = json!({"userId": "a", "event": {"kind": "quiz_completed", "correct_count": 2, "total": 2}});
    let (status, body) = call(&app, "POST", "/api/v1/progress/events", Some(ok)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["points"], 30);

    let bad = json!({"userId": "a", "event": {"kind": "streak_bonus"}});
    let (status, body) = call(&app, "POST", "/api/v1/progress/events", Some(bad)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "invalid_event");

    let (_, board) = call(&app, "GET", "/api/v1/leaderboard", None).await;
    assert_eq!(board[0]["userId"], "a");
    assert_eq!(board[0]["totalXp"], 30);
    assert_eq!(board[0]["rank"], 1);

    let (_, progress) = call(&app, "GET", "/api/v1/progress?userId=a", None).await;
    assert_eq!(progress["xp"]["totalXp"], 30);
    assert_eq!(progress["level"]["badge"], "Bronze");
    assert_eq!(progress["level"]["nextThreshold"], 150);
    assert_eq!(progress["recentEvents"][0]["action"], "quiz_submit");
  }

  /// Object keys anywhere in `v` are camelCase.
  fn assert_camel_keys(v: &Value) {
    match v {
      Value::Object(map) => {
        for (k, inner) in map {
          assert!(!k.contains('_'), "snake_case key {k:?} in {v}");
          assert_camel_keys(inner);
        }
      }
      Value::Array(items) => items.iter().for_each(assert_camel_keys),
      _ => {}
    }
  }

  #[tokio::test]
  async fn read_endpoints_use_camel_case_keys() {
    let app = app(vec![Ok(QUIZ_TEXT.into())], vec![]);
    let (_, body) = call(
      &app,
      "POST",
      "/api/v1/generate",
      Some(json!({"userId": "u1", "mode": "quiz", "topic": "Planets", "questionCount": 1})),
    )
    .await;
    assert_camel_keys(&body);
    let quiz_id = body["quiz"]["quizId"].as_str().unwrap().to_string();
    let (_, body) = call(&app, "POST", "/api/v1/quiz/submit", Some(json!({"userId": "u1", "quizId": quiz_id, "answers": {"0": 1}}))).await;
    assert_camel_keys(&body);

    let (_, history) = call(&app, "GET", "/api/v1/history?userId=u1", None).await;
    assert_eq!(history[0]["correctCount"], 1);
    assert!(history[0]["recordedAt"].is_u64());
    for uri in ["/api/v1/history?userId=u1", "/api/v1/stats?userId=u1", "/api/v1/progress?userId=u1", "/api/v1/leaderboard"] {
      let (status, body) = call(&app, "GET", uri, None).await;
      assert_eq!(status, StatusCode::OK, "{uri}");
      assert_camel_keys(&body);
    }
  }
}
