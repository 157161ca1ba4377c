//! Application state: config, the provider orchestrator, XP ledger, progress store and
//! quizzes waiting for submission.
//!
//! Handed to every handler as axum `State`. Cloning is cheap; everything mutable sits
//! behind an `Arc`.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{load_app_config_from_env, AppConfig, ProviderEnv};
use crate::domain::{ProviderChoice, Quiz, QuizSummary};
use crate::orchestrator::{EngineSlot, ProviderOrchestrator};
use crate::providers::{Gemini, OpenRouter, ProviderClient};
use crate::retry::RetryPolicy;
use crate::store::{InMemoryStore, ProgressStore};
use crate::xp::XpLedger;

/// A generated quiz held server-side until its owner submits answers.
#[derive(Clone, Debug)]
pub struct PendingQuiz {
    pub user_id: String,
    pub quiz: Quiz,
    pub summary: QuizSummary,
    pub created_at: Instant,
    /// Stash order, used to evict a user's oldest quiz first.
    seq: u64,
}

impl PendingQuiz {
    pub fn new(user_id: &str, quiz: Quiz, summary: QuizSummary) -> Self {
        Self { user_id: user_id.to_string(), quiz, summary, created_at: Instant::now(), seq: 0 }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: ProviderOrchestrator,
    pub ledger: XpLedger,
    pub store: Arc<dyn ProgressStore>,
    pub pending: Arc<RwLock<HashMap<String, PendingQuiz>>>,
    pending_ttl: Duration,
    max_pending_per_user: usize,
    stash_seq: Arc<AtomicU64>,
}

impl AppState {
    /// Build state from env: load TOML config, wire both engines, start an empty store.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_app_config_from_env().unwrap_or_default();
        let env = ProviderEnv::from_env();

        let gemini = Gemini::new(env.gemini_api_key.clone(), env.gemini_base_url.clone(), env.gemini_model.clone());
        let openrouter = OpenRouter::new(
            env.openrouter_api_key.clone(),
            env.openrouter_base_url.clone(),
            env.openrouter_model.clone(),
        );

        for (role, client, model) in [
            ("primary", &gemini as &dyn ProviderClient, gemini.model.as_str()),
            ("backup", &openrouter as &dyn ProviderClient, openrouter.model.as_str()),
        ] {
            if client.is_configured() {
                info!(target: "study_buddy", role, engine = client.name(), model, "Engine enabled.");
            } else {
                warn!(target: "study_buddy", role, engine = client.name(), "Engine has no API key; every call will fail with an auth error.");
            }
        }

        Self::with_clients(
            config,
            Arc::new(gemini),
            Arc::new(openrouter),
            env.request_timeout,
            Arc::new(InMemoryStore::new()),
        )
    }

    /// Assemble state from explicit parts. Retry budgets come from `config.retry`.
    pub fn with_clients(
        config: AppConfig,
        primary: Arc<dyn ProviderClient>,
        backup: Arc<dyn ProviderClient>,
        request_timeout: Duration,
        store: Arc<dyn ProgressStore>,
    ) -> Self {
        let orchestrator = ProviderOrchestrator::new(
            EngineSlot { client: primary, policy: RetryPolicy::from(&config.retry.primary) },
            EngineSlot { client: backup, policy: RetryPolicy::from(&config.retry.backup) },
            request_timeout,
        );
        info!(
            target: "study_buddy",
            timeout = ?request_timeout,
            worst_case = ?orchestrator.worst_case_duration(ProviderChoice::Auto),
            "Provider orchestrator ready."
        );

        Self {
            ledger: XpLedger::new(config.xp.clone()),
            pending_ttl: Duration::from_secs(config.quiz.pending_ttl_secs),
            max_pending_per_user: config.quiz.max_pending_per_user.max(1),
            stash_seq: Arc::new(AtomicU64::new(0)),
            config: Arc::new(config),
            orchestrator,
            store,
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Keep a quiz for later grading; returns its id.
    /// Expired quizzes are swept first, and the user's oldest is evicted once they hit the cap.
    #[instrument(level = "debug", skip(self, quiz), fields(user_id = %quiz.user_id, questions = quiz.quiz.len()))]
    pub async fn stash_quiz(&self, mut quiz: PendingQuiz) -> String {
        quiz.seq = self.stash_seq.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending.write().await;

        let before = pending.len();
        pending.retain(|_, p| !p.is_expired(self.pending_ttl));
        if pending.len() < before {
            debug!(target: "quiz", expired = before - pending.len(), "Swept expired quizzes");
        }

        let mut owned: Vec<(u64, String)> = pending
            .iter()
            .filter(|(_, p)| p.user_id == quiz.user_id)
            .map(|(id, p)| (p.seq, id.clone()))
            .collect();
        if owned.len() >= self.max_pending_per_user {
            owned.sort();
            let excess = owned.len() + 1 - self.max_pending_per_user;
            for (_, id) in owned.into_iter().take(excess) {
                pending.remove(&id);
            }
            debug!(target: "quiz", evicted = excess, "User at pending quiz cap; evicted oldest");
        }

        let id = Uuid::new_v4().to_string();
        pending.insert(id.clone(), quiz);
        id
    }

    /// Remove and return a pending quiz. Only its owner may take it.
    #[instrument(level = "debug", skip(self), fields(%quiz_id, %user_id))]
    pub async fn take_quiz(&self, quiz_id: &str, user_id: &str) -> Option<PendingQuiz> {
        let mut pending = self.pending.write().await;
        let owned = pending.get(quiz_id).map(|p| (p.user_id == user_id, p.is_expired(self.pending_ttl)));
        match owned {
            Some((_, true)) => {
                pending.remove(quiz_id);
                info!(target: "quiz", %quiz_id, "Quiz expired before submission");
                None
            }
            Some((true, false)) => pending.remove(quiz_id),
            Some((false, false)) => {
                warn!(target: "quiz", %quiz_id, "Submission from a user who does not own this quiz");
                None
            }
            None => None,
        }
    }

    /// Put a taken quiz back (its submission could not be recorded). Its age is kept.
    pub async fn restore_quiz(&self, quiz_id: String, pending: PendingQuiz) {
        self.pending.write().await.insert(quiz_id, pending);
    }
}
