//! Minimal OpenRouter client (backup engine).
//!
//! We only call chat.completions and request plain text.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{classify_status, classify_transport, http_client, ProviderClient};
use crate::error::ProviderError;
use crate::util::trunc_for_log;

#[derive(Clone)]
pub struct OpenRouter {
  client: reqwest::Client,
  api_key: Option<String>,
  pub base_url: String,
  pub model: String,
}

impl OpenRouter {
  pub fn new(api_key: Option<String>, base_url: String, model: String) -> Self {
    Self { client: http_client(), api_key, base_url, model }
  }
}

#[async_trait]
impl ProviderClient for OpenRouter {
  fn name(&self) -> &str { "openrouter" }

  fn display_name(&self) -> &str { "OpenRouter" }

  fn is_configured(&self) -> bool { self.api_key.is_some() }

  #[instrument(level = "info", target = "provider", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn call(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError> {
    let api_key = self
      .api_key
      .as_deref()
      .ok_or_else(|| ProviderError::AuthError("OpenRouter API key missing".into()))?;

    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![ChatMessageReq { role: "user".into(), content: prompt.into() }],
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .timeout(timeout)
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", api_key))
      .json(&req).send().await.map_err(|e| classify_transport(e, timeout))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      warn!(target: "provider", %status, elapsed = ?start.elapsed(), detail = %trunc_for_log(&msg, 200), "OpenRouter call failed");
      return Err(classify_status(status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| classify_transport(e, timeout))?;
    if let Some(usage) = &body.usage {
      info!(target: "provider", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenRouter usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();

    if text.is_empty() {
      return Err(ProviderError::TransientError("OpenRouter returned empty response".into()));
    }
    info!(target: "provider", elapsed = ?start.elapsed(), text_len = text.len(), "OpenRouter response received");
    Ok(text)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
