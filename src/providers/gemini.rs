//! Google Gemini client (primary engine), `models/{model}:generateContent`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{classify_status, classify_transport, http_client, ProviderClient};
use crate::error::ProviderError;
use crate::util::trunc_for_log;

#[derive(Clone)]
pub struct Gemini {
  client: reqwest::Client,
  api_key: Option<String>,
  pub base_url: String,
  pub model: String,
}

impl Gemini {
  pub fn new(api_key: Option<String>, base_url: String, model: String) -> Self {
    Self { client: http_client(), api_key, base_url, model }
  }
}

#[async_trait]
impl ProviderClient for Gemini {
  fn name(&self) -> &str { "gemini" }

  fn display_name(&self) -> &str { "Gemini" }

  fn is_configured(&self) -> bool { self.api_key.is_some() }

  #[instrument(level = "info", target = "provider", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn call(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError> {
    let api_key = self
      .api_key
      .as_deref()
      .ok_or_else(|| ProviderError::AuthError("Gemini API key missing".into()))?;

    let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
    let req = GenerateRequest {
      contents: vec![Content { parts: vec![Part { text: prompt.to_string() }] }],
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .timeout(timeout)
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", api_key)
      .json(&req).send().await.map_err(|e| classify_transport(e, timeout))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_google_error(&body).unwrap_or(body);
      warn!(target: "provider", %status, elapsed = ?start.elapsed(), detail = %trunc_for_log(&msg, 200), "Gemini call failed");
      return Err(classify_status(status, msg));
    }

    let body: GenerateResponse = res.json().await.map_err(|e| classify_transport(e, timeout))?;
    let text = body.text();
    if text.is_empty() {
      return Err(ProviderError::TransientError("Gemini returned empty response".into()));
    }
    info!(target: "provider", elapsed = ?start.elapsed(), text_len = text.len(), "Gemini response received");
    Ok(text)
  }
}

#[derive(Serialize)]
struct GenerateRequest { contents: Vec<Content> }

#[derive(Serialize, Deserialize, Default)]
struct Content {
  #[serde(default)] parts: Vec<Part>,
}
#[derive(Serialize, Deserialize)]
struct Part {
  #[serde(default)] text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)] candidates: Vec<Candidate>,
}
#[derive(Deserialize)]
struct Candidate {
  #[serde(default)] content: Content,
}

impl GenerateResponse {
  /// Concatenated text parts of the first candidate.
  fn text(&self) -> String {
    self.candidates.first()
      .map(|c| c.content.parts.iter().map(|p| p.text.as_str()).collect::<String>())
      .unwrap_or_default()
      .trim()
      .to_string()
  }
}

fn extract_google_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String, #[serde(default)] status: Option<String> }
  serde_json::from_str::<EWrap>(body).ok().map(|w| match w.error.status {
    Some(s) => format!("{s}: {}", w.error.message),
    None => w.error.message,
  })
}
