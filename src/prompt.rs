//! Prompt construction. Pure and deterministic: retries and failover resend the exact
//! same prompt to every engine.

use crate::config::Prompts;
use crate::domain::{Mode, Request};
use crate::error::InvalidRequestError;
use crate::util::fill_template;

pub struct PromptBuilder<'a> {
  prompts: &'a Prompts,
}

impl<'a> PromptBuilder<'a> {
  pub fn new(prompts: &'a Prompts) -> Self {
    Self { prompts }
  }

  pub fn build(&self, request: &Request) -> Result<String, InvalidRequestError> {
    request.validate()?;

    let template = match request.mode {
      Mode::Explain => &self.prompts.explain_template,
      Mode::Summarize => &self.prompts.summarize_template,
      Mode::Flashcards => &self.prompts.flashcards_template,
      Mode::Quiz => &self.prompts.quiz_template,
    };

    let topic = match &request.document_text {
      Some(doc) if request.topic_or_text.is_empty() => format!("{}\n{}", self.prompts.document_heading, doc),
      Some(doc) => format!("{}\n\n{}\n{}", request.topic_or_text, self.prompts.document_heading, doc),
      None => request.topic_or_text.clone(),
    };
    let count = request.question_count.to_string();

    Ok(
      fill_template(
        template,
        &[("difficulty", request.difficulty.label()), ("count", &count), ("topic", &topic)],
      )
      .trim()
      .to_string(),
    )
  }
}
