//! Quiz extraction: turns loosely formatted AI text into validated questions.
//!
//! Grammar (line oriented, tolerant of markdown noise and blank lines):
//!
//! ```text
//! block    := header option{2,} answer*
//! header   := ("Q" | "Question") [n] delim stem  |  n ("." | ")") stem
//! option   := [bullet] ["("] letter (")" | "]" | "." | ":") text [mark]
//! answer   := ("Answer" | "Ans" | "Correct answer" | "Correct") (":" | "-" | "=" | "is") value
//! mark     := "(correct)" | "[correct]" | "✓" | "✔" | "✅" | "*"
//! ```
//!
//! `value` may be a letter ("B", "(b)", "B) Paris"), "Option B", or the exact option text.
//! When the text has no headers at all, blocks are separated by blank lines instead.
//!
//! A block is kept only with a non-empty stem, at least two distinct options, and exactly
//! one marked option. Anything else is rejected, never guessed.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::domain::{Question, Quiz};
use crate::error::{BlockRejection, ParseError};

static QUESTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)^(?:q(?:uestion)?\s*\d{0,3}\s*[.):\-]|q(?:uestion)?\s*\d{1,3}\s+|\d{1,3}\s*[.)])\s*(?P<stem>.*)$").unwrap()
});
static OPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)^(?:[-*•]\s*)?[(\[]?(?P<label>[a-h])(?:[)\]]\s*|[.:]\s+)(?P<text>.+)$").unwrap()
});
static ANSWER_LINE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)^(?:the\s+)?(?:correct\s+(?:answer|option)|answer|ans|correct)(?:\s*[:\-=]|\s+is\b:?)\s*(?P<value>.+)$").unwrap()
});
static CORRECT_MARK: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\s*(?:\((?:correct|right)\)|\[(?:correct|right)\]|[✓✔✅]|\*)\s*$").unwrap()
});
static LETTER_LIST: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)^\(?[a-h]\)?(?:\s*(?:,|/|&|\band\b)\s*\(?[a-h]\)?)*$").unwrap()
});
static LETTER_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b([a-h])\b").unwrap());
static LEADING_LETTER: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)^(?:(?:option|choice)\s+\(?(?P<a>[a-h])\)?\b|\(?(?P<b>[a-h])(?:[).:\]]|\s+-\s))").unwrap()
});
static HEADING_MARKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:#{1,6}\s*|>\s*)").unwrap());

#[derive(Debug, Default)]
struct RawBlock {
  stem: Vec<String>,
  options: Vec<RawOption>,
  answers: Vec<String>,
}

#[derive(Debug)]
struct RawOption {
  label: char,
  text: String,
  marked: bool,
}

impl RawBlock {
  fn has_body(&self) -> bool {
    !self.options.is_empty() || !self.answers.is_empty()
  }
}

/// Parse `raw_text` into at most `expected_count` questions, in text order.
/// Fewer than requested is fine; none at all is a `ParseError`.
#[instrument(level = "info", target = "quiz", skip(raw_text), fields(text_len = raw_text.len()))]
pub fn parse(raw_text: &str, expected_count: usize) -> Result<Quiz, ParseError> {
  let blocks = split_blocks(raw_text);
  let mut questions = Vec::new();
  let mut rejections = Vec::new();
  let mut blocks_seen = 0;

  for block in blocks {
    if questions.len() >= expected_count {
      break;
    }
    blocks_seen += 1;
    match validate_block(block) {
      Ok(q) => questions.push(q),
      Err(reason) => {
        debug!(target: "quiz", block = blocks_seen, ?reason, "Rejected quiz block");
        rejections.push(reason);
      }
    }
  }

  if questions.is_empty() {
    return Err(ParseError { blocks_seen, rejections });
  }
  debug!(target: "quiz", kept = questions.len(), rejected = rejections.len(), "Quiz extracted");
  Ok(Quiz::new(questions))
}

fn clean_line(line: &str) -> String {
  let line = line.trim().replace("**", "").replace("__", "");
  HEADING_MARKS.replace(line.trim(), "").trim().to_string()
}

fn is_noise(line: &str) -> bool {
  line.starts_with("```") || line.chars().all(|c| matches!(c, '-' | '=' | '*' | '_'))
}

fn is_explanation(line: &str) -> bool {
  let lower = line.to_ascii_lowercase();
  lower.starts_with("explanation") || lower.starts_with("reason")
}

fn split_blocks(raw_text: &str) -> Vec<RawBlock> {
  let lines: Vec<String> = raw_text.lines().map(clean_line).collect();
  let has_headers = lines.iter().any(|l| QUESTION_HEADER.is_match(l));

  let mut blocks = Vec::new();
  let mut current: Option<RawBlock> = None;

  for line in &lines {
    if line.is_empty() {
      if !has_headers {
        match current.take() {
          Some(block) if block.has_body() => blocks.push(block),
          // Prose with no options before the gap is an intro, not a question.
          Some(block) => debug!(target: "quiz", lines = block.stem.len(), "Dropped leading prose"),
          None => {}
        }
      }
      continue;
    }
    if is_noise(line) {
      continue;
    }

    if let Some(c) = QUESTION_HEADER.captures(line) {
      blocks.extend(current.take());
      let stem = c["stem"].trim();
      let mut block = RawBlock::default();
      if !stem.is_empty() {
        block.stem.push(stem.to_string());
      }
      current = Some(block);
      continue;
    }

    if let Some(c) = ANSWER_LINE.captures(line) {
      if let Some(block) = current.as_mut() {
        block.answers.push(c["value"].trim().to_string());
      }
      continue;
    }

    if let Some(c) = OPTION_LINE.captures(line) {
      let label = c["label"].chars().next().unwrap_or('a').to_ascii_lowercase();
      let text = &c["text"];
      let marked = CORRECT_MARK.is_match(text);
      let text = CORRECT_MARK.replace(text, "").trim().to_string();
      let block = current.get_or_insert_with(RawBlock::default);
      block.options.push(RawOption { label, text, marked });
      continue;
    }

    // Plain text: stem, wrapped option, explanation, or the start of an unnumbered question.
    match current.as_mut() {
      Some(block) if is_explanation(line) && block.has_body() => {}
      Some(block) if !block.has_body() => block.stem.push(line.clone()),
      Some(block) if block.answers.is_empty() => {
        if let Some(last) = block.options.last_mut() {
          last.text.push(' ');
          last.text.push_str(line);
        }
      }
      _ if has_headers => {}
      _ => {
        blocks.extend(current.take());
        current = Some(RawBlock { stem: vec![line.clone()], ..RawBlock::default() });
      }
    }
  }
  blocks.extend(current);
  blocks
}

fn normalize(s: &str) -> String {
  s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn validate_block(block: RawBlock) -> Result<Question, BlockRejection> {
  let stem = block.stem.join(" ").trim().to_string();
  if stem.is_empty() {
    return Err(BlockRejection::MissingStem);
  }

  // De-duplicate options; every label keeps pointing at its surviving option.
  let mut options: Vec<String> = Vec::new();
  let mut labels: Vec<(char, usize)> = Vec::new();
  let mut marks: BTreeSet<usize> = BTreeSet::new();
  for opt in block.options {
    if opt.text.is_empty() {
      continue;
    }
    let key = normalize(&opt.text);
    let idx = match options.iter().position(|o| normalize(o) == key) {
      Some(i) => i,
      None => {
        options.push(opt.text);
        options.len() - 1
      }
    };
    labels.push((opt.label, idx));
    if opt.marked {
      marks.insert(idx);
    }
  }

  if options.len() < 2 {
    return Err(BlockRejection::TooFewOptions(options.len()));
  }

  for value in &block.answers {
    for idx in resolve_answer(value, &labels, &options)? {
      marks.insert(idx);
    }
  }

  match marks.len() {
    0 => Err(BlockRejection::NoAnswerMarked),
    1 => {
      let correct = marks.into_iter().next().unwrap_or_default();
      Ok(Question::new(stem, options, correct))
    }
    n => Err(BlockRejection::MultipleAnswersMarked(n)),
  }
}

/// Map an answer value to option indices. An unresolvable value marks nothing.
fn resolve_answer(value: &str, labels: &[(char, usize)], options: &[String]) -> Result<Vec<usize>, BlockRejection> {
  let v = value.trim().trim_matches(|c: char| c == '*' || c == '"' || c == '\'' || c == '`').trim_end_matches('.').trim();

  let letters: Vec<char> = if LETTER_LIST.is_match(v) {
    LETTER_TOKEN.captures_iter(v).filter_map(|c| c[1].chars().next()).collect()
  } else if let Some(c) = LEADING_LETTER.captures(v) {
    c.name("a").or_else(|| c.name("b")).and_then(|m| m.as_str().chars().next()).into_iter().collect()
  } else {
    let key = normalize(v);
    return Ok(options.iter().position(|o| normalize(o) == key).into_iter().collect());
  };

  letters
    .into_iter()
    .map(|l| {
      let l = l.to_ascii_lowercase();
      labels
        .iter()
        .find(|(label, _)| *label == l)
        .map(|(_, idx)| *idx)
        .ok_or_else(|| BlockRejection::AnswerOutOfRange(value.to_string()))
    })
    .collect()
}
