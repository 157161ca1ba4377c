//! Small utility helpers used across modules.

use std::sync::LazyLock;

use regex::Regex;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// Values are inserted verbatim and never re-scanned, so user text containing
/// `{count}` cannot inject into a later placeholder.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  'scan: while let Some(start) = rest.find('{') {
    for (k, v) in pairs {
      let needle = format!("{{{}}}", k);
      if rest[start..].starts_with(&needle) {
        out.push_str(&rest[..start]);
        out.push_str(v);
        rest = &rest[start + needle.len()..];
        continue 'scan;
      }
    }
    out.push_str(&rest[..=start]);
    rest = &rest[start + 1..];
  }
  out.push_str(rest);
  out
}

/// Strip HTML tags and escape what is left so AI text is safe to render.
pub fn sanitize_text(text: &str) -> String {
  let stripped = HTML_TAG.replace_all(text, "");
  let mut out = String::with_capacity(stripped.len());
  for ch in stripped.trim().chars() {
    match ch {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      c => out.push(c),
    }
  }
  out
}

/// Log-safe preview for large strings.
/// Avoids spamming logs with huge prompts or completions.
pub fn trunc_for_log(s: &str, max_chars: usize) -> String {
  let total = s.chars().count();
  if total <= max_chars {
    s.to_string()
  } else {
    format!("{}… ({} chars total)", s.chars().take(max_chars).collect::<String>(), total)
  }
}
