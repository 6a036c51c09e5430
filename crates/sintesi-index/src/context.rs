//! Text shaping around embeddings and prompt context.
//!
//! Embedding raw code alone loses where it lives. Prefixing the path and
//! construct label helps conceptual queries like "where is login handled?"
//! find the right unit. The prefix is only ever embedded; stored content and
//! reranking work on the raw chunk.

use std::fmt::Write;

use crate::chunker::Chunk;
use crate::store::SearchCandidate;

/// Text sent to the embedder for `chunk` of `path`.
#[must_use]
pub fn embedding_text(path: &str, chunk: &Chunk) -> String {
    let mut text = String::with_capacity(chunk.content.len() + path.len() + chunk.label.len() + 8);
    text.push_str("# ");
    text.push_str(path);
    text.push('\n');
    text.push_str("# ");
    text.push_str(&chunk.label);
    text.push_str("\n\n");
    text.push_str(&chunk.content);
    text
}

/// Rough token count: one token per four characters.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Keep the longest prefix of `candidates` whose content fits in
/// `max_tokens`. `None` keeps everything.
#[must_use]
pub fn apply_token_budget(
    candidates: Vec<SearchCandidate>,
    max_tokens: Option<usize>,
) -> Vec<SearchCandidate> {
    let Some(budget) = max_tokens else {
        return candidates;
    };
    let mut used = 0;
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let cost = estimate_tokens(&candidate.content);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(candidate);
    }
    kept
}

/// Render candidates as `<code_context>` XML for prompt injection.
///
/// An empty slice renders as an empty string.
#[must_use]
pub fn format_as_context(candidates: &[SearchCandidate]) -> String {
    if candidates.is_empty() {
        return String::new();
    }

    let mut out = String::from("<code_context>\n");
    for chunk in candidates {
        let file = chunk.file_path.as_deref().unwrap_or("");
        let lines = match (chunk.start_line, chunk.end_line) {
            (Some(start), Some(end)) => format!("{start}-{end}"),
            _ => String::new(),
        };
        let _ = writeln!(
            out,
            "  <chunk file=\"{}\" lines=\"{}\" label=\"{}\" score=\"{:.2}\">",
            escape_attr(file),
            lines,
            escape_attr(&chunk.label),
            chunk.score,
        );
        out.push_str(&chunk.content);
        out.push_str("\n  </chunk>\n");
    }
    out.push_str("</code_context>");
    out
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
