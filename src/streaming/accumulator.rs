//! Applying deltas to the in-flight assistant message.

use lazy_static::lazy_static;
use regex::Regex;

use super::frames::Delta;
use crate::conversation::Message;

lazy_static! {
    // Non-greedy, spans newlines. Either tag name, opened and closed consistently.
    static ref THINK_TAG_RE: Regex = Regex::new(
        r"(?s)<think>(.*?)</think>|<thinking>(.*?)</thinking>"
    ).expect("Failed to compile think tag regex");
}

const SECTION_SEPARATOR: &str = "\n\n";

/// Append a delta to `message`, reasoning first. Returns whether anything changed.
pub fn apply_delta(message: &mut Message, delta: &Delta) -> bool {
    let mut changed = false;
    if let Some(reasoning) = delta.reasoning.as_deref().filter(|s| !s.is_empty()) {
        message
            .reasoning
            .get_or_insert_with(String::new)
            .push_str(reasoning);
        changed = true;
    }
    if let Some(content) = delta.content.as_deref().filter(|s| !s.is_empty()) {
        message.content.push_str(content);
        changed = true;
    }
    changed
}

/// Move inline `<think>` spans out of the answer into the reasoning field.
///
/// Runs on the complete content only, since a tag can be split across chunks.
/// Stripping a span can join its neighbours into a new tag, so passes repeat
/// until no tag is left. A second call is then always a no-op.
pub fn finalize(message: &mut Message) -> bool {
    let mut changed = false;
    while THINK_TAG_RE.is_match(&message.content) {
        extract_spans(message);
        changed = true;
    }
    changed
}

/// One pass: append every matched span body to reasoning, then strip and trim.
fn extract_spans(message: &mut Message) {
    let extracted = THINK_TAG_RE
        .captures_iter(&message.content)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|body| body.as_str())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR);

    if !extracted.trim().is_empty() {
        match &mut message.reasoning {
            Some(existing) if !existing.is_empty() => {
                existing.push_str(SECTION_SEPARATOR);
                existing.push_str(&extracted);
            }
            reasoning => *reasoning = Some(extracted),
        }
    }

    let stripped = THINK_TAG_RE
        .replace_all(&message.content, "")
        .trim()
        .to_string();
    message.content = stripped;
}
