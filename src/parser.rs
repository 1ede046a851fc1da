//! Best-effort decoding of model output into a `GenerationResult`.
//!
//! `parse` never fails. Clean JSON, fenced JSON and JSON buried in prose are
//! all recovered; anything else is wrapped as plain text so there is always
//! something to show.

use serde_json::{Map, Value};

use crate::models::{GenerationResult, Lyrics, Metadata, Phonetics, QaLog};

/// `qa_log.notes` written by the plain-text fallback.
pub const UNSTRUCTURED_NOTE: &str = "unstructured response";

/// Removes surrounding markdown code fences (```` ``` ```` or ```` ```json ````),
/// layer by layer until none is left.
///
/// Text that neither starts nor ends with a fence is returned untouched, so
/// the result is always a fixed point.
pub fn strip_code_fences(text: &str) -> &str {
    let mut current = text;
    loop {
        let next = strip_fence_layer(current);
        if next.len() == current.len() {
            return current;
        }
        current = next;
    }
}

fn strip_fence_layer(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") && !trimmed.ends_with("```") {
        return text;
    }
    let mut s = trimmed;
    if let Some(rest) = s.strip_prefix("```") {
        let tagged = rest
            .get(..4)
            .is_some_and(|tag| tag.eq_ignore_ascii_case("json"));
        s = if tagged { &rest[4..] } else { rest };
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn decode_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Every balanced `{...}` span in `text`, ordered by opening position so an
/// enclosing object is always tried before the objects nested inside it.
///
/// Braces inside JSON string literals are ignored, so `"a } b"` does not
/// close an object early.
pub fn json_candidates(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    // Opening positions of objects not yet closed.
    let mut open: Vec<usize> = Vec::new();
    let mut in_str = false;
    let mut escape = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_str {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_str = false;
            }
            continue;
        }
        match b {
            // Quotes only matter once we are inside a candidate object.
            b'"' if !open.is_empty() => in_str = true,
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }

    spans.sort_by_key(|(start, _)| *start);
    spans
        .into_iter()
        .filter_map(|(start, end)| text.get(start..=end))
        .collect()
}

/// The result produced when no JSON object can be recovered.
pub fn fallback(raw: &str) -> GenerationResult {
    GenerationResult {
        lyrics: Lyrics::from_text(raw),
        phonetics: Phonetics::default(),
        qa_log: QaLog::from_notes(UNSTRUCTURED_NOTE),
        metadata: Metadata::plain_text(),
    }
}

/// Parses raw model output. Total: every input yields a result.
pub fn parse(raw: &str) -> GenerationResult {
    let body = strip_code_fences(raw);

    if let Some(map) = decode_object(body) {
        return GenerationResult::from_map(&map);
    }

    for candidate in json_candidates(body) {
        if let Some(map) = decode_object(candidate) {
            tracing::debug!(
                candidate_len = candidate.len(),
                raw_len = raw.len(),
                "Recovered JSON object embedded in model output"
            );
            return GenerationResult::from_map(&map);
        }
    }

    tracing::warn!(
        raw_len = raw.len(),
        "Model output contained no decodable JSON object; using plain-text fallback"
    );
    fallback(raw)
}
