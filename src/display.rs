//! Plain-text rendering of each part of a `GenerationResult`.

use serde_json::Value;

use crate::models::{
    CANONICAL_SECTIONS, FULL_TEXT_KEY, Lyrics, Metadata, Phonetics, QaLog, value_text,
};

fn header_for(name: &str) -> String {
    CANONICAL_SECTIONS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, header)| header.to_string())
        .unwrap_or_else(|| name.replace(['_', '-'], " ").to_uppercase())
}

/// Sections in display order: `full_text` first, then the canonical song
/// order, then anything else in the order the model gave it. The header is
/// `None` for `full_text`.
pub fn ordered_sections(lyrics: &Lyrics) -> Vec<(Option<String>, &str)> {
    let mut out = Vec::with_capacity(lyrics.len());
    if let Some(text) = lyrics.full_text() {
        out.push((None, text));
    }
    for (key, _) in CANONICAL_SECTIONS {
        if let Some(text) = lyrics.get(key) {
            out.push((Some(header_for(key)), text));
        }
    }
    for (name, text) in lyrics.iter() {
        let known = name == FULL_TEXT_KEY || CANONICAL_SECTIONS.iter().any(|(k, _)| *k == name);
        if !known {
            out.push((Some(header_for(name)), text));
        }
    }
    out
}

pub fn format_lyrics(lyrics: &Lyrics) -> String {
    ordered_sections(lyrics)
        .into_iter()
        .map(|(header, text)| match header {
            Some(header) => format!("[{header}]\n{}", text.trim_end()),
            None => text.trim_end().to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn format_phonetics(phonetics: &Phonetics) -> String {
    let mut blocks = Vec::new();
    for phrase in &phonetics.difficult_phrases {
        let mut block = format!("Phrase: {}\nPhonetic: {}", phrase.phrase, phrase.phonetic_spelling);
        if let Some(note) = phrase.note.as_deref().filter(|n| !n.trim().is_empty()) {
            block.push_str(&format!("\nNote: {note}"));
        }
        blocks.push(block);
    }
    if let Some(notes) = phonetics.rhythm_notes.as_deref().filter(|n| !n.trim().is_empty()) {
        blocks.push(format!("Rhythm Notes:\n{notes}"));
    }
    blocks.join("\n\n")
}

pub fn format_qa_log(qa_log: &QaLog) -> String {
    let slang = (!qa_log.slang_used.is_empty()).then(|| qa_log.slang_used.join(", "));
    [
        ("Creative Choices", qa_log.creative_choices.as_ref()),
        ("Cultural References", qa_log.cultural_references.as_ref()),
        ("Slang Used", slang.as_ref()),
        ("Structure Notes", qa_log.structure_notes.as_ref()),
        ("Revision Notes", qa_log.revision_notes.as_ref()),
        ("Notes", qa_log.notes.as_ref()),
    ]
    .into_iter()
    .filter_map(|(label, value)| {
        value
            .filter(|v| !v.trim().is_empty())
            .map(|v| format!("{label}:\n{v}"))
    })
    .collect::<Vec<_>>()
    .join("\n\n")
}

fn scalar(value: &Value) -> String {
    value_text(value).unwrap_or_default()
}

pub fn format_metadata(metadata: &Metadata) -> String {
    let mut lines = Vec::new();
    let mut push = |label: &str, value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            lines.push(format!("{label}: {value}"));
        }
    };
    push("Total Lines", metadata.total_lines.map(|n| n.to_string()));
    push("Structure", metadata.structure.clone());
    push("Slang Density", metadata.slang_density.as_ref().map(scalar));
    push("Language", metadata.language.clone());
    push("Estimated Duration", metadata.estimated_duration.clone());
    push("Model Used", metadata.model_used.clone());
    push("Tokens Used", metadata.tokens_used.map(|n| n.to_string()));
    push("Format", metadata.format.clone());
    for (key, value) in &metadata.extra {
        push(key.as_str(), Some(scalar(value)));
    }
    lines.join("\n")
}
