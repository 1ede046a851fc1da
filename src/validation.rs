//! Post-parse review and metadata enrichment.
//!
//! Review never rejects a result: it lists what the user should know about
//! it. Enrichment only fills what the model left out, apart from the model
//! name and token count which always come from the adapter.

use crate::catalog::parse_structure;
use crate::models::{Energy, GenerationRequest, GenerationResult, LyricsPart};
use crate::prompt::structure_for;

/// Seconds of song per lyric line at each energy level.
pub fn seconds_per_line(energy: Energy) -> f64 {
    match energy {
        Energy::Low => 6.0,
        Energy::MediumLow => 5.0,
        Energy::Medium => 4.0,
        Energy::MediumHigh => 3.5,
        Energy::High => 3.0,
    }
}

/// Rough song length as `m:ss`. Partial seconds are dropped.
pub fn estimate_duration(lines: usize, energy: Energy) -> String {
    let total = (lines as f64 * seconds_per_line(energy)).trunc() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Lyrics keys a structure label may be written under. "verse 2 / chanteo"
/// is satisfied by either section.
fn section_keys(label: &str) -> Vec<String> {
    label
        .split('/')
        .map(|part| {
            part.trim()
                .to_lowercase()
                .split(|c: char| c.is_whitespace() || c == '-')
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("_")
        })
        .filter(|key| !key.is_empty())
        .collect()
}

fn has_section(result: &GenerationResult, key: &str) -> bool {
    let present = |k: &str| {
        result
            .lyrics
            .get(k)
            .is_some_and(|text| !text.trim().is_empty())
    };
    present(key) || (key == "chorus" && present("chorus_repeat"))
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whole-word, case-insensitive match. Multi-word terms match as a phrase.
fn mentions(lower_text: &str, words: &[String], term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return false;
    }
    if term.contains(char::is_whitespace) {
        lower_text.contains(&term)
    } else {
        words.iter().any(|w| *w == term)
    }
}

pub struct ResponseValidator;

impl ResponseValidator {
    /// Human-readable warnings about `result` relative to `request`.
    pub fn review(request: &GenerationRequest, result: &GenerationResult) -> Vec<String> {
        let mut warnings = Vec::new();

        if result.is_degraded() {
            warnings.push(
                "The model did not return structured JSON; showing its raw text".to_string(),
            );
        }
        if !result.lyrics.has_content() {
            warnings.push("No lyrics were returned".to_string());
            return warnings;
        }

        if !result.is_degraded() && request.lyrics_part == LyricsPart::FullSong {
            if !has_section(result, "verse_1") && result.lyrics.full_text().is_none() {
                warnings.push("Lyrics are missing the first verse".to_string());
            }
            if !has_section(result, "chorus") && result.lyrics.full_text().is_none() {
                warnings.push("Lyrics are missing a chorus".to_string());
            }

            if result.lyrics.full_text().is_none() {
                let mut missing: Vec<String> = Vec::new();
                for label in parse_structure(structure_for(request)) {
                    let keys = section_keys(&label);
                    if !keys.is_empty()
                        && !keys.iter().any(|k| has_section(result, k))
                        && !missing.contains(&label)
                    {
                        missing.push(label);
                    }
                }
                if !missing.is_empty() {
                    warnings.push(format!(
                        "Requested structure sections missing: {}",
                        missing.join(", ")
                    ));
                }
            }
        }

        if request.include_phonetics && result.phonetics.is_empty() && !result.is_degraded() {
            warnings.push("Phonetic guidance was requested but not provided".to_string());
        }

        let text = result.lyrics.joined().to_lowercase();
        let words = tokens(&text);

        let forbidden: Vec<&str> = request
            .forbidden_words
            .iter()
            .filter(|w| mentions(&text, &words, w))
            .map(String::as_str)
            .collect();
        if !forbidden.is_empty() {
            warnings.push(format!("Forbidden words used: {}", forbidden.join(", ")));
        }

        let absent: Vec<&str> = request
            .keywords
            .iter()
            .filter(|w| !mentions(&text, &words, w))
            .map(String::as_str)
            .collect();
        if !absent.is_empty() {
            warnings.push(format!("Keywords not used: {}", absent.join(", ")));
        }

        warnings
    }
}

/// Stamps adapter facts and fills gaps the model left in `metadata`.
pub fn enrich(
    result: &mut GenerationResult,
    request: &GenerationRequest,
    model: &str,
    tokens_used: Option<u64>,
) {
    let metadata = &mut result.metadata;
    metadata.model_used = Some(model.to_string());
    if tokens_used.is_some() {
        metadata.tokens_used = tokens_used;
    }

    let lines = result.lyrics.line_count();
    if metadata.total_lines.is_none() && lines > 0 {
        metadata.total_lines = Some(lines as u64);
    }
    let blank = |field: &Option<String>| field.as_deref().is_none_or(|v| v.trim().is_empty());
    if blank(&metadata.language) {
        metadata.language = Some(request.language.clone());
    }
    if blank(&metadata.estimated_duration) && lines > 0 {
        let counted = metadata.total_lines.map_or(lines, |n| n as usize);
        metadata.estimated_duration = Some(estimate_duration(counted, request.energy));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Lyrics, Phonetics};
    use crate::parser::{fallback, parse};
    use crate::payload::{build_request, sample_form};

    fn result_with(sections: &[(&str, &str)]) -> GenerationResult {
        let mut lyrics = Lyrics::new();
        for (name, text) in sections {
            lyrics.insert(*name, *text);
        }
        GenerationResult {
            lyrics,
            ..GenerationResult::default()
        }
    }

    #[test]
    fn test_estimate_duration() {
        assert_eq!(estimate_duration(40, Energy::Medium), "2:40");
        assert_eq!(estimate_duration(40, Energy::High), "2:00");
        assert_eq!(estimate_duration(3, Energy::MediumHigh), "0:10");
        assert_eq!(estimate_duration(7, Energy::MediumHigh), "0:24");
        assert_eq!(estimate_duration(0, Energy::Low), "0:00");
    }

    #[test]
    fn test_section_keys() {
        assert_eq!(section_keys("verse 1"), vec!["verse_1"]);
        assert_eq!(section_keys("Pre-Chorus"), vec!["pre_chorus"]);
        assert_eq!(section_keys("verse 2 / chanteo"), vec!["verse_2", "chanteo"]);
    }

    #[test]
    fn test_complete_result_has_no_warnings() {
        let mut form = sample_form();
        form.include_phonetics = false;
        form.structure_override = "[verse 1] → [chorus] → [verse 2 / chanteo]".to_string();
        let request = build_request(&form).unwrap();
        let result = result_with(&[("verse_1", "a"), ("chorus", "b"), ("chanteo", "c")]);
        assert!(ResponseValidator::review(&request, &result).is_empty());
    }

    #[test]
    fn test_missing_sections_reported() {
        let request = build_request(&sample_form()).unwrap();
        let result = result_with(&[("verse_1", "a"), ("verse_2", "b")]);
        let warnings = ResponseValidator::review(&request, &result);
        assert!(warnings.contains(&"Lyrics are missing a chorus".to_string()));
        assert!(
            warnings
                .iter()
                .any(|w| w.starts_with("Requested structure sections missing: chorus, pre-chorus"))
        );
        assert!(warnings.iter().any(|w| w.contains("Phonetic guidance")));
    }

    #[test]
    fn test_degraded_and_empty_results() {
        let request = build_request(&sample_form()).unwrap();
        let warnings = ResponseValidator::review(&request, &fallback("la la la"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("structured JSON"));

        let warnings = ResponseValidator::review(&request, &parse("{\"lyrics\": {}}"));
        assert_eq!(warnings, vec!["No lyrics were returned".to_string()]);
    }

    #[test]
    fn test_forbidden_and_keywords() {
        let mut form = sample_form();
        form.include_phonetics = false;
        form.lyrics_part = "Chorus Only".to_string();
        form.forbidden_words = "amor, corazón".to_string();
        form.keywords = "playa, luna llena".to_string();
        let request = build_request(&form).unwrap();
        let result = result_with(&[("chorus", "Mi Amor en la playa\nbajo la luna llena")]);
        let warnings = ResponseValidator::review(&request, &result);
        assert_eq!(warnings, vec!["Forbidden words used: amor".to_string()]);

        let result = result_with(&[("chorus", "enamorado")]);
        let warnings = ResponseValidator::review(&request, &result);
        assert_eq!(warnings, vec!["Keywords not used: playa, luna llena".to_string()]);
    }

    #[test]
    fn test_enrich_fills_only_gaps() {
        let request = build_request(&sample_form()).unwrap();
        let mut result = result_with(&[("verse_1", "uno\ndos\n\ntres"), ("chorus", "cuatro")]);
        result.metadata.language = Some("Spanglish".to_string());
        result.metadata.model_used = Some("made-up".to_string());
        enrich(&mut result, &request, "gpt-4o", Some(900));

        assert_eq!(result.metadata.model_used.as_deref(), Some("gpt-4o"));
        assert_eq!(result.metadata.tokens_used, Some(900));
        assert_eq!(result.metadata.total_lines, Some(4));
        assert_eq!(result.metadata.language.as_deref(), Some("Spanglish"));
        assert_eq!(result.metadata.estimated_duration.as_deref(), Some("0:12"));
        assert_eq!(result.phonetics, Phonetics::default());
    }

    #[test]
    fn test_enrich_replaces_blank_metadata() {
        let request = build_request(&sample_form()).unwrap();
        let mut result = result_with(&[("verse_1", "uno\ndos")]);
        result.metadata.language = Some(" ".to_string());
        result.metadata.estimated_duration = Some(String::new());
        enrich(&mut result, &request, "gpt-4o", None);
        assert_eq!(result.metadata.language.as_deref(), Some("Spanish"));
        assert_eq!(result.metadata.estimated_duration.as_deref(), Some("0:06"));
    }

    #[test]
    fn test_blank_phonetics_count_as_missing() {
        let request = build_request(&sample_form()).unwrap();
        let mut result = result_with(&[("verse_1", "uno"), ("chorus", "dos")]);
        result.phonetics.rhythm_notes = Some("  ".to_string());
        let warnings = ResponseValidator::review(&request, &result);
        assert!(warnings.contains(&"Phonetic guidance was requested but not provided".to_string()));
    }
}
