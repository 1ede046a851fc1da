//! Turns raw form values into a validated `GenerationRequest`.
//!
//! Everything here is pure: no I/O, no logging, no catalog lookups.

use serde::Deserialize;

use crate::error::{Result, SongwrightError};
use crate::models::{
    Energy, GenerationRequest, LyricsPart, SingerProfile, SlangDensity, SongLength,
};

/// Slang density as the UI sends it: a 0-10 score or a label.
#[derive(Debug, Clone, PartialEq, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum SlangInput {
    Score(f64),
    Label(String),
}

impl Default for SlangInput {
    fn default() -> Self {
        SlangInput::Label("Medium".to_string())
    }
}

/// Raw form values, exactly as collected from the UI.
#[derive(Debug, Clone, Default, Deserialize, schemars::JsonSchema)]
pub struct FormInput {
    #[schemars(description = "Music genre, e.g. 'Reggaeton'")]
    pub genre: String,

    #[schemars(description = "Thematic song type, e.g. 'Romantic'")]
    pub song_type: String,

    #[schemars(description = "Emotional atmosphere, e.g. 'Sensual'")]
    pub vibe: String,

    #[schemars(description = "Energy: Low, Medium-Low, Medium, Medium-High or High")]
    pub energy: String,

    #[schemars(description = "Primary lyric language, e.g. 'Spanish'")]
    pub language: String,

    #[schemars(description = "Slang density: Low/Medium/High or a score from 0 to 10")]
    #[serde(default)]
    pub slang_density: SlangInput,

    #[serde(default)]
    pub singer_gender: String,
    #[serde(default)]
    pub singer_nationality: String,
    #[serde(default)]
    pub singer_vocal_style: String,

    #[schemars(description = "Custom structure, e.g. '[verse 1] → [chorus] → [verse 2] → [chorus]'")]
    #[serde(default)]
    pub structure_override: String,

    #[serde(default)]
    pub include_chanteo: bool,
    #[serde(default)]
    pub include_bridge: bool,
    #[serde(default = "default_true")]
    pub include_phonetics: bool,

    #[schemars(description = "Part to generate, e.g. 'Full Song' or 'Chorus Only'")]
    #[serde(default)]
    pub lyrics_part: String,

    #[schemars(description = "Free-form creative direction: scenes, objects, emotions")]
    #[serde(default)]
    pub notes: String,

    #[schemars(description = "Short, Medium or Long")]
    #[serde(default)]
    pub length: String,

    #[schemars(description = "Comma-separated keywords to include")]
    #[serde(default)]
    pub keywords: String,

    #[schemars(description = "Comma-separated words the lyrics must not use")]
    #[serde(default)]
    pub forbidden_words: String,
}

fn default_true() -> bool {
    true
}

/// Splits a comma-separated list: tokens trimmed, blanks dropped, order and
/// duplicates kept.
pub fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolves the UI slang value. Labels pass through; scores are bucketed.
pub fn resolve_slang(input: &SlangInput) -> Result<SlangDensity> {
    match input {
        SlangInput::Score(score) => score_to_slang(*score),
        SlangInput::Label(label) => {
            let label = label.trim();
            if let Ok(density) = label.parse::<SlangDensity>() {
                return Ok(density);
            }
            if let Ok(score) = label.parse::<f64>() {
                return score_to_slang(score);
            }
            // UI labels carry their range, e.g. "High (7-10)".
            match label.split_whitespace().next() {
                Some(head) if head != label => head.parse::<SlangDensity>(),
                _ => label.parse::<SlangDensity>(),
            }
        }
    }
}

fn score_to_slang(score: f64) -> Result<SlangDensity> {
    SlangDensity::from_score(score).ok_or_else(|| {
        SongwrightError::validation(
            "slang_density",
            format!("score {score} is outside the 0-10 range"),
        )
    })
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SongwrightError::validation(field, "is required"));
    }
    Ok(value.to_string())
}

/// Builds the request for one user action.
pub fn build_request(form: &FormInput) -> Result<GenerationRequest> {
    let genre = required("genre", &form.genre)?;
    let song_type = required("song_type", &form.song_type)?;
    let vibe = required("vibe", &form.vibe)?;
    let energy: Energy = required("energy", &form.energy)?.parse()?;
    let language = required("language", &form.language)?;

    let singer = SingerProfile {
        gender: form.singer_gender.trim().to_string(),
        nationality: form.singer_nationality.trim().to_string(),
        vocal_style: form.singer_vocal_style.trim().to_string(),
    };
    let has_singer =
        !(singer.gender.is_empty() && singer.nationality.is_empty() && singer.vocal_style.is_empty());

    let structure_override = Some(form.structure_override.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(GenerationRequest {
        genre,
        song_type,
        vibe,
        energy,
        language,
        slang_density: resolve_slang(&form.slang_density)?,
        singer: has_singer.then_some(singer),
        structure_override,
        include_chanteo: form.include_chanteo,
        include_bridge: form.include_bridge,
        include_phonetics: form.include_phonetics,
        lyrics_part: form.lyrics_part.parse::<LyricsPart>()?,
        notes: form.notes.trim().to_string(),
        length: form.length.parse::<SongLength>()?,
        keywords: split_list(&form.keywords),
        forbidden_words: split_list(&form.forbidden_words),
    })
}

#[cfg(test)]
pub(crate) fn sample_form() -> FormInput {
    FormInput {
        genre: "Reggaeton".to_string(),
        song_type: "Romantic".to_string(),
        vibe: "Sensual".to_string(),
        energy: "High".to_string(),
        language: "Spanish".to_string(),
        slang_density: SlangInput::Label("Medium".to_string()),
        include_phonetics: true,
        ..FormInput::default()
    }
}
