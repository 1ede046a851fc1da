//! Downloadable renderings of a generation: a readable text sheet and a JSON
//! envelope. Everything is pure except `write_export`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::display::{format_lyrics, format_metadata, format_phonetics, format_qa_log};
use crate::error::{Result, SongwrightError};
use crate::models::{GenerationRequest, GenerationResult};
use crate::prompt::structure_for;

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Text,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Json => "json",
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    version: &'static str,
    generated_at: String,
    request: &'a GenerationRequest,
    result: &'a GenerationResult,
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

fn block(out: &mut Vec<String>, title: &str, body: String) {
    out.push(RULE.to_string());
    out.push(format!("{title}:"));
    out.push(THIN_RULE.to_string());
    out.push(body);
    out.push(String::new());
}

/// The text sheet: parameters, lyrics, phonetics (when requested and
/// present), QA log and metadata.
pub fn render_text(
    request: &GenerationRequest,
    result: &GenerationResult,
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = vec![
        RULE.to_string(),
        "SONGWRIGHT LYRICS".to_string(),
        RULE.to_string(),
        String::new(),
        format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
        String::new(),
    ];

    let mut params = vec![
        format!("Genre: {}", request.genre),
        format!("Type: {}", request.song_type),
        format!("Vibe: {}", request.vibe),
        format!("Energy: {}", request.energy),
        format!("Language: {}", request.language),
        format!("Slang Density: {}", request.slang_density),
    ];
    if let Some(singer) = &request.singer {
        let parts: Vec<&str> = [&singer.gender, &singer.nationality, &singer.vocal_style]
            .into_iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        params.push(format!("Singer: {}", parts.join(" - ")));
    }
    params.push(format!("Structure: {}", structure_for(request)));
    params.push(format!("Lyrics Part: {}", request.lyrics_part));
    params.push(format!("Include Chanteo: {}", yes_no(request.include_chanteo)));
    params.push(format!("Include Bridge: {}", yes_no(request.include_bridge)));
    params.push(format!("Include Phonetics: {}", yes_no(request.include_phonetics)));
    if !request.notes.is_empty() {
        params.push(format!("Notes: {}", request.notes));
    }
    block(&mut out, "PARAMETERS", params.join("\n"));

    block(&mut out, "LYRICS", format_lyrics(&result.lyrics));

    if request.include_phonetics && !result.phonetics.is_empty() {
        block(&mut out, "PHONETICS", format_phonetics(&result.phonetics));
    }
    if !result.qa_log.is_empty() {
        block(&mut out, "QA LOG", format_qa_log(&result.qa_log));
    }
    if !result.metadata.is_empty() {
        block(&mut out, "METADATA", format_metadata(&result.metadata));
    }
    out.push(RULE.to_string());

    out.join("\n")
}

/// Pretty-printed `{version, generated_at, request, result}`.
pub fn render_json(
    request: &GenerationRequest,
    result: &GenerationResult,
    generated_at: DateTime<Utc>,
) -> Result<String> {
    let envelope = Envelope {
        version: env!("CARGO_PKG_VERSION"),
        generated_at: generated_at.to_rfc3339(),
        request,
        result,
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

pub fn render(
    format: ExportFormat,
    request: &GenerationRequest,
    result: &GenerationResult,
    generated_at: DateTime<Utc>,
) -> Result<String> {
    match format {
        ExportFormat::Text => Ok(render_text(request, result, generated_at)),
        ExportFormat::Json => render_json(request, result, generated_at),
    }
}

/// Resolves a caller-chosen directory under `base`. Only plain relative
/// paths are accepted: no root, drive prefix or `..` component.
pub fn resolve_export_dir(base: &Path, requested: Option<&Path>) -> Result<PathBuf> {
    let Some(requested) = requested.filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(base.to_path_buf());
    };
    let plain = requested
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain {
        return Err(SongwrightError::validation(
            "directory",
            format!(
                "'{}' must be a relative path inside the export directory",
                requested.display()
            ),
        ));
    }
    Ok(base.join(requested))
}

/// Writes `contents` to `dir/stem.ext`, creating `dir` if needed.
pub fn write_export(
    dir: impl AsRef<Path>,
    stem: &str,
    format: ExportFormat,
    contents: &str,
) -> Result<PathBuf> {
    let stem = stem.trim();
    if stem.is_empty() || stem.contains(['/', '\\']) || stem.starts_with('.') {
        return Err(SongwrightError::validation(
            "file_name",
            format!("'{stem}' is not a plain file name"),
        ));
    }
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{stem}.{}", format.extension()));
    fs::write(&path, contents)?;
    tracing::info!("Exported lyrics to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::payload::{build_request, sample_form};
    use chrono::TimeZone;

    fn fixture() -> (GenerationRequest, GenerationResult, DateTime<Utc>) {
        let mut form = sample_form();
        form.singer_gender = "Male".to_string();
        form.singer_nationality = "Colombian".to_string();
        let request = build_request(&form).unwrap();
        let result = parse(
            r#"{"lyrics":{"chorus":"oh oh","verse_1":"uno"},
                "phonetics":{"rhythm_notes":"slow"},
                "qa_log":{"creative_choices":"rain"},
                "metadata":{"total_lines":2}}"#,
        );
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
        (request, result, at)
    }

    #[test]
    fn test_text_export_blocks() {
        let (request, result, at) = fixture();
        let text = render_text(&request, &result, at);
        assert!(text.contains("Generated: 2025-03-01 12:30:00 UTC"));
        assert!(text.contains("Singer: Male - Colombian"));
        let lyrics_at = text.find("LYRICS:").unwrap();
        let phonetics_at = text.find("PHONETICS:").unwrap();
        let qa_at = text.find("QA LOG:").unwrap();
        let meta_at = text.find("METADATA:").unwrap();
        assert!(lyrics_at < phonetics_at && phonetics_at < qa_at && qa_at < meta_at);
        assert!(text.find("[VERSE 1]").unwrap() < text.find("[CHORUS]").unwrap());
    }

    #[test]
    fn test_text_export_skips_unrequested_phonetics() {
        let (mut request, result, at) = fixture();
        request.include_phonetics = false;
        assert!(!render_text(&request, &result, at).contains("PHONETICS:"));
    }

    #[test]
    fn test_json_envelope() {
        let (request, result, at) = fixture();
        let json = render_json(&request, &result, at).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(value["generated_at"], "2025-03-01T12:30:00+00:00");
        assert_eq!(value["request"]["genre"], "Reggaeton");
        assert_eq!(value["request"]["energy"], "High");
        assert_eq!(value["result"]["lyrics"]["verse_1"], "uno");
        assert_eq!(parse(&value["result"].to_string()), result);
    }

    #[test]
    fn test_write_export_creates_directory() {
        let dir = std::env::temp_dir().join(format!("songwright-export-{}", uuid::Uuid::new_v4()));
        let path = write_export(&dir, "take_one", ExportFormat::Json, "{}").unwrap();
        assert_eq!(path, dir.join("take_one.json"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_export_dir_stays_under_base() {
        let base = Path::new("exports");
        assert_eq!(resolve_export_dir(base, None).unwrap(), base);
        assert_eq!(
            resolve_export_dir(base, Some(Path::new("takes/2025"))).unwrap(),
            base.join("takes/2025")
        );
        for bad in ["/etc", "../outside", "takes/../../outside"] {
            match resolve_export_dir(base, Some(Path::new(bad))) {
                Err(SongwrightError::Validation { field, .. }) => assert_eq!(field, "directory"),
                other => panic!("expected validation error for {bad}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_write_export_rejects_paths() {
        let dir = std::env::temp_dir();
        for stem in ["", "../escape", "a/b", ".hidden"] {
            assert!(write_export(&dir, stem, ExportFormat::Text, "x").is_err());
        }
    }
}
