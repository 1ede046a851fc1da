use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::SongwrightError;

/// Lyrics key used when the model returned one unsectioned block of text.
pub const FULL_TEXT_KEY: &str = "full_text";

/// `metadata.format` marker written by the plain-text fallback.
pub const PLAIN_TEXT_FORMAT: &str = "plain-text";

/// Display order for known lyric sections, with their headers.
pub const CANONICAL_SECTIONS: [(&str, &str); 9] = [
    ("intro", "INTRO"),
    ("verse_1", "VERSE 1"),
    ("pre_chorus", "PRE-CHORUS"),
    ("chorus", "CHORUS"),
    ("verse_2", "VERSE 2"),
    ("chanteo", "CHANTEO"),
    ("chorus_repeat", "CHORUS"),
    ("bridge", "BRIDGE"),
    ("outro", "OUTRO"),
];

// ───────────────────────────────────────────────────────────────────────────────
// Request enumerations
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Energy {
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "Medium-Low")]
    MediumLow,
    #[serde(rename = "Medium")]
    Medium,
    #[serde(rename = "Medium-High")]
    MediumHigh,
    #[serde(rename = "High")]
    High,
}

impl Energy {
    pub const ALL: [Energy; 5] = [
        Energy::Low,
        Energy::MediumLow,
        Energy::Medium,
        Energy::MediumHigh,
        Energy::High,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Energy::Low => "Low",
            Energy::MediumLow => "Medium-Low",
            Energy::Medium => "Medium",
            Energy::MediumHigh => "Medium-High",
            Energy::High => "High",
        }
    }
}

impl fmt::Display for Energy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Energy {
    type Err = SongwrightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Energy::ALL
            .into_iter()
            .find(|e| e.label() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Energy::ALL.iter().map(Energy::label).collect();
                SongwrightError::validation(
                    "energy",
                    format!("'{s}' is not one of {}", valid.join(", ")),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlangDensity {
    Low,
    Medium,
    High,
}

impl SlangDensity {
    pub fn label(&self) -> &'static str {
        match self {
            SlangDensity::Low => "Low",
            SlangDensity::Medium => "Medium",
            SlangDensity::High => "High",
        }
    }

    /// Numeric hint given to the model alongside the label.
    pub fn numeric_hint(&self) -> &'static str {
        match self {
            SlangDensity::Low => "2/10",
            SlangDensity::Medium => "5/10",
            SlangDensity::High => "8/10",
        }
    }

    /// Buckets a 0-10 score: ≤3 Low, 4-6 Medium, ≥7 High.
    pub fn from_score(score: f64) -> Option<Self> {
        if !(0.0..=10.0).contains(&score) {
            return None;
        }
        Some(if score <= 3.0 {
            SlangDensity::Low
        } else if score < 7.0 {
            SlangDensity::Medium
        } else {
            SlangDensity::High
        })
    }
}

impl fmt::Display for SlangDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SlangDensity {
    type Err = SongwrightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Low" => Ok(SlangDensity::Low),
            "Medium" => Ok(SlangDensity::Medium),
            "High" => Ok(SlangDensity::High),
            other => Err(SongwrightError::validation(
                "slang_density",
                format!("'{other}' must be Low, Medium, High or a number from 0 to 10"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LyricsPart {
    #[default]
    #[serde(rename = "Full Song")]
    FullSong,
    #[serde(rename = "Verse 1 Only")]
    Verse1Only,
    #[serde(rename = "Chorus Only")]
    ChorusOnly,
    #[serde(rename = "Verse 2 Only")]
    Verse2Only,
    #[serde(rename = "Pre-Chorus Only")]
    PreChorusOnly,
    #[serde(rename = "Chanteo Only")]
    ChanteoOnly,
    #[serde(rename = "Bridge Only")]
    BridgeOnly,
    #[serde(rename = "Custom Selection")]
    CustomSelection,
}

impl LyricsPart {
    pub const ALL: [LyricsPart; 8] = [
        LyricsPart::FullSong,
        LyricsPart::Verse1Only,
        LyricsPart::ChorusOnly,
        LyricsPart::Verse2Only,
        LyricsPart::PreChorusOnly,
        LyricsPart::ChanteoOnly,
        LyricsPart::BridgeOnly,
        LyricsPart::CustomSelection,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LyricsPart::FullSong => "Full Song",
            LyricsPart::Verse1Only => "Verse 1 Only",
            LyricsPart::ChorusOnly => "Chorus Only",
            LyricsPart::Verse2Only => "Verse 2 Only",
            LyricsPart::PreChorusOnly => "Pre-Chorus Only",
            LyricsPart::ChanteoOnly => "Chanteo Only",
            LyricsPart::BridgeOnly => "Bridge Only",
            LyricsPart::CustomSelection => "Custom Selection",
        }
    }
}

impl fmt::Display for LyricsPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LyricsPart {
    type Err = SongwrightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(LyricsPart::default());
        }
        LyricsPart::ALL
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                SongwrightError::validation("lyrics_part", format!("unknown lyrics part '{s}'"))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SongLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl fmt::Display for SongLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SongLength::Short => "Short",
            SongLength::Medium => "Medium",
            SongLength::Long => "Long",
        })
    }
}

impl FromStr for SongLength {
    type Err = SongwrightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "medium" => Ok(SongLength::Medium),
            "short" => Ok(SongLength::Short),
            "long" => Ok(SongLength::Long),
            other => Err(SongwrightError::validation(
                "length",
                format!("'{other}' must be Short, Medium or Long"),
            )),
        }
    }
}

// ───────────────────────────────────────────────────────────────────────────────
// GenerationRequest
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingerProfile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gender: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nationality: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vocal_style: String,
}

/// A validated set of songwriting parameters. Built once per user action by
/// `payload::build_request` and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub genre: String,
    pub song_type: String,
    pub vibe: String,
    pub energy: Energy,
    pub language: String,
    pub slang_density: SlangDensity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singer: Option<SingerProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_override: Option<String>,
    pub include_chanteo: bool,
    pub include_bridge: bool,
    pub include_phonetics: bool,
    pub lyrics_part: LyricsPart,
    #[serde(default)]
    pub notes: String,
    pub length: SongLength,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub forbidden_words: Vec<String>,
}

// ───────────────────────────────────────────────────────────────────────────────
// GenerationResult
// ───────────────────────────────────────────────────────────────────────────────

/// Best-effort text for a JSON value: strings as-is, arrays joined by
/// newlines, other scalars stringified. Only `null` counts as absent; blank
/// text is kept as given.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => value.to_string(),
    };
    Some(text)
}

fn is_blank(field: &Option<String>) -> bool {
    field.as_deref().is_none_or(|text| text.trim().is_empty())
}

/// Flexible integer reader: accepts ints, floats and numeric strings.
fn value_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Section name → text, in the order the sections were supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lyrics {
    sections: Vec<(String, String)>,
}

impl Lyrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        let mut lyrics = Self::new();
        lyrics.insert(FULL_TEXT_KEY, text);
        lyrics
    }

    /// Lenient read: a mapping keeps its order, a string becomes `full_text`.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let mut lyrics = Self::new();
                for (name, text) in map {
                    if let Some(text) = value_text(text) {
                        lyrics.insert(name.clone(), text);
                    }
                }
                lyrics
            }
            other => value_text(other).map(Self::from_text).unwrap_or_default(),
        }
    }

    /// Inserts or replaces a section; a replaced section keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        let text = text.into();
        match self.sections.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = text,
            None => self.sections.push((name, text)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.as_str())
    }

    pub fn full_text(&self) -> Option<&str> {
        self.get(FULL_TEXT_KEY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sections.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn has_content(&self) -> bool {
        self.sections.iter().any(|(_, t)| !t.trim().is_empty())
    }

    /// Number of non-blank lines across all sections.
    pub fn line_count(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|(_, t)| t.lines())
            .filter(|l| !l.trim().is_empty())
            .count()
    }

    /// All section text joined with blank lines, in insertion order.
    pub fn joined(&self) -> String {
        self.sections
            .iter()
            .map(|(_, t)| t.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Serialize for Lyrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for (name, text) in &self.sections {
            map.serialize_entry(name, text)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Lyrics {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(&Value::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhoneticPhrase {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub phrase: String,
    #[serde(rename = "phonetic", skip_serializing_if = "String::is_empty")]
    pub phonetic_spelling: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PhoneticPhrase {
    fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let field = |key: &str| map.get(key).and_then(value_text);
        let phrase = Self {
            phrase: field("phrase").unwrap_or_default(),
            phonetic_spelling: field("phonetic")
                .or_else(|| field("phonetic_spelling"))
                .unwrap_or_default(),
            note: field("note"),
        };
        if phrase.phrase.is_empty() && phrase.phonetic_spelling.is_empty() {
            None
        } else {
            Some(phrase)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Phonetics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub difficult_phrases: Vec<PhoneticPhrase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rhythm_notes: Option<String>,
}

impl Phonetics {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self {
                difficult_phrases: map
                    .get("difficult_phrases")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(PhoneticPhrase::from_value).collect())
                    .unwrap_or_default(),
                rhythm_notes: map.get("rhythm_notes").and_then(value_text),
            },
            // Some models answer with a prose block instead of the object.
            other => Self {
                difficult_phrases: Vec::new(),
                rhythm_notes: value_text(other),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.difficult_phrases.is_empty() && is_blank(&self.rhythm_notes)
    }
}

impl<'de> Deserialize<'de> for Phonetics {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(&Value::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QaLog {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creative_choices: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cultural_references: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slang_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl QaLog {
    pub fn from_notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Self::default()
        }
    }

    /// Lenient read: a mapping is read field by field, a string becomes `notes`.
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return value_text(value).map(Self::from_notes).unwrap_or_default();
        };
        let field = |key: &str| map.get(key).and_then(value_text);
        let slang_used = match map.get("slang_used") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(value_text)
                .filter(|word| !word.trim().is_empty())
                .collect(),
            Some(Value::String(s)) => crate::payload::split_list(s),
            _ => Vec::new(),
        };
        let mut deduped: Vec<String> = Vec::with_capacity(slang_used.len());
        for word in slang_used {
            if !deduped.contains(&word) {
                deduped.push(word);
            }
        }
        Self {
            creative_choices: field("creative_choices"),
            cultural_references: field("cultural_references"),
            slang_used: deduped,
            structure_notes: field("structure_notes"),
            revision_notes: field("revision_notes"),
            notes: field("notes"),
        }
    }

    /// True when no field carries any text.
    pub fn is_empty(&self) -> bool {
        self.slang_used.is_empty()
            && [
                &self.creative_choices,
                &self.cultural_references,
                &self.structure_notes,
                &self.revision_notes,
                &self.notes,
            ]
            .into_iter()
            .all(is_blank)
    }
}

impl<'de> Deserialize<'de> for QaLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(&Value::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slang_density: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Anything else the model put in `metadata`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    const KNOWN: [&'static str; 8] = [
        "total_lines",
        "structure",
        "slang_density",
        "language",
        "estimated_duration",
        "model_used",
        "tokens_used",
        "format",
    ];

    pub fn plain_text() -> Self {
        Self {
            format: Some(PLAIN_TEXT_FORMAT.to_string()),
            ..Self::default()
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        let field = |key: &str| map.get(key).and_then(value_text);
        Self {
            total_lines: map.get("total_lines").and_then(value_u64),
            structure: field("structure"),
            slang_density: map.get("slang_density").filter(|v| !v.is_null()).cloned(),
            language: field("language"),
            estimated_duration: field("estimated_duration"),
            model_used: field("model_used"),
            tokens_used: map.get("tokens_used").and_then(value_u64),
            format: field("format"),
            extra: map
                .iter()
                .filter(|(k, _)| !Self::KNOWN.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(&Value::deserialize(deserializer)?))
    }
}

/// The four-part structured answer shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(default)]
    pub lyrics: Lyrics,
    #[serde(default)]
    pub phonetics: Phonetics,
    #[serde(default)]
    pub qa_log: QaLog,
    #[serde(default)]
    pub metadata: Metadata,
}

impl GenerationResult {
    /// Normalises a decoded JSON object into the canonical four fields.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            lyrics: map.get("lyrics").map(Lyrics::from_value).unwrap_or_default(),
            phonetics: map
                .get("phonetics")
                .map(Phonetics::from_value)
                .unwrap_or_default(),
            qa_log: map.get("qa_log").map(QaLog::from_value).unwrap_or_default(),
            metadata: map
                .get("metadata")
                .map(Metadata::from_value)
                .unwrap_or_default(),
        }
    }

    /// True when the parser fell back to wrapping unstructured text.
    pub fn is_degraded(&self) -> bool {
        self.metadata.format.as_deref() == Some(PLAIN_TEXT_FORMAT)
    }
}

/// What one `generate`/`revise` call hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub request_id: uuid::Uuid,
    pub generated_at: DateTime<Utc>,
    pub attempts: u32,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub result: GenerationResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lyrics_keep_insertion_order() {
        let value = json!({"chorus": "c", "verse_1": "v1", "bridge": "b"});
        let lyrics = Lyrics::from_value(&value);
        let names: Vec<&str> = lyrics.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["chorus", "verse_1", "bridge"]);
    }

    #[test]
    fn test_lyrics_section_arrays_are_joined() {
        let lyrics = Lyrics::from_value(&json!({"verse_1": ["uno", "dos"]}));
        assert_eq!(lyrics.get("verse_1"), Some("uno\ndos"));
        assert_eq!(lyrics.line_count(), 2);
    }

    #[test]
    fn test_qa_log_dedupes_slang() {
        let qa = QaLog::from_value(&json!({"slang_used": ["pa'", "bellaqueo", "pa'"]}));
        assert_eq!(qa.slang_used, vec!["pa'", "bellaqueo"]);
    }

    #[test]
    fn test_metadata_flexible_numbers_and_extra() {
        let meta = Metadata::from_value(&json!({
            "total_lines": "32",
            "tokens_used": 812.0,
            "temperature": 0.8
        }));
        assert_eq!(meta.total_lines, Some(32));
        assert_eq!(meta.tokens_used, Some(812));
        assert_eq!(meta.extra.get("temperature"), Some(&json!(0.8)));
    }

    #[test]
    fn test_energy_labels() {
        assert_eq!("Medium-High".parse::<Energy>().unwrap(), Energy::MediumHigh);
        assert!("Extreme".parse::<Energy>().is_err());
        assert_eq!(
            serde_json::to_value(Energy::MediumLow).unwrap(),
            json!("Medium-Low")
        );
    }

    #[test]
    fn test_slang_buckets() {
        assert_eq!(SlangDensity::from_score(0.0), Some(SlangDensity::Low));
        assert_eq!(SlangDensity::from_score(3.0), Some(SlangDensity::Low));
        assert_eq!(SlangDensity::from_score(4.0), Some(SlangDensity::Medium));
        assert_eq!(SlangDensity::from_score(6.0), Some(SlangDensity::Medium));
        assert_eq!(SlangDensity::from_score(7.0), Some(SlangDensity::High));
        assert_eq!(SlangDensity::from_score(10.5), None);
    }
}
