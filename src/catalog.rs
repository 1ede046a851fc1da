use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Result, SongwrightError};
use crate::models::GenerationRequest;

/// One selectable value with its human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A named song-structure template, e.g. "Urban Simple".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureTemplate {
    pub name: String,
    pub pattern: String,
}

/// Allowed genres, song types, vibes and structure templates.
///
/// The values live in an external YAML file; this type only loads them and
/// checks membership. An empty category disables its check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub genres: Vec<CatalogEntry>,
    #[serde(default)]
    pub song_types: Vec<CatalogEntry>,
    #[serde(default)]
    pub vibes: Vec<CatalogEntry>,
    #[serde(default)]
    pub structures: Vec<StructureTemplate>,
    #[serde(default)]
    pub default_structure: Option<String>,
}

fn find<'a>(entries: &'a [CatalogEntry], name: &str) -> Option<&'a CatalogEntry> {
    entries.iter().find(|e| e.name.eq_ignore_ascii_case(name.trim()))
}

fn check_member(field: &str, entries: &[CatalogEntry], value: &str) -> Result<()> {
    if entries.is_empty() || find(entries, value).is_some() {
        return Ok(());
    }
    let allowed: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    Err(SongwrightError::validation(
        field,
        format!("'{value}' is not in the catalog. Allowed: {}", allowed.join(", ")),
    ))
}

impl Catalog {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load the catalog file. A missing file yields an empty catalog so the
    /// server can still run; membership checks are then skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(
                "Catalog file not found at {} - membership checks disabled",
                path.display()
            );
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let catalog = Self::from_yaml_str(&contents).map_err(|e| {
            SongwrightError::Config(format!("Failed to parse catalog {}: {e}", path.display()))
        })?;
        tracing::info!(
            genres = catalog.genres.len(),
            song_types = catalog.song_types.len(),
            vibes = catalog.vibes.len(),
            structures = catalog.structures.len(),
            "Loaded catalog from {}",
            path.display()
        );
        Ok(catalog)
    }

    /// Checks genre, song type and vibe membership.
    pub fn validate(&self, request: &GenerationRequest) -> Result<()> {
        check_member("genre", &self.genres, &request.genre)?;
        check_member("song_type", &self.song_types, &request.song_type)?;
        check_member("vibe", &self.vibes, &request.vibe)?;
        Ok(())
    }

    pub fn describe_genre(&self, name: &str) -> Option<&str> {
        find(&self.genres, name).map(|e| e.description.as_str())
    }

    pub fn describe_song_type(&self, name: &str) -> Option<&str> {
        find(&self.song_types, name).map(|e| e.description.as_str())
    }

    pub fn describe_vibe(&self, name: &str) -> Option<&str> {
        find(&self.vibes, name).map(|e| e.description.as_str())
    }

    /// Pattern for a named structure template.
    pub fn structure(&self, name: &str) -> Option<&str> {
        self.structures
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
            .map(|s| s.pattern.as_str())
    }
}

/// Section names of a structure pattern: `"[verse 1] → [chorus]"` gives
/// `["verse 1", "chorus"]`.
pub fn parse_structure(pattern: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut rest = pattern;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else { break };
        let name = after[..close].trim();
        if !name.is_empty() {
            sections.push(name.to_string());
        }
        rest = &after[close + 1..];
    }
    sections
}

#[cfg(test)]
pub(crate) const TEST_CATALOG: &str = r#"
genres:
  - name: Reggaeton
    description: Dembow rhythm, urban flavor
  - name: Latin Pop
    description: Melodic, radio-friendly
song_types:
  - name: Romantic
    description: Love-focused
vibes:
  - name: Sensual
  - name: Warm
structures:
  - name: Urban Simple
    pattern: "[verse 1] → [chorus] → [verse 2] → [chorus]"
default_structure: "[verse 1] → [chorus] → [verse 2 / chanteo] → [pre-chorus] → [chorus]"
"#;
