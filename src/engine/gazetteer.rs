use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::fuzzy::normalize_key;
use crate::error::{Result, ValidatorError};

/// Reference record for one comune, used for fuzzy correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazetteerEntry {
    pub city: String,
    /// Two-letter province code (sigla), e.g. "RM".
    pub province: String,
    /// Full province name, e.g. "Roma"; accepted as an alternate spelling
    /// of the code on input.
    pub province_name: String,
    pub country: String,
    /// The output spelling used when this entry wins a correction.
    pub canonical_name: String,
}

/// Read-only gazetteer of comuni. Loaded once at startup and shared across
/// requests; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    entries: Vec<GazetteerEntry>,
}

const BUILTIN_DATASET: &str = include_str!("../../data/gazetteer.json");

impl Gazetteer {
    /// The dataset compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_DATASET)
    }

    /// Load a replacement dataset from disk (config override).
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_entries(entries: Vec<GazetteerEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(ValidatorError::Config(
                "gazetteer has no entries".to_string(),
            ));
        }
        Ok(Self { entries })
    }

    fn from_json(content: &str) -> Result<Self> {
        let entries: Vec<GazetteerEntry> = serde_json::from_str(content)?;
        let gazetteer = Self::from_entries(entries)?;
        info!(entries = gazetteer.len(), "gazetteer loaded");
        Ok(gazetteer)
    }

    pub fn entries(&self) -> &[GazetteerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact lookup by normalized city name, optionally narrowed by
    /// province code.
    pub fn find_city(&self, city: &str, province: Option<&str>) -> Option<&GazetteerEntry> {
        let key = normalize_key(city);
        self.entries.iter().find(|e| {
            normalize_key(&e.city) == key
                && province.map_or(true, |p| e.province.eq_ignore_ascii_case(p.trim()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_dataset_loads() {
        let gazetteer = Gazetteer::builtin().unwrap();
        assert!(gazetteer.len() > 40);
        assert!(gazetteer.find_city("Roma", Some("RM")).is_some());
    }

    #[test]
    fn find_city_is_accent_insensitive() {
        let gazetteer = Gazetteer::builtin().unwrap();
        let entry = gazetteer.find_city("forli", None).unwrap();
        assert_eq!(entry.province, "FC");
    }

    #[test]
    fn find_city_respects_province_filter() {
        let gazetteer = Gazetteer::builtin().unwrap();
        assert!(gazetteer.find_city("Roma", Some("MI")).is_none());
    }

    #[test]
    fn empty_dataset_is_a_config_error() {
        let err = Gazetteer::from_entries(Vec::new()).unwrap_err();
        assert!(err.to_string().contains("gazetteer"));
    }

    #[test]
    fn loads_override_dataset_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{ "city": "Testopoli", "province": "TP", "province_name": "Testopoli",
                 "country": "IT", "canonical_name": "Testopoli" }}]"#
        )
        .unwrap();

        let gazetteer = Gazetteer::from_path(file.path()).unwrap();
        assert_eq!(gazetteer.len(), 1);
        assert!(gazetteer.find_city("testopoli", None).is_some());
    }
}
