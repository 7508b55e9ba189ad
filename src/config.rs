//! Run settings, loaded from an optional CONL file

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "catalog.conl";
/// Lower bound for the pause between page requests
pub const MIN_DELAY_MS: u64 = 100;

/// Built-in subtype -> type mapping for the furniture categories
const CATEGORY_TABLE: &[(&str, &str)] = &[
    ("dining_table", "Table"),
    ("dining table", "Table"),
    ("study_table", "Table"),
    ("study table", "Table"),
    ("casual_table", "Table"),
    ("casual table", "Table"),
    ("tea_table", "Table"),
    ("tea table", "Table"),
    ("dining_chair", "Chair"),
    ("dining chair", "Chair"),
    ("casual_chair", "Chair"),
    ("casual chair", "Chair"),
    ("gaming_chair", "Chair"),
    ("gaming chair", "Chair"),
    ("office_chair", "Chair"),
    ("office chair", "Chair"),
    ("rocking_chair", "Chair"),
    ("rocking chair", "Chair"),
    ("bed", "Bed"),
    ("sofa", "Sofa"),
    ("storage", "Storage"),
    ("shelves", "Storage"),
    ("shelves_output", "Storage"),
    ("wardrobe", "Storage"),
    ("cupboard", "Storage"),
    ("cabinet", "Storage"),
    ("cabinets", "Storage"),
];

/// Settings file contents; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    split_dir: Option<PathBuf>,
    input_dir: Option<PathBuf>,
    brand: Option<String>,
    delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
    user_agent: Option<String>,
    cache_dir: Option<PathBuf>,
    #[serde(default)]
    categories: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory of per-category batch files
    pub split_dir: PathBuf,
    /// Directory `split` writes into
    pub input_dir: PathBuf,
    pub brand: String,
    /// Pause after every network request
    pub delay_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub cache_dir: Option<PathBuf>,
    pub categories: CategoryTable,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            split_dir: PathBuf::from("split_output"),
            input_dir: PathBuf::from("split_inputs"),
            brand: "IKEA".to_string(),
            delay_ms: 200,
            timeout_secs: 15,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string(),
            cache_dir: None,
            categories: CategoryTable::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from `catalog.conl` when present.
    /// An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        Self::from_conl(&content)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))
    }

    pub fn from_conl(content: &str) -> Result<Self> {
        let file: SettingsFile = serde_conl::from_str(content)?;
        let defaults = Self::default();

        let mut categories = defaults.categories;
        for (subtype, category) in file.categories {
            categories.insert(&subtype, &category);
        }

        Ok(Self {
            split_dir: file.split_dir.unwrap_or(defaults.split_dir),
            input_dir: file.input_dir.unwrap_or(defaults.input_dir),
            brand: file.brand.unwrap_or(defaults.brand),
            delay_ms: file.delay_ms.unwrap_or(defaults.delay_ms),
            timeout_secs: file.timeout_secs.unwrap_or(defaults.timeout_secs),
            user_agent: file.user_agent.unwrap_or(defaults.user_agent),
            cache_dir: file.cache_dir.or(defaults.cache_dir),
            categories,
        })
    }

    /// Pause after every network request, never below `MIN_DELAY_MS`
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.max(MIN_DELAY_MS))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Subtype -> category label lookup
#[derive(Debug, Clone)]
pub struct CategoryTable(BTreeMap<String, String>);

impl Default for CategoryTable {
    fn default() -> Self {
        Self(
            CATEGORY_TABLE
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl CategoryTable {
    pub fn insert(&mut self, subtype: &str, category: &str) {
        self.0.insert(subtype.to_string(), category.to_string());
    }

    /// Category for a subtype; unmapped subtypes get an empty label
    pub fn category_for(&self, subtype: &str) -> &str {
        self.0
            .get(subtype)
            .or_else(|| self.0.get(&subtype.trim().to_lowercase()))
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_lookup() {
        let table = CategoryTable::default();
        assert_eq!(table.category_for("dining_table"), "Table");
        assert_eq!(table.category_for("Gaming Chair"), "Chair");
        assert_eq!(table.category_for("shelves_output"), "Storage");
        assert_eq!(table.category_for("lamps"), "");
        assert_eq!(table.category_for(""), "");
    }

    #[test]
    fn test_settings_from_conl() {
        let conl = "brand = ACME\ndelay_ms = 500\ncategories\n  lamps = Lighting\n  bed = Sleep\n";
        let settings = Settings::from_conl(conl).unwrap();
        assert_eq!(settings.brand, "ACME");
        assert_eq!(settings.delay(), Duration::from_millis(500));
        assert_eq!(settings.timeout(), Duration::from_secs(15));
        assert_eq!(settings.categories.category_for("lamps"), "Lighting");
        assert_eq!(settings.categories.category_for("bed"), "Sleep");
        assert_eq!(settings.categories.category_for("sofa"), "Sofa");
    }

    #[test]
    fn test_delay_has_a_floor() {
        let mut settings = Settings::default();
        assert_eq!(settings.delay(), Duration::from_millis(200));
        settings.delay_ms = 0;
        assert_eq!(settings.delay(), Duration::from_millis(MIN_DELAY_MS));
        settings.delay_ms = 1500;
        assert_eq!(settings.delay(), Duration::from_millis(1500));
    }

    #[test]
    fn test_unknown_setting_rejected() {
        assert!(Settings::from_conl("colour = red\n").is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.conl");
        assert!(Settings::load(Some(&missing)).is_err());
    }
}
