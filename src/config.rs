//! Configuration loading and management
//!
//! Handles parsing of `.shelf.toml` in the library directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::progress::{CompletionMode, ProgressAggregator, ProgressFormula};
use crate::stats::{Bucketing, Period, SortBy, StatsFilter};
use crate::storage::LIBRARY_FILE;

/// Configuration file name inside the library directory
pub const CONFIG_FILE: &str = ".shelf.toml";

/// Fallback library directory when neither `--dir` nor a platform data
/// directory is available
pub const FALLBACK_DIR: &str = ".shelf";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Progress roll-up rules
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Library file settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Defaults for `shelf stats`
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressConfig {
    /// How book progress is derived from stages
    #[serde(default)]
    pub book_formula: ProgressFormula,

    /// Whether task changes re-derive a stage's completion flag
    #[serde(default)]
    pub stage_completion: CompletionMode,

    /// Whether stage changes re-derive a book's completion flag
    #[serde(default)]
    pub book_completion: CompletionMode,
}

impl ProgressConfig {
    pub fn aggregator(&self) -> ProgressAggregator {
        ProgressAggregator::new(self.book_formula, self.stage_completion, self.book_completion)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Library file, relative to the library directory
    #[serde(default = "default_library_file")]
    pub file: String,

    /// How long to wait for the library lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_library_file() -> String {
    LIBRARY_FILE.to_string()
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file: default_library_file(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsConfig {
    #[serde(default)]
    pub period: Period,

    #[serde(default)]
    pub sort: SortBy,

    #[serde(default = "default_true")]
    pub show_completed: bool,

    /// Bucket width of the period summary
    #[serde(default)]
    pub by: Bucketing,
}

fn default_true() -> bool {
    true
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            period: Period::default(),
            sort: SortBy::default(),
            show_completed: true,
            by: Bucketing::default(),
        }
    }
}

impl StatsConfig {
    pub fn filter(&self) -> StatsFilter {
        StatsFilter {
            period: self.period,
            sort: self.sort,
            show_completed: self.show_completed,
            by: self.by,
        }
    }
}

impl Config {
    /// Load configuration from a `.shelf.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a library directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    path = %config_path.display(),
                    error = %err,
                    "ignoring invalid configuration"
                );
                Self::default()
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the library file for a library directory
    pub fn library_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.storage.file)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.storage.file.trim().is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "storage.file cannot be empty".to_string(),
            ));
        }
        if self.storage.lock_timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "storage.lock_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pick the library directory: explicit path, else the platform data
/// directory, else `./.shelf`.
pub fn resolve_library_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    directories::ProjectDirs::from("", "", "shelf")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.progress.book_formula, ProgressFormula::CompletedRatio);
        assert_eq!(cfg.progress.stage_completion, CompletionMode::Auto);
        assert_eq!(cfg.progress.book_completion, CompletionMode::Auto);
        assert_eq!(cfg.storage.file, "library.json");
        assert_eq!(cfg.storage.lock_timeout_ms, 5000);
        assert_eq!(cfg.stats.period, Period::All);
        assert_eq!(cfg.stats.sort, SortBy::Progress);
        assert!(cfg.stats.show_completed);
        assert_eq!(cfg.stats.by, Bucketing::Week);
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
[progress]
book_formula = "average"
stage_completion = "manual"
book_completion = "auto"

[storage]
file = "data/books.json"
lock_timeout_ms = 250

[stats]
period = "week"
sort = "name"
show_completed = false
by = "month"
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.progress.book_formula, ProgressFormula::Average);
        assert_eq!(cfg.progress.stage_completion, CompletionMode::Manual);
        assert_eq!(cfg.progress.book_completion, CompletionMode::Auto);
        assert_eq!(cfg.storage.file, "data/books.json");
        assert_eq!(cfg.storage.lock_timeout_ms, 250);
        assert_eq!(cfg.stats.period, Period::Week);
        assert_eq!(cfg.stats.sort, SortBy::Name);
        assert!(!cfg.stats.show_completed);
        assert_eq!(cfg.stats.by, Bucketing::Month);
        assert_eq!(cfg.stats.filter().by, Bucketing::Month);
        assert_eq!(
            cfg.library_path(dir.path()),
            dir.path().join("data/books.json")
        );
    }

    #[test]
    fn unknown_formula_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[progress]\nbook_formula = \"median\"").expect("write config");
        let err = Config::load(&path).expect_err("invalid config");
        assert!(matches!(err, crate::error::Error::TomlParse(_)));
    }

    #[test]
    fn zero_lock_timeout_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[storage]\nlock_timeout_ms = 0").expect("write config");
        let err = Config::load(&path).expect_err("invalid config");
        match err {
            crate::error::Error::InvalidConfig(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn load_from_dir_defaults_when_missing_or_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(Config::load_from_dir(dir.path()), Config::default());

        fs::write(dir.path().join(CONFIG_FILE), "[storage]\nfile = \"\"").expect("write");
        assert_eq!(Config::load_from_dir(dir.path()), Config::default());
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        Config::default().save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("book_formula = \"completed_ratio\""));
        assert!(written.contains("file = \"library.json\""));
    }

    #[test]
    fn explicit_dir_wins() {
        let dir = PathBuf::from("/tmp/some-library");
        assert_eq!(resolve_library_dir(Some(&dir)), dir);
    }
}
