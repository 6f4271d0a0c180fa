//! Application configuration: TOML file plus `OMNIEXTRACT_*` env overrides.
//!
//! Binaries load a config once at startup (after `dotenvy`), then hand
//! sections down by reference; nothing in the core crates reads the
//! environment on its own.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub ocr: OcrSection,
    pub index: IndexSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// Path of the SQLite event log.
    pub db_path: PathBuf,
    /// Scratch directory for OCR output PDFs and decrypted copies.
    /// Promotion to permanent storage is a collaborator's responsibility.
    pub scratch_dir: PathBuf,
    /// Workspace name recorded into event details.
    pub workspace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSection {
    /// Languages to OCR, in tesseract notation ("eng", "fra", ...).
    /// An empty list is a configuration error surfaced at dispatch time.
    pub languages: Vec<String>,
    /// Binary names or absolute paths of the external tools.
    pub tesseract_bin: String,
    pub ocrmypdf_bin: String,
    pub qpdf_bin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// Hard timeout for each search-index call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("omniextract.db"),
            scratch_dir: std::env::temp_dir().join("omniextract"),
            workspace: "local".into(),
        }
    }
}

impl Default for OcrSection {
    fn default() -> Self {
        Self {
            languages: vec!["eng".into()],
            tesseract_bin: "tesseract".into(),
            ocrmypdf_bin: "ocrmypdf".into(),
            qpdf_bin: "qpdf".into(),
        }
    }
}

impl Default for IndexSection {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            ocr: OcrSection::default(),
            index: IndexSection::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl AppConfig {
    /// Load from a TOML file, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg: AppConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Defaults plus env overrides; used when no config file is given.
    pub fn from_env() -> Self {
        let mut cfg = AppConfig::default();
        cfg.apply_env_overrides();
        cfg
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("OMNIEXTRACT_DB_PATH") {
            self.app.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("OMNIEXTRACT_SCRATCH_DIR") {
            self.app.scratch_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("OMNIEXTRACT_WORKSPACE") {
            self.app.workspace = v;
        }
        if let Ok(v) = std::env::var("OMNIEXTRACT_OCR_LANGUAGES") {
            self.ocr.languages = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(v) = std::env::var("OMNIEXTRACT_TESSERACT_BIN") {
            self.ocr.tesseract_bin = v;
        }
        if let Ok(v) = std::env::var("OMNIEXTRACT_OCRMYPDF_BIN") {
            self.ocr.ocrmypdf_bin = v;
        }
        if let Ok(v) = std::env::var("OMNIEXTRACT_QPDF_BIN") {
            self.ocr.qpdf_bin = v;
        }
        if let Ok(v) = std::env::var("OMNIEXTRACT_INDEX_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.index.timeout_ms = ms;
            }
        }
    }
}

static GLOBAL: OnceCell<AppConfig> = OnceCell::new();

/// Install the process-wide config; later calls are ignored.
pub fn init_global(cfg: AppConfig) {
    let _ = GLOBAL.set(cfg);
}

/// Process-wide config, defaulting if none was installed.
pub fn global() -> &'static AppConfig {
    GLOBAL.get_or_init(AppConfig::default)
}
