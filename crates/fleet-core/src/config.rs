//! Run configuration.
//!
//! One explicit struct, loaded from disk and passed down to the scheduler
//! and flows. Nothing in the core reads ambient global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vision::CaptureOptions;

/// Configuration for a fleet run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Input list: one identifier per line, blank lines ignored.
    pub id_file: PathBuf,
    /// Directory holding the template images.
    pub template_dir: PathBuf,
    /// Directory the outcome lists are written to.
    pub output_dir: PathBuf,
    /// Template match acceptance threshold.
    pub match_threshold: f64,
    /// OCR language code.
    pub ocr_lang: String,
    /// UI settle delay between steps, in milliseconds.
    pub settle_ms: u64,
    /// Timeout for result-polling steps, in seconds.
    pub response_timeout_secs: u64,
    /// Timeout for element-locating steps, in seconds.
    pub locate_timeout_secs: u64,
    /// Screenshot retry policy.
    pub capture: CaptureOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            id_file: PathBuf::from("id.txt"),
            template_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("."),
            match_threshold: 0.7,
            ocr_lang: "eng".to_string(),
            settle_ms: 500,
            response_timeout_secs: 30,
            locate_timeout_secs: 10,
            capture: CaptureOptions::default(),
        }
    }
}

impl RunConfig {
    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("adb-fleet").join("config.json"))
    }

    /// Load config from disk, falling back to defaults if not found.
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| std::fs::read_to_string(&path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(self)
                .map_err(|e| Error::Config(e.to_string()))?;
            std::fs::write(&path, content)?;
        }
        Ok(())
    }
}

/// Read the identifier work list: one token per line, blanks skipped.
pub fn read_identifiers(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
