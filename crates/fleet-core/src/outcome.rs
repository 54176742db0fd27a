//! Append-only classification store.
//!
//! Every processed identifier ends in exactly one of three plain-text
//! lists: `sukses.txt`, `die.txt`, `retry.txt`. The lists are truncated at
//! the start of each run and appended to as workers finish identifiers, so
//! line order reflects completion order, not input order. The core never
//! reads back or deduplicates; reprocessing an identifier appends again.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Terminal outcome of one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// Confirmed positive signal.
    Success,
    /// Confirmed negative signal, or an unrecoverable step error.
    Die,
    /// Perception failure; worth another pass later.
    Retry,
}

impl Classification {
    fn file_name(&self) -> &'static str {
        match self {
            Self::Success => "sukses.txt",
            Self::Die => "die.txt",
            Self::Retry => "retry.txt",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Die => write!(f, "Die"),
            Self::Retry => write!(f, "Retry"),
        }
    }
}

/// Counts per classification, read back for the end-of-run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeSummary {
    pub success: usize,
    pub die: usize,
    pub retry: usize,
}

impl OutcomeSummary {
    pub fn total(&self) -> usize {
        self.success + self.die + self.retry
    }
}

/// Thread-safe sink for outcome records.
pub struct OutcomeSink {
    dir: PathBuf,
    success: Mutex<File>,
    die: Mutex<File>,
    retry: Mutex<File>,
}

impl OutcomeSink {
    /// Open the three backing lists under `dir`, truncating any previous
    /// run's contents.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let open = |class: Classification| -> Result<Mutex<File>> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(dir.join(class.file_name()))?;
            Ok(Mutex::new(file))
        };
        Ok(Self {
            success: open(Classification::Success)?,
            die: open(Classification::Die)?,
            retry: open(Classification::Retry)?,
            dir,
        })
    }

    /// Append one record to its classification's list.
    pub fn record(&self, identifier: &str, classification: Classification) -> Result<()> {
        let file = match classification {
            Classification::Success => &self.success,
            Classification::Die => &self.die,
            Classification::Retry => &self.retry,
        };
        let mut guard = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(guard, "{}", identifier)?;
        guard.flush()?;
        Ok(())
    }

    /// Path of the list backing `classification`.
    pub fn path_for(&self, classification: Classification) -> PathBuf {
        self.dir.join(classification.file_name())
    }

    /// Re-read the lists and count entries.
    pub fn summary(&self) -> Result<OutcomeSummary> {
        let count = |class: Classification| -> Result<usize> {
            let content = std::fs::read_to_string(self.path_for(class))?;
            Ok(content.lines().filter(|l| !l.trim().is_empty()).count())
        };
        Ok(OutcomeSummary {
            success: count(Classification::Success)?,
            die: count(Classification::Die)?,
            retry: count(Classification::Retry)?,
        })
    }
}
