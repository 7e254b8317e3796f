//! Append-only retrieval attempt log.
//!
//! Every fetch attempt, successful or not, lands here as one JSON line.
//! The log is never rewritten; it answers "what did we try, when, and
//! what came back" long after the registry row has moved on.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
    /// The source answered with an HTML page instead of the artifact.
    Paywall,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Paywall => write!(f, "paywall"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub record_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// Artifact format attempted: "pdf" or "text".
    pub format: String,
    /// Source tried, e.g. "unpaywall" or "pmc_bioc".
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptRecord {
    pub fn new(record_id: &str, format: &str, source: &str, outcome: AttemptOutcome) -> Self {
        Self {
            record_id: record_id.to_string(),
            doi: None,
            format: format.to_string(),
            source: source.to_string(),
            url: None,
            timestamp: Utc::now(),
            outcome,
            artifact_path: None,
            bytes: None,
            content_type: None,
            error: None,
        }
    }
}

pub struct AttemptLog {
    path: PathBuf,
}

impl AttemptLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, attempt: &AttemptRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(attempt)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    pub fn append_all(&self, attempts: &[AttemptRecord]) -> Result<(), StoreError> {
        for attempt in attempts {
            self.append(attempt)?;
        }
        Ok(())
    }

    /// Read back the whole log in write order. Missing file is empty.
    pub fn read_all(&self) -> Result<Vec<AttemptRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut attempts = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            attempts.push(serde_json::from_str(&line)?);
        }
        Ok(attempts)
    }

    /// Attempts for one record, most recent last.
    pub fn for_record(&self, record_id: &str) -> Result<Vec<AttemptRecord>, StoreError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|a| a.record_id == record_id)
            .collect())
    }
}
