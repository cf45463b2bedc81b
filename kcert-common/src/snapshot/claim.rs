//! Merging JUnit reports into an existing claim document.
//!
//! Each `*.xml` file in the report directory is stored under
//! `claim.rawResults.<file stem>`. Keys already present in the claim are left
//! untouched, and the claim file is rewritten only when a report was added.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use super::junit::{JunitError, junit_to_json};
use crate::errors::ErrorCode;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("claim {path} is not a valid claim document: {reason}")]
    Invalid { path: String, reason: String },

    #[error("JUnit report {path} could not be converted: {source}")]
    Junit {
        path: String,
        #[source]
        source: JunitError,
    },

    #[error("failed to write claim {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ClaimError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::SnapshotReadError,
            Self::Invalid { .. } => ErrorCode::SnapshotParseError,
            Self::Junit { .. } => ErrorCode::JunitParseError,
            Self::Write { .. } => ErrorCode::SnapshotWriteError,
        }
    }
}

/// Report keys added to and skipped in one claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClaimUpdate {
    pub claim: String,
    pub added: Vec<String>,
    /// Keys that were already present in the claim.
    pub skipped: Vec<String>,
}

impl ClaimUpdate {
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

/// `claim.rawResults` of a claim document, created when absent.
pub fn raw_results_mut(document: &mut Value) -> Result<&mut Map<String, Value>, String> {
    let claim = document
        .get_mut("claim")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| "missing top-level \"claim\" object".to_string())?;
    claim
        .entry("rawResults")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| "\"claim.rawResults\" is not an object".to_string())
}

/// `*.xml` files directly under `dir`, sorted by file name.
fn junit_reports(dir: &Path) -> Result<Vec<PathBuf>, ClaimError> {
    let read_err = |source| ClaimError::Read {
        path: dir.display().to_string(),
        source,
    };
    let mut reports = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "xml") {
            reports.push(path);
        }
    }
    reports.sort();
    Ok(reports)
}

/// Add every JUnit report in `report_dir` to the claim at `claim_path`.
pub fn add_reports(claim_path: &Path, report_dir: &Path) -> Result<ClaimUpdate, ClaimError> {
    let claim_display = claim_path.display().to_string();
    let data = std::fs::read(claim_path).map_err(|source| ClaimError::Read {
        path: claim_display.clone(),
        source,
    })?;
    let mut document: Value =
        serde_json::from_slice(&data).map_err(|e| ClaimError::Invalid {
            path: claim_display.clone(),
            reason: e.to_string(),
        })?;
    let raw_results = raw_results_mut(&mut document).map_err(|reason| ClaimError::Invalid {
        path: claim_display.clone(),
        reason,
    })?;

    let mut update = ClaimUpdate {
        claim: claim_display.clone(),
        ..ClaimUpdate::default()
    };
    for report in junit_reports(report_dir)? {
        let Some(key) = report.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        if raw_results.contains_key(&key) {
            info!(key = %key, claim = %claim_display, "Skipping report already present in claim");
            update.skipped.push(key);
            continue;
        }

        let report_display = report.display().to_string();
        let xml = std::fs::read_to_string(&report).map_err(|source| ClaimError::Read {
            path: report_display.clone(),
            source,
        })?;
        let converted = junit_to_json(&xml).map_err(|source| ClaimError::Junit {
            path: report_display,
            source,
        })?;
        debug!(key = %key, "Adding JUnit report to claim");
        raw_results.insert(key.clone(), converted);
        update.added.push(key);
    }

    if update.changed() {
        let payload = serde_json::to_string_pretty(&document).map_err(|e| ClaimError::Invalid {
            path: claim_display.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(claim_path, format!("{payload}\n")).map_err(|source| ClaimError::Write {
            path: claim_display.clone(),
            source,
        })?;
        info!(claim = %claim_display, added = update.added.len(), "Claim file updated");
    } else {
        info!(claim = %claim_display, "No changes were applied to claim");
    }
    Ok(update)
}
