//! Result snapshot model and claim document loading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::errors::ErrorCode;

/// One named entry of a node's plugin inventory (a CNI network config list).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    /// Plugin definitions; `None` when the claim recorded `null`.
    #[serde(default)]
    pub plugins: Option<Vec<serde_json::Value>>,
}

impl PluginEntry {
    pub fn new(name: impl Into<String>, plugins: Vec<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            plugins: Some(plugins),
        }
    }

    /// Number of plugins, treating `null` as empty.
    pub fn plugin_count(&self) -> usize {
        self.plugins.as_ref().map_or(0, Vec::len)
    }
}

/// Outcome of one test case as recorded in the claim's raw results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseOutcome {
    #[serde(rename = "-name")]
    pub name: String,
    #[serde(rename = "-status", default)]
    pub status: String,
}

impl TestCaseOutcome {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
        }
    }
}

/// Immutable capture of cluster inventory and test outcomes from one run.
///
/// Only the parts the diff engine compares are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    /// Node name to plugin inventory.
    pub cni_plugins: BTreeMap<String, Vec<PluginEntry>>,
    /// Node name to opaque hardware facts.
    pub hw_info: BTreeMap<String, serde_json::Value>,
    pub test_cases: Vec<TestCaseOutcome>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {path} is not a valid claim document: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SnapshotError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::SnapshotReadError,
            Self::Parse { .. } => ErrorCode::SnapshotParseError,
        }
    }
}

impl ResultSnapshot {
    /// Load a snapshot from a claim JSON file.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let data = std::fs::read(path).map_err(|source| SnapshotError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_claim_slice(&data).map_err(|source| SnapshotError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Decode a claim document. Sections that are absent load as empty.
    pub fn from_claim_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        let root: ClaimRoot = serde_json::from_slice(data)?;
        let claim = root.claim;
        Ok(Self {
            cni_plugins: claim.nodes.cni_plugins,
            hw_info: claim.nodes.nodes_hw_info,
            test_cases: claim
                .raw_results
                .certification
                .testsuites
                .testsuite
                .testcase
                .into_vec(),
        })
    }

    /// Names of nodes in the hardware inventory, sorted.
    pub fn node_names(&self) -> Vec<String> {
        self.hw_info.keys().cloned().collect()
    }
}

// ── Claim document layout ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct ClaimRoot {
    claim: Claim,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct Claim {
    nodes: ClaimNodes,
    raw_results: RawResults,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ClaimNodes {
    cni_plugins: BTreeMap<String, Vec<PluginEntry>>,
    nodes_hw_info: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawResults {
    #[serde(rename = "cnf-certification-test")]
    certification: CertificationResults,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CertificationResults {
    testsuites: TestSuites,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TestSuites {
    testsuite: TestSuite,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TestSuite {
    testcase: OneOrMany<TestCaseOutcome>,
}

/// JUnit-to-JSON converters emit a bare object when a suite has one case.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(t) => vec![t],
        }
    }
}
