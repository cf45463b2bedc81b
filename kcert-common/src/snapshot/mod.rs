//! Snapshot Diff Engine.
//!
//! Compares two claim snapshots captured by earlier certification runs:
//! per-node plugin inventories, the node set, and per-test-case outcomes.
//! Comparison is offline and side-effect free. [`claim`] merges JUnit XML
//! reports into a claim file before it is compared.

pub mod claim;
pub mod diff;
pub mod junit;
pub mod model;

pub use claim::{ClaimError, ClaimUpdate, add_reports};
pub use diff::{
    ChangedPlugin, ChangedTestCase, NodePluginDiff, NodeSetDiff, SnapshotDiff, TestCaseDiff, diff,
    diff_plugins, diff_test_cases, missing,
};
pub use junit::{JunitError, junit_to_json};
pub use model::{PluginEntry, ResultSnapshot, SnapshotError, TestCaseOutcome};
