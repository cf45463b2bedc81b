//! Pure comparison of two result snapshots.
//!
//! Names are matched as plain strings. A name that occurs once is compared
//! against the first candidate entry of that name. When a name repeats, the
//! k-th baseline occurrence is paired with the k-th candidate occurrence, so
//! a snapshot never differs from itself.

use super::model::{PluginEntry, ResultSnapshot, TestCaseOutcome};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A plugin entry whose plugin count differs between snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedPlugin {
    pub name: String,
    pub baseline_count: usize,
    pub candidate_count: usize,
}

/// Plugin differences for one node present in both snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodePluginDiff {
    pub node: String,
    pub changed: Vec<ChangedPlugin>,
    pub missing_in_candidate: Vec<String>,
}

impl NodePluginDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.missing_in_candidate.is_empty()
    }
}

/// Node-name set differences over the hardware inventories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeSetDiff {
    pub only_in_baseline: Vec<String>,
    pub only_in_candidate: Vec<String>,
}

impl NodeSetDiff {
    pub fn is_empty(&self) -> bool {
        self.only_in_baseline.is_empty() && self.only_in_candidate.is_empty()
    }
}

/// A test case whose status string differs between snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedTestCase {
    pub name: String,
    pub baseline_status: String,
    pub candidate_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestCaseDiff {
    pub changed: Vec<ChangedTestCase>,
    pub missing_in_candidate: Vec<String>,
}

impl TestCaseDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.missing_in_candidate.is_empty()
    }
}

/// The three independent comparisons between a baseline and a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    /// Only nodes with at least one difference are listed.
    pub plugins: Vec<NodePluginDiff>,
    pub nodes: NodeSetDiff,
    pub test_cases: TestCaseDiff,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.nodes.is_empty() && self.test_cases.is_empty()
    }
}

/// Compare `baseline` against `candidate`.
pub fn diff(baseline: &ResultSnapshot, candidate: &ResultSnapshot) -> SnapshotDiff {
    let plugins = baseline
        .cni_plugins
        .iter()
        .filter_map(|(node, entries)| {
            let other = candidate.cni_plugins.get(node)?;
            let (changed, missing_in_candidate) = diff_plugins(entries, other);
            let node_diff = NodePluginDiff {
                node: node.clone(),
                changed,
                missing_in_candidate,
            };
            (!node_diff.is_empty()).then_some(node_diff)
        })
        .collect();

    let baseline_nodes = baseline.node_names();
    let candidate_nodes = candidate.node_names();
    let nodes = NodeSetDiff {
        only_in_baseline: missing(&candidate_nodes, &baseline_nodes),
        only_in_candidate: missing(&baseline_nodes, &candidate_nodes),
    };

    let (changed, missing_in_candidate) = diff_test_cases(&baseline.test_cases, &candidate.test_cases);

    SnapshotDiff {
        plugins,
        nodes,
        test_cases: TestCaseDiff {
            changed,
            missing_in_candidate,
        },
    }
}

/// Compare one node's plugin inventories.
///
/// Returns the changed entries and the names absent from `candidate`. A
/// candidate entry with a `null` plugin list is never reported as changed.
pub fn diff_plugins(
    baseline: &[PluginEntry],
    candidate: &[PluginEntry],
) -> (Vec<ChangedPlugin>, Vec<String>) {
    let mut changed = Vec::new();
    let mut not_found = Vec::new();

    for (entry, other) in pair_by_occurrence(baseline, candidate, |e| e.name.as_str()) {
        match other {
            None => not_found.push(entry.name.clone()),
            Some(other) => {
                if let Some(list) = &other.plugins
                    && list.len() != entry.plugin_count()
                {
                    changed.push(ChangedPlugin {
                        name: entry.name.clone(),
                        baseline_count: entry.plugin_count(),
                        candidate_count: list.len(),
                    });
                }
            }
        }
    }

    (changed, not_found)
}

/// Compare test outcomes by name. Returns changed cases and names absent
/// from `candidate`.
pub fn diff_test_cases(
    baseline: &[TestCaseOutcome],
    candidate: &[TestCaseOutcome],
) -> (Vec<ChangedTestCase>, Vec<String>) {
    let mut changed = Vec::new();
    let mut not_found = Vec::new();

    for (case, other) in pair_by_occurrence(baseline, candidate, |c| c.name.as_str()) {
        match other {
            None => not_found.push(case.name.clone()),
            Some(other) if other.status != case.status => changed.push(ChangedTestCase {
                name: case.name.clone(),
                baseline_status: case.status.clone(),
                candidate_status: other.status.clone(),
            }),
            Some(_) => {}
        }
    }

    (changed, not_found)
}

/// Pair each baseline item with the candidate item holding the same name at
/// the same occurrence index, or `None` when the candidate has fewer.
fn pair_by_occurrence<'a, T>(
    baseline: &'a [T],
    candidate: &'a [T],
    name: impl Fn(&T) -> &str,
) -> Vec<(&'a T, Option<&'a T>)> {
    let mut by_name: HashMap<&str, Vec<&'a T>> = HashMap::new();
    for item in candidate {
        by_name.entry(name(item)).or_default().push(item);
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    baseline
        .iter()
        .map(|item| {
            let key = name(item);
            let index = seen.entry(key).or_insert(0);
            let other = by_name.get(key).and_then(|items| items.get(*index)).copied();
            *index += 1;
            (item, other)
        })
        .collect()
}

/// Elements of `b` that do not occur in `a`, in `b`'s order.
pub fn missing(a: &[String], b: &[String]) -> Vec<String> {
    let present: HashSet<&str> = a.iter().map(String::as_str).collect();
    b.iter()
        .filter(|name| !present.contains(name.as_str()))
        .cloned()
        .collect()
}

impl fmt::Display for SnapshotDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No differences.");
        }

        for node in &self.plugins {
            for name in &node.missing_in_candidate {
                writeln!(f, "node {}: plugin entry {name} missing in candidate", node.node)?;
            }
            for c in &node.changed {
                writeln!(
                    f,
                    "node {}: plugin entry {} changed ({} -> {} plugins)",
                    node.node, c.name, c.baseline_count, c.candidate_count
                )?;
            }
        }

        for node in &self.nodes.only_in_baseline {
            writeln!(f, "node {node} only in baseline")?;
        }
        for node in &self.nodes.only_in_candidate {
            writeln!(f, "node {node} only in candidate")?;
        }

        for name in &self.test_cases.missing_in_candidate {
            writeln!(f, "test {name} missing in candidate")?;
        }
        for c in &self.test_cases.changed {
            writeln!(
                f,
                "test {}: {} -> {}",
                c.name, c.baseline_status, c.candidate_status
            )?;
        }

        Ok(())
    }
}
