//! Snapshot comparison scenarios over claim documents.
//!
//! Covers plugin inventory changes, node set drift, test outcome changes,
//! loading from files, and diff(A, A) being empty for generated snapshots,
//! including ones with repeated names.

use kcert_common::snapshot::{
    ChangedPlugin, ChangedTestCase, PluginEntry, ResultSnapshot, TestCaseOutcome, diff,
};
use kcert_common::test_guard;
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Write;

// ---------------------------------------------------------------------------
// Shared builders
// ---------------------------------------------------------------------------

fn snapshot_with_plugins(node: &str, entries: Vec<PluginEntry>) -> ResultSnapshot {
    let mut snap = ResultSnapshot::default();
    snap.cni_plugins.insert(node.to_string(), entries);
    snap
}

fn snapshot_with_cases(cases: &[(&str, &str)]) -> ResultSnapshot {
    ResultSnapshot {
        test_cases: cases
            .iter()
            .map(|(n, s)| TestCaseOutcome::new(*n, *s))
            .collect(),
        ..ResultSnapshot::default()
    }
}

fn write_claim(doc: serde_json::Value) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp claim");
    file.write_all(doc.to_string().as_bytes())
        .expect("write temp claim");
    file
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_plugin_length_change_reported() {
    let _guard = test_guard!();
    let a = snapshot_with_plugins(
        "n1",
        vec![PluginEntry::new("flannel", vec![json!("p1"), json!("p2")])],
    );
    let b = snapshot_with_plugins("n1", vec![PluginEntry::new("flannel", vec![json!("p1")])]);

    let d = diff(&a, &b);

    assert_eq!(d.plugins.len(), 1);
    assert_eq!(d.plugins[0].node, "n1");
    assert_eq!(
        d.plugins[0].changed,
        vec![ChangedPlugin {
            name: "flannel".into(),
            baseline_count: 2,
            candidate_count: 1,
        }]
    );
    assert!(d.plugins[0].missing_in_candidate.is_empty());
}

#[test]
fn test_plugin_missing_in_candidate() {
    let _guard = test_guard!();
    let a = snapshot_with_plugins(
        "n1",
        vec![
            PluginEntry::new("flannel", vec![json!("p1")]),
            PluginEntry::new("multus", vec![json!("p1")]),
        ],
    );
    let b = snapshot_with_plugins("n1", vec![PluginEntry::new("flannel", vec![json!("p9")])]);

    let d = diff(&a, &b);

    assert_eq!(d.plugins[0].missing_in_candidate, vec!["multus".to_string()]);
    assert!(d.plugins[0].changed.is_empty());
}

#[test]
fn test_test_case_changed_and_missing() {
    let _guard = test_guard!();
    let a = snapshot_with_cases(&[("t1", "passed"), ("t2", "passed")]);
    let b = snapshot_with_cases(&[("t1", "failed")]);

    let d = diff(&a, &b);

    assert_eq!(
        d.test_cases.changed,
        vec![ChangedTestCase {
            name: "t1".into(),
            baseline_status: "passed".into(),
            candidate_status: "failed".into(),
        }]
    );
    assert_eq!(d.test_cases.missing_in_candidate, vec!["t2".to_string()]);
}

#[test]
fn test_node_set_diff_both_directions() {
    let _guard = test_guard!();
    let mut a = ResultSnapshot::default();
    let mut b = ResultSnapshot::default();
    for n in ["master-0", "worker-0", "worker-1"] {
        a.hw_info.insert(n.into(), json!({"cpu": 8}));
    }
    for n in ["master-0", "worker-1", "worker-2"] {
        b.hw_info.insert(n.into(), json!({"cpu": 8}));
    }

    let d = diff(&a, &b);

    assert_eq!(d.nodes.only_in_baseline, vec!["worker-0".to_string()]);
    assert_eq!(d.nodes.only_in_candidate, vec!["worker-2".to_string()]);
}

#[test]
fn test_compare_claim_files() {
    let _guard = test_guard!();
    let baseline = write_claim(json!({
        "claim": {
            "nodes": {
                "cniPlugins": {"n1": [{"name": "ovn", "plugins": [{"type": "ovn-k8s-cni-overlay"}]}]},
                "nodesHwInfo": {"n1": {}}
            },
            "rawResults": {"cnf-certification-test": {"testsuites": {"testsuite": {"testcase": [
                {"-name": "lifecycle-pod-recreation", "-status": "passed"}
            ]}}}}
        }
    }));
    let candidate = write_claim(json!({
        "claim": {
            "nodes": {
                "cniPlugins": {"n1": [{"name": "ovn", "plugins": [{"type": "a"}, {"type": "b"}]}]},
                "nodesHwInfo": {"n1": {}, "n2": {}}
            },
            "rawResults": {"cnf-certification-test": {"testsuites": {"testsuite": {"testcase": [
                {"-name": "lifecycle-pod-recreation", "-status": "failed"}
            ]}}}}
        }
    }));

    let a = ResultSnapshot::load(baseline.path()).expect("load baseline");
    let b = ResultSnapshot::load(candidate.path()).expect("load candidate");
    let d = diff(&a, &b);

    assert_eq!(d.plugins[0].changed[0].candidate_count, 2);
    assert_eq!(d.nodes.only_in_candidate, vec!["n2".to_string()]);
    assert_eq!(d.test_cases.changed[0].name, "lifecycle-pod-recreation");

    let rendered = serde_json::to_value(&d).expect("serialize diff");
    assert_eq!(rendered["nodes"]["only_in_candidate"][0], "n2");
}

#[test]
fn test_claim_with_repeated_test_names_equals_itself() {
    let _guard = test_guard!();
    let a = snapshot_with_cases(&[("t1", "passed"), ("t1", "failed"), ("t2", "passed")]);

    let d = diff(&a, &a);

    assert!(d.is_empty(), "unexpected differences: {d}");
    assert_eq!(d.to_string(), "No differences.\n");
}

#[test]
fn test_extra_baseline_occurrence_is_missing_in_candidate() {
    let _guard = test_guard!();
    let a = snapshot_with_cases(&[("t1", "passed"), ("t1", "passed")]);
    let b = snapshot_with_cases(&[("t1", "passed")]);

    let d = diff(&a, &b);

    assert!(d.test_cases.changed.is_empty());
    assert_eq!(d.test_cases.missing_in_candidate, vec!["t1".to_string()]);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

fn arb_snapshot() -> impl Strategy<Value = ResultSnapshot> {
    let plugins = prop::collection::btree_map(
        "[a-z]{1,6}",
        // Names come from a small pool so entries repeat within a node.
        prop::collection::vec(
            (
                "p[0-2]",
                prop::option::of(prop::collection::vec(any::<u8>(), 0..4)),
            ),
            0..6,
        ),
        0..4,
    );
    let hw = prop::collection::btree_set("[a-z0-9-]{1,10}", 0..6);
    let cases = prop::collection::vec(
        (
            "t[0-3]",
            prop::sample::select(vec!["passed", "failed", "skipped"]),
        ),
        0..10,
    );

    (plugins, hw, cases).prop_map(|(plugins, hw, cases)| ResultSnapshot {
        cni_plugins: plugins
            .into_iter()
            .map(|(node, entries)| {
                let entries = entries
                    .into_iter()
                    .map(|(name, list)| PluginEntry {
                        name,
                        plugins: list.map(|l| l.into_iter().map(|b| json!(b)).collect()),
                    })
                    .collect();
                (node, entries)
            })
            .collect(),
        hw_info: hw
            .into_iter()
            .map(|n| (n, json!({})))
            .collect::<BTreeMap<_, _>>(),
        test_cases: cases
            .into_iter()
            .map(|(n, s)| TestCaseOutcome::new(n, s))
            .collect(),
    })
}

proptest! {
    #[test]
    fn prop_diff_with_self_is_empty(snap in arb_snapshot()) {
        let d = diff(&snap, &snap);
        prop_assert!(d.is_empty(), "unexpected differences: {d}");
    }

    #[test]
    fn prop_node_diff_is_mirror(a in arb_snapshot(), b in arb_snapshot()) {
        let ab = diff(&a, &b);
        let ba = diff(&b, &a);
        prop_assert_eq!(ab.nodes.only_in_baseline, ba.nodes.only_in_candidate);
        prop_assert_eq!(ab.nodes.only_in_candidate, ba.nodes.only_in_baseline);
    }
}
