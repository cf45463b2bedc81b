//! Folding JUnit report directories into claim files.

use std::path::{Path, PathBuf};

use kcert_common::snapshot::{ClaimError, ResultSnapshot, add_reports};
use kcert_common::{ErrorCode, test_guard};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Shared builders
// ---------------------------------------------------------------------------

fn report(cases: &[(&str, &str)]) -> String {
    let body: String = cases
        .iter()
        .map(|(name, status)| format!("    <testcase name=\"{name}\" status=\"{status}\"/>\n"))
        .collect();
    format!("<testsuites>\n  <testsuite name=\"suite\">\n{body}  </testsuite>\n</testsuites>\n")
}

fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn report_dir(root: &Path, files: &[(&str, String)]) -> PathBuf {
    let dir = root.join("reports");
    std::fs::create_dir(&dir).unwrap();
    for (name, contents) in files {
        std::fs::write(dir.join(name), contents).unwrap();
    }
    dir
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_reports_are_keyed_by_file_stem() {
    let _guard = test_guard!();
    let tmp = tempfile::tempdir().unwrap();
    let claim = tmp.path().join("claim.json");
    write_json(&claim, &json!({"claim": {"nodes": {"nodesHwInfo": {"n1": {}}}}}));
    let dir = report_dir(
        tmp.path(),
        &[
            ("smoke.xml", report(&[("smoke-1", "passed")])),
            (
                "cnf-certification-test.xml",
                report(&[("access-control-ns", "failed"), ("lifecycle-pod-recreation", "passed")]),
            ),
            ("README.md", "ignored".to_string()),
        ],
    );
    std::fs::create_dir(dir.join("nested.xml")).unwrap();

    let update = add_reports(&claim, &dir).unwrap();

    assert_eq!(update.added, vec!["cnf-certification-test", "smoke"]);
    assert!(update.skipped.is_empty());
    assert!(update.changed());

    let doc = read_json(&claim);
    assert_eq!(doc["claim"]["nodes"]["nodesHwInfo"], json!({"n1": {}}));
    assert_eq!(
        doc["claim"]["rawResults"]["smoke"]["testsuites"]["testsuite"]["testcase"]["-name"],
        "smoke-1"
    );

    let snapshot = ResultSnapshot::load(&claim).unwrap();
    let names: Vec<_> = snapshot.test_cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["access-control-ns", "lifecycle-pod-recreation"]);
}

#[test]
fn test_existing_keys_are_skipped_and_file_untouched() {
    let _guard = test_guard!();
    let tmp = tempfile::tempdir().unwrap();
    let claim = tmp.path().join("claim.json");
    write_json(
        &claim,
        &json!({"claim": {"rawResults": {"smoke": {"kept": true}}}}),
    );
    let before = std::fs::read(&claim).unwrap();
    let dir = report_dir(tmp.path(), &[("smoke.xml", "<not-parsed".to_string())]);

    let update = add_reports(&claim, &dir).unwrap();

    assert_eq!(update.skipped, vec!["smoke"]);
    assert!(!update.changed());
    assert_eq!(std::fs::read(&claim).unwrap(), before);
}

#[test]
fn test_second_run_adds_only_new_reports() {
    let _guard = test_guard!();
    let tmp = tempfile::tempdir().unwrap();
    let claim = tmp.path().join("claim.json");
    write_json(&claim, &json!({"claim": {}}));
    let dir = report_dir(tmp.path(), &[("a.xml", report(&[("t1", "passed")]))]);

    add_reports(&claim, &dir).unwrap();
    std::fs::write(dir.join("b.xml"), report(&[("t2", "failed")])).unwrap();
    let update = add_reports(&claim, &dir).unwrap();

    assert_eq!(update.added, vec!["b"]);
    assert_eq!(update.skipped, vec!["a"]);
    let raw = read_json(&claim)["claim"]["rawResults"].clone();
    assert_eq!(raw.as_object().unwrap().len(), 2);
}

#[test]
fn test_malformed_report_leaves_claim_unchanged() {
    let _guard = test_guard!();
    let tmp = tempfile::tempdir().unwrap();
    let claim = tmp.path().join("claim.json");
    write_json(&claim, &json!({"claim": {}}));
    let before = std::fs::read(&claim).unwrap();
    let dir = report_dir(
        tmp.path(),
        &[
            ("a.xml", report(&[("t1", "passed")])),
            ("b.xml", "<testsuites></testsuite>".to_string()),
        ],
    );

    let err = add_reports(&claim, &dir).unwrap_err();

    assert!(matches!(err, ClaimError::Junit { ref path, .. } if path.ends_with("b.xml")));
    assert_eq!(err.error_code(), ErrorCode::JunitParseError);
    assert_eq!(std::fs::read(&claim).unwrap(), before);
}

#[test]
fn test_document_without_claim_object_is_rejected() {
    let _guard = test_guard!();
    let tmp = tempfile::tempdir().unwrap();
    let claim = tmp.path().join("claim.json");
    write_json(&claim, &json!({"nodes": {}}));
    let dir = report_dir(tmp.path(), &[]);

    let err = add_reports(&claim, &dir).unwrap_err();

    assert_eq!(err.error_code(), ErrorCode::SnapshotParseError);
}

#[test]
fn test_missing_report_dir_is_a_read_error() {
    let _guard = test_guard!();
    let tmp = tempfile::tempdir().unwrap();
    let claim = tmp.path().join("claim.json");
    write_json(&claim, &json!({"claim": {}}));

    let err = add_reports(&claim, &tmp.path().join("absent")).unwrap_err();

    assert!(matches!(err, ClaimError::Read { .. }));
    assert_eq!(err.error_code(), ErrorCode::SnapshotReadError);
}
