//! Structured JSONL logging for test runs.
//!
//! Each guarded test writes `target/test-logs/<test>.jsonl`, and every tracing
//! event emitted while tests run is mirrored into `all_tests.jsonl`. Useful when
//! a poll loop in an engine test times out and the only evidence is the
//! sequence of condition checks.
//!
//! ```ignore
//! use kcert_common::test_guard;
//!
//! #[tokio::test]
//! async fn test_node_cycle() {
//!     let _guard = test_guard!();
//!     // ...
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use std::time::Instant;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

/// Test execution phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Setup,
    Execute,
    Verify,
    Teardown,
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "setup"),
            Self::Execute => write!(f, "execute"),
            Self::Verify => write!(f, "verify"),
            Self::Teardown => write!(f, "teardown"),
        }
    }
}

static GLOBAL_LOGGING_INIT: Once = Once::new();

/// Install a global subscriber that writes JSON events to
/// `target/test-logs/all_tests.jsonl` and compact text to the test writer.
///
/// Safe to call from every test; only the first call installs anything.
///
/// - `KCERT_TEST_LOG_FILE` overrides the aggregate file path.
/// - `KCERT_TEST_LOG_LEVEL` sets the level for kcert targets (default `debug`).
pub fn init_global_test_logging() {
    GLOBAL_LOGGING_INIT.call_once(|| {
        let file_layer = create_global_log_file().map(|file| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_file(true)
                .with_line_number(true)
        });

        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_target(true)
            .compact();

        let level = std::env::var("KCERT_TEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let filter = tracing_subscriber::EnvFilter::try_new(format!(
            "kcert={level},kcert_engine={level},kcert_common={level}"
        ))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stderr_layer);

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn create_global_log_file() -> Option<std::fs::File> {
    if let Ok(custom_path) = std::env::var("KCERT_TEST_LOG_FILE") {
        if let Some(parent) = PathBuf::from(&custom_path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        return std::fs::File::create(&custom_path).ok();
    }

    let log_dir = test_log_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    std::fs::File::create(log_dir.join("all_tests.jsonl")).ok()
}

/// `<target>/test-logs`, searching upward from the current directory.
fn test_log_dir() -> PathBuf {
    if let Ok(target_dir) = std::env::var("CARGO_TARGET_DIR") {
        return PathBuf::from(target_dir).join("test-logs");
    }

    let mut cwd = std::env::current_dir().unwrap_or_default();
    loop {
        let target = cwd.join("target");
        if target.is_dir() {
            return target.join("test-logs");
        }
        if !cwd.pop() {
            return PathBuf::from("target/test-logs");
        }
    }
}

/// One line of a per-test JSONL log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLogEntry {
    pub timestamp: String,
    pub test_name: String,
    pub phase: TestPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl TestLogEntry {
    pub fn new(test_name: &str, phase: TestPhase, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            test_name: test_name.to_string(),
            phase,
            message: message.into(),
            data: None,
            duration_ms: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Per-test JSONL writer.
pub struct TestLogger {
    test_name: String,
    start_time: Instant,
    log_file: Option<Mutex<std::fs::File>>,
}

impl TestLogger {
    pub fn for_test(test_name: &str) -> Self {
        let log_file = Self::create_log_file(test_name).ok();

        let logger = Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
            log_file: log_file.map(Mutex::new),
        };
        logger.log(TestPhase::Setup, "TEST START");
        logger
    }

    fn create_log_file(test_name: &str) -> std::io::Result<std::fs::File> {
        let log_dir = test_log_dir();
        std::fs::create_dir_all(&log_dir)?;

        let safe_name = test_name.replace("::", "_").replace(['/', '\\'], "_");
        std::fs::File::create(log_dir.join(format!("{safe_name}.jsonl")))
    }

    pub fn log(&self, phase: TestPhase, message: impl Into<String>) {
        let entry = TestLogEntry::new(&self.test_name, phase, message)
            .with_duration(self.elapsed_ms());
        self.write_entry(&entry);
    }

    fn log_with_data(&self, phase: TestPhase, message: impl Into<String>, data: serde_json::Value) {
        let entry = TestLogEntry::new(&self.test_name, phase, message)
            .with_duration(self.elapsed_ms())
            .with_data(data);
        self.write_entry(&entry);
    }

    fn write_entry(&self, entry: &TestLogEntry) {
        if let Some(file) = &self.log_file
            && let Ok(mut f) = file.lock()
            && let Ok(json) = serde_json::to_string(entry)
        {
            let _ = writeln!(f, "{json}");
        }

        tracing::info!(
            test = %self.test_name,
            phase = %entry.phase,
            duration_ms = entry.duration_ms,
            "{}",
            entry.message
        );
    }

    pub fn pass(self) {
        self.log(TestPhase::Verify, "TEST PASS");
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.log_with_data(
            TestPhase::Verify,
            "TEST FAIL",
            serde_json::json!({ "reason": reason.into() }),
        );
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

/// Logs TEST START on creation and TEST PASS / TEST FAIL on drop.
///
/// Enabled with `KCERT_TEST_LOGGING=1`, or by default when `CI` is set.
/// `KCERT_TEST_LOGGING=0` forces it off. Disabled guards are no-ops.
pub struct TestGuard {
    inner: Option<TestLogger>,
}

impl TestGuard {
    pub fn new(test_name: &str) -> Self {
        Self {
            inner: if Self::is_enabled() {
                init_global_test_logging();
                Some(TestLogger::for_test(test_name))
            } else {
                None
            },
        }
    }

    fn is_enabled() -> bool {
        match std::env::var("KCERT_TEST_LOGGING").as_deref() {
            Ok("1" | "true") => true,
            Ok("0" | "false") => false,
            _ => std::env::var("CI").is_ok(),
        }
    }
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        if let Some(logger) = self.inner.take() {
            if std::thread::panicking() {
                logger.fail("test panicked");
            } else {
                logger.pass();
            }
        }
    }
}

/// Create a [`TestGuard`] named after the enclosing test function.
#[macro_export]
macro_rules! test_guard {
    () => {{
        fn _f() {}
        fn _type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = _type_name_of(_f);
        let name = name.strip_suffix("::_f").unwrap_or(name);
        let name = name.rsplit("::").next().unwrap_or(name);
        $crate::testing::TestGuard::new(name)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_serializes_correctly() {
        let entry = TestLogEntry::new("test_example", TestPhase::Execute, "cordon node-1")
            .with_duration(42)
            .with_data(serde_json::json!({"node": "node-1"}));

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("test_example"));
        assert!(json.contains("\"execute\""));
        assert!(json.contains("cordon node-1"));
        assert!(json.contains("42"));
        assert!(json.contains("node-1"));
    }

    #[test]
    fn test_logger_writes_jsonl_lines_in_order() {
        let name = "test_logger_writes_jsonl_lines_in_order";
        let logger = TestLogger::for_test(name);
        logger.log(TestPhase::Execute, "first");
        logger.fail("boom");

        let path = test_log_dir().join(format!("{name}.jsonl"));
        let text = std::fs::read_to_string(path).unwrap();
        let entries: Vec<TestLogEntry> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "TEST START");
        assert_eq!(entries[1].message, "first");
        assert_eq!(entries[2].phase, TestPhase::Verify);
        assert_eq!(entries[2].data, Some(serde_json::json!({"reason": "boom"})));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(TestPhase::Setup.to_string(), "setup");
        assert_eq!(TestPhase::Teardown.to_string(), "teardown");
    }

    #[test]
    fn test_guard_disabled_is_noop() {
        drop(TestGuard { inner: None });
    }

    #[test]
    fn test_guard_macro_names_test() {
        let _guard = crate::test_guard!();
    }
}
