//! `kcert.toml` loading, environment overrides and validation.

use super::env::{EnvError, EnvParser, parse_duration};
use super::source::{ConfigSource, Sourced};
use crate::errors::ErrorCode;
use crate::types::{TargetPodLabel, WorkloadRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "kcert.toml";

// ── Defaults ────────────────────────────────────────────────────────────────

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(7 * 60);
const DEFAULT_PER_POD_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_CHAOS_TIMEOUT: Duration = Duration::from_secs(3 * 60);
const DEFAULT_OPERATOR_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DEFAULT_EXPERIMENT: &str = "pod-delete";

fn default_ready_timeout() -> Duration {
    DEFAULT_READY_TIMEOUT
}
fn default_per_pod_timeout() -> Duration {
    DEFAULT_PER_POD_TIMEOUT
}
fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}
fn default_chaos_timeout() -> Duration {
    DEFAULT_CHAOS_TIMEOUT
}
fn default_operator_timeout() -> Duration {
    DEFAULT_OPERATOR_TIMEOUT
}
fn default_experiment() -> String {
    DEFAULT_EXPERIMENT.to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid environment overrides: {}", join(.0))]
    Env(Vec<EnvError>),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl ConfigError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::ConfigNotFound,
            Self::Read { .. } => ErrorCode::ConfigReadError,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Env(_) => ErrorCode::ConfigEnvError,
            Self::Invalid(_) => ErrorCode::ConfigValidationError,
        }
    }
}

fn join(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Sections ────────────────────────────────────────────────────────────────

/// `[disruption]`: node drain scenario budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisruptionConfig {
    /// Baseline readiness check before any node is touched.
    #[serde(default = "default_ready_timeout", with = "duration_str")]
    pub ready_timeout: Duration,
    /// Recovery budget per pod deleted from a node.
    #[serde(default = "default_per_pod_timeout", with = "duration_str")]
    pub per_pod_timeout: Duration,
    #[serde(default = "default_poll_interval", with = "duration_str")]
    pub poll_interval: Duration,
    /// Leave DaemonSet and mirror pods alone during a drain.
    #[serde(default = "default_true")]
    pub skip_daemonset_pods: bool,
}

impl Default for DisruptionConfig {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            per_pod_timeout: DEFAULT_PER_POD_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            skip_daemonset_pods: true,
        }
    }
}

/// `[fault_injection]`: chaos engine lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaultInjectionConfig {
    #[serde(default = "default_chaos_timeout", with = "duration_str")]
    pub wait_timeout: Duration,
    #[serde(default = "default_poll_interval", with = "duration_str")]
    pub poll_interval: Duration,
    /// Experiment name expected in engine status and result spec.
    #[serde(default = "default_experiment")]
    pub experiment: String,
    /// Directory with replacement `service-account.yaml`,
    /// `experiment-delete.yaml` and `chaos-engine.yaml` templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
}

impl Default for FaultInjectionConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_CHAOS_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            experiment: default_experiment(),
            templates_dir: None,
        }
    }
}

/// `[operator]`: lifecycle phase wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorConfig {
    #[serde(default = "default_operator_timeout", with = "duration_str")]
    pub timeout: Duration,
    #[serde(default = "default_poll_interval", with = "duration_str")]
    pub poll_interval: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_OPERATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Effective kcert configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KcertConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub disruption: DisruptionConfig,
    #[serde(default)]
    pub fault_injection: FaultInjectionConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    /// Workloads disrupted by `kcert disrupt`, in order.
    #[serde(default)]
    pub targets: Vec<WorkloadRef>,
    #[serde(default)]
    pub target_pod_labels: Vec<TargetPodLabel>,
    /// Origin of each overridable setting, keyed by dotted path.
    #[serde(skip)]
    pub sources: BTreeMap<&'static str, ConfigSource>,
}

impl Default for KcertConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            disruption: DisruptionConfig::default(),
            fault_injection: FaultInjectionConfig::default(),
            operator: OperatorConfig::default(),
            targets: Vec::new(),
            target_pod_labels: Vec::new(),
            sources: BTreeMap::new(),
        }
    }
}

/// Dotted keys whose source is tracked, with their TOML location.
const TRACKED_KEYS: &[(&str, &str, &str)] = &[
    ("log_level", "", "log_level"),
    ("disruption.ready_timeout", "disruption", "ready_timeout"),
    ("disruption.per_pod_timeout", "disruption", "per_pod_timeout"),
    ("disruption.poll_interval", "disruption", "poll_interval"),
    ("fault_injection.wait_timeout", "fault_injection", "wait_timeout"),
    ("fault_injection.poll_interval", "fault_injection", "poll_interval"),
    ("fault_injection.templates_dir", "fault_injection", "templates_dir"),
    ("operator.timeout", "operator", "timeout"),
    ("operator.poll_interval", "operator", "poll_interval"),
];

impl KcertConfig {
    /// Load configuration the way the CLI does.
    ///
    /// An explicit `path` must exist. Without one, `kcert.toml` in the
    /// working directory is used if present, otherwise built-in defaults.
    /// `KCERT_*` overrides are applied on top and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf())),
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::with_default_sources(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        // Keys present in the file are attributed to it; parse already succeeded.
        let table: toml::Table = toml::from_str(&contents).unwrap_or_default();
        for &(key, section, field) in TRACKED_KEYS {
            let present = if section.is_empty() {
                table.contains_key(field)
            } else {
                table
                    .get(section)
                    .and_then(|s| s.as_table())
                    .is_some_and(|s| s.contains_key(field))
            };
            if present {
                config
                    .sources
                    .insert(key, ConfigSource::File(path.to_path_buf()));
            }
        }

        debug!(path = %path.display(), targets = config.targets.len(), "Loaded configuration file");
        Ok(config)
    }

    /// Parse TOML text; every tracked key is marked as a default.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(contents)?;
        config.mark_defaults();
        Ok(config)
    }

    fn with_default_sources() -> Self {
        let mut config = Self::default();
        config.mark_defaults();
        config
    }

    fn mark_defaults(&mut self) {
        for &(key, _, _) in TRACKED_KEYS {
            self.sources.entry(key).or_insert(ConfigSource::Default);
        }
    }

    /// Apply `KCERT_*` overrides. All bad values are reported together.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let mut parser = EnvParser::new();

        let ready = parser.get_duration("READY_TIMEOUT", self.disruption.ready_timeout);
        self.set_duration("disruption.ready_timeout", ready);
        let per_pod = parser.get_duration("PER_POD_TIMEOUT", self.disruption.per_pod_timeout);
        self.set_duration("disruption.per_pod_timeout", per_pod);
        let chaos = parser.get_duration("CHAOS_TIMEOUT", self.fault_injection.wait_timeout);
        self.set_duration("fault_injection.wait_timeout", chaos);
        let operator = parser.get_duration("OPERATOR_TIMEOUT", self.operator.timeout);
        self.set_duration("operator.timeout", operator);

        // One variable drives every poll interval.
        let interval = parser.get_duration("POLL_INTERVAL", self.disruption.poll_interval);
        if !interval.is_default() {
            for key in [
                "disruption.poll_interval",
                "fault_injection.poll_interval",
                "operator.poll_interval",
            ] {
                self.set_duration(key, interval.clone());
            }
        }

        let level = parser.get_log_level("LOG_LEVEL", &self.log_level);
        if !level.is_default() {
            self.sources.insert("log_level", level.source);
            self.log_level = level.value;
        }

        let templates = parser.get_optional_string("TEMPLATES_DIR");
        if let Some(dir) = templates.value {
            self.fault_injection.templates_dir = Some(PathBuf::from(dir));
            self.sources
                .insert("fault_injection.templates_dir", ConfigSource::Environment);
        }

        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }
        Ok(())
    }

    fn set_duration(&mut self, key: &'static str, value: Sourced<Duration>) {
        if value.is_default() {
            return;
        }
        let slot = match key {
            "disruption.ready_timeout" => &mut self.disruption.ready_timeout,
            "disruption.per_pod_timeout" => &mut self.disruption.per_pod_timeout,
            "disruption.poll_interval" => &mut self.disruption.poll_interval,
            "fault_injection.wait_timeout" => &mut self.fault_injection.wait_timeout,
            "fault_injection.poll_interval" => &mut self.fault_injection.poll_interval,
            "operator.timeout" => &mut self.operator.timeout,
            "operator.poll_interval" => &mut self.operator.poll_interval,
            _ => return,
        };
        *slot = value.value;
        self.sources.insert(key, value.source);
    }

    /// Override the target list from the command line.
    pub fn set_targets_from_cli(&mut self, targets: Vec<WorkloadRef>) {
        if !targets.is_empty() {
            self.targets = targets;
        }
    }

    /// Source of a tracked setting (`None` for untracked keys).
    pub fn source_of(&self, key: &str) -> Option<&ConfigSource> {
        self.sources.get(key)
    }

    /// Reject settings the engine cannot run with. All problems are reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let waits = [
            ("disruption.ready_timeout", self.disruption.ready_timeout, self.disruption.poll_interval),
            ("disruption.per_pod_timeout", self.disruption.per_pod_timeout, self.disruption.poll_interval),
            ("fault_injection.wait_timeout", self.fault_injection.wait_timeout, self.fault_injection.poll_interval),
            ("operator.timeout", self.operator.timeout, self.operator.poll_interval),
        ];
        for (name, deadline, interval) in waits {
            if interval.is_zero() {
                problems.push(format!("poll interval for {name} must be non-zero"));
            } else if interval > deadline {
                problems.push(format!(
                    "poll interval {} exceeds {name} {}",
                    humantime::format_duration(interval),
                    humantime::format_duration(deadline)
                ));
            }
        }

        if self.fault_injection.experiment.trim().is_empty() {
            problems.push("fault_injection.experiment must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target) {
                problems.push(format!("duplicate target {target}"));
            }
        }

        for label in &self.target_pod_labels {
            if label.name.trim().is_empty() {
                problems.push("target_pod_labels entry with empty name".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

/// Serde adapter for humantime duration strings (`"90s"`, `"7m"`).
/// Integers are accepted as seconds.
mod duration_str {
    use super::parse_duration;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;
    use crate::types::WorkloadKind;
    use std::io::Write;

    const SAMPLE: &str = r#"
log_level = "debug"

[disruption]
ready_timeout = "5m"
per_pod_timeout = 90

[fault_injection]
experiment = "pod-delete"

[[targets]]
namespace = "tnf"
name = "test"
kind = "deployment"

[[targets]]
namespace = "tnf"
name = "db"
kind = "statefulset"

[[target_pod_labels]]
prefix = "test-network-function.com"
name = "generic"
value = "target"
"#;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = KcertConfig::default();
        assert_eq!(config.disruption.ready_timeout, Duration::from_secs(420));
        assert_eq!(config.disruption.per_pod_timeout, Duration::from_secs(60));
        assert_eq!(config.disruption.poll_interval, Duration::from_secs(1));
        assert!(config.disruption.skip_daemonset_pods);
        assert_eq!(config.fault_injection.experiment, "pod-delete");
        assert_eq!(config.operator.timeout, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let config = KcertConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.disruption.ready_timeout, Duration::from_secs(300));
        assert_eq!(config.disruption.per_pod_timeout, Duration::from_secs(90));
        assert_eq!(config.disruption.poll_interval, Duration::from_secs(1));
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets[1].kind, WorkloadKind::StatefulSet);
        assert_eq!(config.target_pod_labels[0].key(), "test-network-function.com/generic");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = KcertConfig::from_toml_str("[disruption]\nready_timeot = \"1m\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_from_file_tracks_sources() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = KcertConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.source_of("disruption.ready_timeout"),
            Some(&ConfigSource::File(file.path().to_path_buf()))
        );
        assert_eq!(
            config.source_of("disruption.poll_interval"),
            Some(&ConfigSource::Default)
        );
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = KcertConfig::load(Some(Path::new("/nonexistent/kcert.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert_eq!(err.error_code(), ErrorCode::ConfigNotFound);
    }

    #[test]
    fn test_parse_error_maps_to_code() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[disruption\n").unwrap();
        let err = KcertConfig::from_file(file.path()).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ConfigParseError);
    }

    #[test]
    fn test_validate_rejects_zero_and_oversized_intervals() {
        let mut config = KcertConfig::default();
        config.disruption.poll_interval = Duration::ZERO;
        config.operator.poll_interval = Duration::from_secs(600);

        let Err(ConfigError::Invalid(problems)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(problems.iter().any(|p| p.contains("must be non-zero")));
        assert!(problems.iter().any(|p| p.contains("operator.timeout")));
    }

    #[test]
    fn test_validate_rejects_duplicate_targets() {
        let mut config = KcertConfig::default();
        config.targets = vec![
            WorkloadRef::deployment("tnf", "test"),
            WorkloadRef::deployment("tnf", "test"),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate target deployment tnf/test"));
    }

    #[test]
    fn test_env_overrides_and_sources() {
        let _lock = env_test_lock();
        // SAFETY: env mutation is serialized by env_test_lock
        unsafe {
            std::env::set_var("KCERT_PER_POD_TIMEOUT", "2m");
            std::env::set_var("KCERT_POLL_INTERVAL", "5s");
        }

        let mut config = KcertConfig::with_default_sources();
        let result = config.apply_env();

        // SAFETY: as above
        unsafe {
            std::env::remove_var("KCERT_PER_POD_TIMEOUT");
            std::env::remove_var("KCERT_POLL_INTERVAL");
        }

        result.unwrap();
        assert_eq!(config.disruption.per_pod_timeout, Duration::from_secs(120));
        assert_eq!(config.operator.poll_interval, Duration::from_secs(5));
        assert_eq!(
            config.source_of("disruption.per_pod_timeout"),
            Some(&ConfigSource::Environment)
        );
        assert_eq!(
            config.source_of("disruption.ready_timeout"),
            Some(&ConfigSource::Default)
        );
    }

    #[test]
    fn test_env_errors_aggregate() {
        let _lock = env_test_lock();
        // SAFETY: env mutation is serialized by env_test_lock
        unsafe {
            std::env::set_var("KCERT_READY_TIMEOUT", "forever");
            std::env::set_var("KCERT_LOG_LEVEL", "chatty");
        }

        let mut config = KcertConfig::default();
        let result = config.apply_env();

        // SAFETY: as above
        unsafe {
            std::env::remove_var("KCERT_READY_TIMEOUT");
            std::env::remove_var("KCERT_LOG_LEVEL");
        }

        let Err(ConfigError::Env(errors)) = result else {
            panic!("expected env errors");
        };
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_serialize_writes_durations_as_text() {
        let text = toml::to_string(&DisruptionConfig::default()).unwrap();
        assert!(text.contains("ready_timeout = \"7m\""));
        let back: DisruptionConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, DisruptionConfig::default());
    }
}
