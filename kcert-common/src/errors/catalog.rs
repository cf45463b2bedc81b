//! Error catalog for kcert.
//!
//! Every failure that reaches an operator carries a stable code
//! (`KCERT-E001`...) so reports from different runs can be grouped and
//! searched. Each code has a message and remediation steps.
//!
//! # Error Code Ranges
//!
//! | Range      | Category       | Description                               |
//! |------------|----------------|-------------------------------------------|
//! | E001-E099  | Config         | Configuration file and environment        |
//! | E100-E199  | Cluster        | API server access, discovery, decoding    |
//! | E200-E299  | Disruption     | Cordon / drain / recovery of workloads    |
//! | E300-E399  | FaultInjection | Chaos engine lifecycle and verdicts       |
//! | E400-E499  | Operator       | Operator lifecycle phase waits            |
//! | E500-E599  | Snapshot       | Claim loading, comparison and JUnit merge |
//! | E900-E999  | Internal       | Unexpected internal errors                |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes for every kcert failure scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Configuration file not found
    ConfigNotFound,
    /// Configuration file could not be read
    ConfigReadError,
    /// Configuration file contains invalid TOML syntax
    ConfigParseError,
    /// Configuration contains invalid values
    ConfigValidationError,
    /// Environment variable has invalid value
    ConfigEnvError,
    /// No workloads configured for disruption
    ConfigNoTargets,

    // =========================================================================
    // Cluster Errors (E100-E199)
    // =========================================================================
    /// Could not build a client or reach the API server
    ClusterUnreachable,
    /// API server rejected a request
    ClusterApiError,
    /// Requested object does not exist
    ClusterResourceNotFound,
    /// Kind could not be resolved through discovery
    ClusterDiscoveryFailed,
    /// Object returned by the API server could not be decoded
    ClusterDecodeError,

    // =========================================================================
    // Disruption Errors (E200-E299)
    // =========================================================================
    /// Workload was not ready before the disruption started
    WorkloadNotReady,
    /// Node could not be cordoned
    NodeCordonFailed,
    /// Node could not be uncordoned after a drain
    NodeUncordonFailed,
    /// Pod deletion failed during a drain
    PodDeleteFailed,
    /// Workload did not recover within the node budget
    RecoveryTimeout,

    // =========================================================================
    // Fault Injection Errors (E300-E399)
    // =========================================================================
    /// Template could not be rendered or decoded
    TemplateRenderFailed,
    /// Fault-injection resource could not be created
    ResourceCreateFailed,
    /// Chaos engine did not complete within the deadline
    ChaosEngineTimeout,
    /// More than one engine or result instance exists
    ChaosMultipleInstances,
    /// No result instance exists
    ChaosNoResult,
    /// Engine or result status could not be parsed
    ChaosStatusParse,
    /// Experiment verdict was not Pass
    ChaosVerdictFail,
    /// One or more teardown deletions failed
    ChaosCleanupFailed,

    // =========================================================================
    // Operator Errors (E400-E499)
    // =========================================================================
    /// Operator lifecycle object reached Failed or Unknown
    OperatorPhaseFailed,
    /// Operator lifecycle object did not reach a terminal phase in time
    OperatorPhaseTimeout,
    /// Operator lifecycle object could not be read
    OperatorFetchFailed,
    /// Operator lifecycle object has a malformed phase
    OperatorPhaseParse,

    // =========================================================================
    // Snapshot Errors (E500-E599)
    // =========================================================================
    /// Snapshot file could not be read
    SnapshotReadError,
    /// Snapshot file is not a valid claim document
    SnapshotParseError,
    /// Claim file could not be written back
    SnapshotWriteError,
    /// JUnit XML report could not be converted
    JunitParseError,

    // =========================================================================
    // Internal Errors (E900-E999)
    // =========================================================================
    /// Unexpected internal error
    InternalError,
    /// Logging subsystem failed to initialise
    InternalLoggingError,
}

impl ErrorCode {
    /// Returns the numeric error code (without prefix).
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            Self::ConfigNotFound => 1,
            Self::ConfigReadError => 2,
            Self::ConfigParseError => 3,
            Self::ConfigValidationError => 4,
            Self::ConfigEnvError => 5,
            Self::ConfigNoTargets => 6,

            Self::ClusterUnreachable => 100,
            Self::ClusterApiError => 101,
            Self::ClusterResourceNotFound => 102,
            Self::ClusterDiscoveryFailed => 103,
            Self::ClusterDecodeError => 104,

            Self::WorkloadNotReady => 200,
            Self::NodeCordonFailed => 201,
            Self::NodeUncordonFailed => 202,
            Self::PodDeleteFailed => 203,
            Self::RecoveryTimeout => 204,

            Self::TemplateRenderFailed => 300,
            Self::ResourceCreateFailed => 301,
            Self::ChaosEngineTimeout => 302,
            Self::ChaosMultipleInstances => 303,
            Self::ChaosNoResult => 304,
            Self::ChaosStatusParse => 305,
            Self::ChaosVerdictFail => 306,
            Self::ChaosCleanupFailed => 307,

            Self::OperatorPhaseFailed => 400,
            Self::OperatorPhaseTimeout => 401,
            Self::OperatorFetchFailed => 402,
            Self::OperatorPhaseParse => 403,

            Self::SnapshotReadError => 500,
            Self::SnapshotParseError => 501,
            Self::SnapshotWriteError => 502,
            Self::JunitParseError => 503,

            Self::InternalError => 900,
            Self::InternalLoggingError => 901,
        }
    }

    /// Returns the formatted error code string (e.g., "KCERT-E001").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("KCERT-E{:03}", self.code_number())
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Cluster,
            200..=299 => ErrorCategory::Disruption,
            300..=399 => ErrorCategory::FaultInjection,
            400..=499 => ErrorCategory::Operator,
            500..=599 => ErrorCategory::Snapshot,
            _ => ErrorCategory::Internal,
        }
    }

    /// Returns the full error entry with all metadata.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigNotFound => "Configuration file not found",
            Self::ConfigReadError => "Failed to read configuration file",
            Self::ConfigParseError => "Configuration file contains invalid TOML syntax",
            Self::ConfigValidationError => "Configuration contains invalid values",
            Self::ConfigEnvError => "Environment variable has an invalid value",
            Self::ConfigNoTargets => "No workloads configured for disruption",

            Self::ClusterUnreachable => "Could not connect to the Kubernetes API server",
            Self::ClusterApiError => "Kubernetes API server rejected the request",
            Self::ClusterResourceNotFound => "Requested cluster object does not exist",
            Self::ClusterDiscoveryFailed => "Resource kind could not be resolved via discovery",
            Self::ClusterDecodeError => "Cluster object could not be decoded",

            Self::WorkloadNotReady => "Workload is not in a good starting state",
            Self::NodeCordonFailed => "Failed to cordon node",
            Self::NodeUncordonFailed => "Failed to uncordon node; node left unschedulable",
            Self::PodDeleteFailed => "Failed to delete pod during drain",
            Self::RecoveryTimeout => "Workload did not recover after node drain",

            Self::TemplateRenderFailed => "Fault-injection template could not be rendered",
            Self::ResourceCreateFailed => "Fault-injection resource could not be created",
            Self::ChaosEngineTimeout => "Chaos engine did not complete in time",
            Self::ChaosMultipleInstances => "More than one chaos engine or result instance found",
            Self::ChaosNoResult => "No chaos result instance found",
            Self::ChaosStatusParse => "Chaos engine or result status is malformed",
            Self::ChaosVerdictFail => "Chaos experiment verdict was not Pass",
            Self::ChaosCleanupFailed => "Some fault-injection resources could not be deleted",

            Self::OperatorPhaseFailed => "Operator installation reached a failed phase",
            Self::OperatorPhaseTimeout => "Operator installation did not finish in time",
            Self::OperatorFetchFailed => "Operator lifecycle object could not be read",
            Self::OperatorPhaseParse => "Operator lifecycle object has a malformed status.phase",

            Self::SnapshotReadError => "Failed to read snapshot file",
            Self::SnapshotParseError => "Snapshot file is not a valid claim document",
            Self::SnapshotWriteError => "Failed to write claim file",
            Self::JunitParseError => "JUnit XML report could not be converted",

            Self::InternalError => "Unexpected internal error",
            Self::InternalLoggingError => "Failed to initialise logging",
        }
    }

    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigNotFound => &[
                "Pass --config with the path to a kcert.toml file",
                "Run without --config to use built-in defaults",
            ],
            Self::ConfigReadError => &["Check file permissions on the configuration file"],
            Self::ConfigParseError => &[
                "Check the TOML syntax near the reported line",
                "Durations must be quoted strings such as \"90s\" or \"7m\"",
            ],
            Self::ConfigValidationError => &[
                "Poll intervals must be non-zero and shorter than their deadline",
                "Each [[targets]] entry must be unique",
            ],
            Self::ConfigEnvError => &[
                "Check KCERT_* environment variables for typos",
                "Durations use humantime syntax, e.g. KCERT_READY_TIMEOUT=7m",
            ],
            Self::ConfigNoTargets => &[
                "Add [[targets]] entries to the configuration file",
                "Or pass --target namespace/kind/name on the command line",
            ],

            Self::ClusterUnreachable => &[
                "Check KUBECONFIG or in-cluster service account credentials",
                "Verify the API server is reachable: kubectl cluster-info",
            ],
            Self::ClusterApiError => &[
                "Check that the service account has RBAC for the requested verb",
                "Inspect the API server message included in the error",
            ],
            Self::ClusterResourceNotFound => &["Verify namespace and object name"],
            Self::ClusterDiscoveryFailed => &[
                "Check that the CRD for the kind is installed: kubectl api-resources",
            ],
            Self::ClusterDecodeError => &[
                "Check that the API server version is supported",
            ],

            Self::WorkloadNotReady => &[
                "Wait for the workload to become ready before certifying it",
                "kubectl rollout status on the workload shows what is pending",
            ],
            Self::NodeCordonFailed => &["Check RBAC for patching nodes"],
            Self::NodeUncordonFailed => &[
                "Uncordon the node manually: kubectl uncordon <node>",
                "Check RBAC for patching nodes",
            ],
            Self::PodDeleteFailed => &["Check RBAC for deleting pods in the workload namespace"],
            Self::RecoveryTimeout => &[
                "Check that other nodes have capacity for the rescheduled pods",
                "Increase disruption.per_pod_timeout for slow-starting workloads",
            ],

            Self::TemplateRenderFailed => &[
                "Check custom templates in fault_injection.templates_dir",
            ],
            Self::ResourceCreateFailed => &[
                "Check that the litmus CRDs are installed",
                "Remove leftovers from a previous run: kubectl delete chaosengine engine-test",
            ],
            Self::ChaosEngineTimeout => &[
                "Increase fault_injection.wait_timeout",
                "Inspect the chaos runner pod logs",
            ],
            Self::ChaosMultipleInstances => &[
                "Delete stale ChaosEngine and ChaosResult objects in the namespace",
            ],
            Self::ChaosNoResult => &["Inspect the chaos runner pod logs"],
            Self::ChaosStatusParse => &["Check that the installed litmus version is supported"],
            Self::ChaosVerdictFail => &["See the reported fail step for the cause"],
            Self::ChaosCleanupFailed => &[
                "Delete the listed resources manually before the next run",
            ],

            Self::OperatorPhaseFailed => &[
                "Inspect the ClusterServiceVersion status conditions",
            ],
            Self::OperatorPhaseTimeout => &[
                "Increase operator.timeout",
                "Inspect the ClusterServiceVersion status conditions",
            ],
            Self::OperatorFetchFailed => &[
                "Verify the ClusterServiceVersion name and namespace",
            ],
            Self::OperatorPhaseParse => &[
                "Check that the installed OLM version is supported",
            ],

            Self::SnapshotReadError => &["Check the snapshot path"],
            Self::SnapshotParseError => &[
                "Snapshots must be claim JSON documents with a top-level \"claim\" object",
            ],
            Self::SnapshotWriteError => &["Check write permissions on the claim file"],
            Self::JunitParseError => &[
                "Check that every *.xml file in the report directory is well-formed",
                "Move non-JUnit XML files out of the report directory",
            ],

            Self::InternalError => &["Re-run with --verbose and report the log"],
            Self::InternalLoggingError => &["Check the RUST_LOG filter syntax"],
        }
    }

    /// Every defined error code.
    #[must_use]
    pub const fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigNotFound,
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigValidationError,
            Self::ConfigEnvError,
            Self::ConfigNoTargets,
            Self::ClusterUnreachable,
            Self::ClusterApiError,
            Self::ClusterResourceNotFound,
            Self::ClusterDiscoveryFailed,
            Self::ClusterDecodeError,
            Self::WorkloadNotReady,
            Self::NodeCordonFailed,
            Self::NodeUncordonFailed,
            Self::PodDeleteFailed,
            Self::RecoveryTimeout,
            Self::TemplateRenderFailed,
            Self::ResourceCreateFailed,
            Self::ChaosEngineTimeout,
            Self::ChaosMultipleInstances,
            Self::ChaosNoResult,
            Self::ChaosStatusParse,
            Self::ChaosVerdictFail,
            Self::ChaosCleanupFailed,
            Self::OperatorPhaseFailed,
            Self::OperatorPhaseTimeout,
            Self::OperatorFetchFailed,
            Self::OperatorPhaseParse,
            Self::SnapshotReadError,
            Self::SnapshotParseError,
            Self::SnapshotWriteError,
            Self::JunitParseError,
            Self::InternalError,
            Self::InternalLoggingError,
        ]
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Config,
    Cluster,
    Disruption,
    FaultInjection,
    Operator,
    Snapshot,
    Internal,
}

impl ErrorCategory {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Cluster => "Cluster",
            Self::Disruption => "Disruption",
            Self::FaultInjection => "Fault Injection",
            Self::Operator => "Operator",
            Self::Snapshot => "Snapshot",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "KCERT-E001")
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
    pub remediation: Vec<String>,
}

impl ErrorEntry {
    /// Formats the error for display with full remediation steps.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut output = format!("[{}] {}\n", self.code, self.message);

        if !self.remediation.is_empty() {
            output.push_str("\nRemediation steps:\n");
            for (i, step) in self.remediation.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }

        output
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
