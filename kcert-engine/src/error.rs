//! Engine error taxonomy.
//!
//! Severity decides how far an error propagates: `FatalSetup`, `NoInstance`
//! and `Parse` end the current scenario, `ConvergenceTimeout` is a failed
//! scenario, `CompensationFailure` ends the whole run, and cleanup warnings
//! never change a verdict.

use std::time::Duration;

use kcert_common::ErrorCode;
use serde::Serialize;
use thiserror::Error;

use crate::cluster::ClusterError;

/// Stage of scenario setup that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStage {
    Template,
    Discovery,
    Create,
}

impl std::fmt::Display for SetupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::Discovery => write!(f, "discovery"),
            Self::Create => write!(f, "create"),
        }
    }
}

/// A status field that could not be projected into its typed form.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{object}: missing field `{field}`")]
    MissingField { object: String, field: String },

    #[error("{object}: field `{field}` is not a {expected}")]
    WrongType {
        object: String,
        field: String,
        expected: &'static str,
    },

    #[error("{source_name} document {index}: {reason}")]
    Document {
        source_name: String,
        index: usize,
        reason: String,
    },
}

/// One teardown step that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupWarning {
    pub kind: String,
    pub name: String,
    pub error: String,
}

impl std::fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.name, self.error)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("{stage} failed for {subject}: {reason}")]
    FatalSetup {
        stage: SetupStage,
        subject: String,
        reason: String,
    },

    #[error("{what} did not converge within {}s", timeout.as_secs())]
    ConvergenceTimeout {
        what: String,
        timeout: Duration,
        last_error: Option<String>,
    },

    #[error("failed to uncordon node {node}: {source}; node left unschedulable")]
    CompensationFailure {
        node: String,
        #[source]
        source: ClusterError,
    },

    #[error("{} cleanup step(s) failed", .0.len())]
    Cleanup(Vec<CleanupWarning>),

    #[error("found {count} {kind} instances, expected exactly one")]
    MultiInstance { kind: String, count: usize },

    #[error("cluster read failed: {0}")]
    TransientRead(#[from] ClusterError),

    #[error("status parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("no {kind} instance found in namespace {namespace}")]
    NoInstance { kind: String, namespace: String },
}

impl EngineError {
    pub fn setup(stage: SetupStage, subject: impl Into<String>, reason: impl ToString) -> Self {
        Self::FatalSetup {
            stage,
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that must stop every remaining scenario.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::CompensationFailure { .. })
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::FatalSetup {
                stage: SetupStage::Template,
                ..
            } => ErrorCode::TemplateRenderFailed,
            Self::FatalSetup {
                stage: SetupStage::Discovery,
                ..
            } => ErrorCode::ClusterDiscoveryFailed,
            Self::FatalSetup {
                stage: SetupStage::Create,
                ..
            } => ErrorCode::ResourceCreateFailed,
            Self::ConvergenceTimeout { .. } => ErrorCode::RecoveryTimeout,
            Self::CompensationFailure { .. } => ErrorCode::NodeUncordonFailed,
            Self::Cleanup(_) => ErrorCode::ChaosCleanupFailed,
            Self::MultiInstance { .. } => ErrorCode::ChaosMultipleInstances,
            Self::TransientRead(err) => cluster_error_code(err),
            Self::Parse(_) => ErrorCode::ChaosStatusParse,
            Self::NoInstance { .. } => ErrorCode::ChaosNoResult,
        }
    }
}

pub fn cluster_error_code(err: &ClusterError) -> ErrorCode {
    match err {
        ClusterError::NotFound { .. } | ClusterError::Api { code: 404, .. } => {
            ErrorCode::ClusterResourceNotFound
        }
        ClusterError::Api { .. } => ErrorCode::ClusterApiError,
        ClusterError::Transport(_) => ErrorCode::ClusterUnreachable,
        ClusterError::Decode(_) => ErrorCode::ClusterDecodeError,
    }
}
