//! Shared building blocks for kcert.
//!
//! Types, the error catalog, configuration loading, label matching, the
//! snapshot diff engine and test logging helpers used by the engine and CLI.

pub mod config;
pub mod errors;
pub mod labels;
pub mod snapshot;
pub mod testing;
pub mod types;

pub use config::{ConfigError, ConfigSource, KcertConfig, Sourced};
pub use errors::{ErrorCategory, ErrorCode, ErrorEntry};
pub use types::{TargetPodLabel, Verdict, WorkloadKind, WorkloadRef};
