//! Stable error codes shared by the engine and the CLI.
//!
//! Engine errors map onto an [`ErrorCode`] so the CLI can print the code
//! together with remediation steps.

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};
