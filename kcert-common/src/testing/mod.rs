//! Test support shared by the kcert crates.

mod log;

pub use log::{
    TestGuard, TestLogEntry, TestLogger, TestPhase, init_global_test_logging,
};
