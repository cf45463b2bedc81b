//! Configuration system for kcert.
//!
//! - `kcert.toml` sections for disruption, fault injection and operator waits
//! - `KCERT_*` environment overrides with collected errors
//! - Source tracking for every overridable value
//! - Validation before any cluster mutation

pub mod env;
pub mod file;
pub mod source;

pub use env::{EnvError, EnvParser, parse_duration};
pub use file::{
    ConfigError, DEFAULT_CONFIG_FILE, DisruptionConfig, FaultInjectionConfig, KcertConfig,
    OperatorConfig,
};
pub use source::{ConfigSource, Sourced};

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}
