//! Environment variable parsing with type safety.
//!
//! Reads `KCERT_*` overrides, collecting every bad value instead of stopping
//! at the first so a misconfigured CI job reports all problems at once.

use super::source::Sourced;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    #[error("Invalid duration for {var}: {value} ({reason})")]
    InvalidDuration {
        var: String,
        value: String,
        reason: String,
    },

    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the `KCERT_` prefix.
    pub fn new() -> Self {
        Self::with_prefix("KCERT_")
    }

    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => Sourced::from_env(value, var_name),
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }

    /// Boolean value: 1/true/yes/on and 0/false/no/off/"" are accepted.
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let parsed = match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    _ => {
                        self.errors.push(EnvError::InvalidValue {
                            var: var_name.clone(),
                            expected: "boolean (true/false/1/0/yes/no)".to_string(),
                            value: value.clone(),
                        });
                        default
                    }
                };
                Sourced::from_env(parsed, var_name)
            }
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Duration in humantime syntax (`90s`, `7m`, `1h 30m`).
    ///
    /// A bare integer is read as seconds.
    pub fn get_duration(&mut self, name: &str, default: Duration) -> Sourced<Duration> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match parse_duration(&value) {
                Ok(d) => Sourced::from_env(d, var_name),
                Err(reason) => {
                    self.errors.push(EnvError::InvalidDuration {
                        var: var_name,
                        value,
                        reason,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    pub fn get_u32_range(&mut self, name: &str, default: u32, min: u32, max: u32) -> Sourced<u32> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.parse::<u32>() {
                Ok(n) if n >= min && n <= max => Sourced::from_env(n, var_name),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name.clone(),
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    Sourced::default_value(default)
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name.clone(),
                        expected: "unsigned 32-bit integer".to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let lower = value.to_lowercase();
                match lower.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" | "off" => {
                        Sourced::from_env(lower, var_name)
                    }
                    _ => {
                        self.errors.push(EnvError::InvalidLogLevel {
                            var: var_name.clone(),
                            value: value.clone(),
                        });
                        Sourced::default_value(default.to_string())
                    }
                }
            }
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }

    /// Optional string; unset and empty both yield `None`.
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.is_empty() => Sourced::from_env(None, var_name),
            Ok(value) => Sourced::from_env(Some(value), var_name),
            Err(_) => Sourced::default_value(None),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a humantime duration, accepting bare integers as seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(trimmed).map_err(|e| e.to_string())
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;

    fn set(var: &str, value: &str) {
        // SAFETY: env mutation is serialized by env_test_lock
        unsafe { env::set_var(var, value) };
    }

    fn unset(var: &str) {
        // SAFETY: env mutation is serialized by env_test_lock
        unsafe { env::remove_var(var) };
    }

    #[test]
    fn test_duration_parses_humantime_and_seconds() {
        let _lock = env_test_lock();
        set("KCERT_TEST_DUR_A", "7m");
        set("KCERT_TEST_DUR_B", "45");

        let mut parser = EnvParser::new();
        let a = parser.get_duration("TEST_DUR_A", Duration::from_secs(1));
        let b = parser.get_duration("TEST_DUR_B", Duration::from_secs(1));

        assert_eq!(a.value, Duration::from_secs(420));
        assert_eq!(a.env_var.as_deref(), Some("KCERT_TEST_DUR_A"));
        assert_eq!(b.value, Duration::from_secs(45));
        assert!(!parser.has_errors());

        unset("KCERT_TEST_DUR_A");
        unset("KCERT_TEST_DUR_B");
    }

    #[test]
    fn test_errors_are_collected_not_fatal() {
        let _lock = env_test_lock();
        set("KCERT_TEST_BAD_DUR", "soon");
        set("KCERT_TEST_BAD_BOOL", "maybe");
        set("KCERT_TEST_BAD_LEVEL", "loud");

        let mut parser = EnvParser::new();
        let d = parser.get_duration("TEST_BAD_DUR", Duration::from_secs(3));
        let b = parser.get_bool("TEST_BAD_BOOL", true);
        let l = parser.get_log_level("TEST_BAD_LEVEL", "info");

        assert_eq!(d.value, Duration::from_secs(3));
        assert!(d.is_default());
        assert!(b.value);
        assert_eq!(l.value, "info");
        assert_eq!(parser.errors().len(), 3);
        assert!(matches!(
            parser.errors()[0],
            EnvError::InvalidDuration { ref var, .. } if var == "KCERT_TEST_BAD_DUR"
        ));

        unset("KCERT_TEST_BAD_DUR");
        unset("KCERT_TEST_BAD_BOOL");
        unset("KCERT_TEST_BAD_LEVEL");
    }

    #[test]
    fn test_u32_out_of_range() {
        let _lock = env_test_lock();
        set("KCERT_TEST_RANGE", "500");

        let mut parser = EnvParser::new();
        let v = parser.get_u32_range("TEST_RANGE", 10, 1, 100);
        assert_eq!(v.value, 10);
        assert!(matches!(parser.take_errors()[0], EnvError::OutOfRange { .. }));
        assert!(!parser.has_errors());

        unset("KCERT_TEST_RANGE");
    }

    #[test]
    fn test_unset_yields_default_source() {
        let _lock = env_test_lock();
        unset("KCERT_TEST_UNSET");

        let mut parser = EnvParser::new();
        assert!(parser.get_string("TEST_UNSET", "x").is_default());
        assert_eq!(parser.get_optional_string("TEST_UNSET").value, None);
    }
}
