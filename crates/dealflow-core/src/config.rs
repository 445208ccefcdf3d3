//! Engine configuration.
//!
//! Read from the environment:
//! - `DEALFLOW_STEP_TIMEOUT_SECS`: per-call bound on a reasoning call (default 120)
//! - `DEALFLOW_STEP_RETRY_DELAY_MS`: pause before retrying a transient failure (default 1000)
//! - `DEALFLOW_PERSIST_ATTEMPTS`: attempts per store call (default 3)
//! - `DEALFLOW_PERSIST_RETRY_DELAY_MS`: pause between store attempts (default 100)

use std::time::Duration;

/// A step gets at most one retry.
pub const MAX_STEP_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub step_timeout: Duration,
    /// Clamped to `1..=MAX_STEP_ATTEMPTS`.
    pub max_step_attempts: u32,
    pub step_retry_delay: Duration,
    pub persistence_attempts: u32,
    pub persistence_retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(120),
            max_step_attempts: MAX_STEP_ATTEMPTS,
            step_retry_delay: Duration::from_millis(1000),
            persistence_attempts: 3,
            persistence_retry_delay: Duration::from_millis(100),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str| -> Result<Option<u64>, String> {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(v) => v
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| format!("Invalid {} '{}'", key, v)),
                None => Ok(None),
            }
        };

        let config = Self {
            step_timeout: number("DEALFLOW_STEP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.step_timeout),
            max_step_attempts: defaults.max_step_attempts,
            step_retry_delay: number("DEALFLOW_STEP_RETRY_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.step_retry_delay),
            persistence_attempts: number("DEALFLOW_PERSIST_ATTEMPTS")?
                .map(|n| n as u32)
                .unwrap_or(defaults.persistence_attempts),
            persistence_retry_delay: number("DEALFLOW_PERSIST_RETRY_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.persistence_retry_delay),
        };

        if config.step_timeout.is_zero() {
            return Err("DEALFLOW_STEP_TIMEOUT_SECS must be greater than zero".to_string());
        }
        Ok(config.normalized())
    }

    /// Same config with attempt counts forced into their legal ranges.
    pub fn normalized(mut self) -> Self {
        self.max_step_attempts = self.max_step_attempts.clamp(1, MAX_STEP_ATTEMPTS);
        self.persistence_attempts = self.persistence_attempts.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_step_attempts, 2);
        assert_eq!(config.persistence_attempts, 3);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(|k| match k {
            "DEALFLOW_STEP_TIMEOUT_SECS" => Some("30".to_string()),
            "DEALFLOW_PERSIST_ATTEMPTS" => Some("0".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.step_timeout, Duration::from_secs(30));
        assert_eq!(config.persistence_attempts, 1);
    }

    #[test]
    fn test_invalid_values() {
        assert!(EngineConfig::from_lookup(|k| match k {
            "DEALFLOW_STEP_TIMEOUT_SECS" => Some("soon".to_string()),
            _ => None,
        })
        .is_err());
        assert!(EngineConfig::from_lookup(|k| match k {
            "DEALFLOW_STEP_TIMEOUT_SECS" => Some("0".to_string()),
            _ => None,
        })
        .is_err());
    }

    #[test]
    fn test_step_attempts_are_clamped() {
        let config = EngineConfig {
            max_step_attempts: 5,
            ..EngineConfig::default()
        }
        .normalized();
        assert_eq!(config.max_step_attempts, MAX_STEP_ATTEMPTS);
    }
}
