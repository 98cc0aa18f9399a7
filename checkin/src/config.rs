//! Configuration loaded from the environment
//!
//! # Example
//!
//! ```no_run
//! use gatecheck::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! println!("Validating against {}", config.api_url);
//! # Ok(())
//! # }
//! ```

use crate::types::{EventId, ScanMode, StaffId};
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set to something unusable
    #[error("invalid value `{value}` for {var}: {reason}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
        /// What was expected
        reason: String,
    },
}

/// Check-in configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the validation API, without trailing slash
    pub api_url: String,
    /// Signed-in staff member, sent with every request
    pub staff_id: Option<StaffId>,
    /// Initially selected event
    pub event_id: Option<EventId>,
    /// Gate reported for camera scans
    pub camera_gate: String,
    /// Gate reported for manual and bulk entry
    pub desk_gate: String,
    /// Upper bound on one validation call
    pub request_timeout: Duration,
    /// Pause between detection attempts
    pub frame_interval: Duration,
    /// Camera behaviour after a result
    pub scan_mode: ScanMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api".to_string(),
            staff_id: None,
            event_id: None,
            camera_gate: "Main Gate".to_string(),
            desk_gate: "Ticket Validation Gate".to_string(),
            request_timeout: Duration::from_secs(15),
            frame_interval: Duration::from_millis(16),
            scan_mode: ScanMode::SingleShot,
        }
    }
}

impl Config {
    /// Load from `GATECHECK_*` environment variables
    ///
    /// Unset variables fall back to [`Config::default`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a present variable cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let api_url = get("GATECHECK_API_URL")
            .map_or(defaults.api_url, |url| url.trim().trim_end_matches('/').to_string());

        let staff_id = get("GATECHECK_STAFF_ID")
            .map(|v| parse_number("GATECHECK_STAFF_ID", &v).map(StaffId))
            .transpose()?;
        let event_id = get("GATECHECK_EVENT_ID")
            .map(|v| parse_number("GATECHECK_EVENT_ID", &v).map(EventId))
            .transpose()?;

        let request_timeout = get("GATECHECK_REQUEST_TIMEOUT_SECS")
            .map(|v| parse_number("GATECHECK_REQUEST_TIMEOUT_SECS", &v))
            .transpose()?
            .map_or(defaults.request_timeout, Duration::from_secs);
        let frame_interval = get("GATECHECK_FRAME_INTERVAL_MS")
            .map(|v| parse_number("GATECHECK_FRAME_INTERVAL_MS", &v))
            .transpose()?
            .map_or(defaults.frame_interval, Duration::from_millis);

        let scan_mode = match get("GATECHECK_SCAN_MODE") {
            Some(v) => v.parse::<ScanMode>().map_err(|reason| ConfigError::Invalid {
                var: "GATECHECK_SCAN_MODE",
                value: v.clone(),
                reason,
            })?,
            None => defaults.scan_mode,
        };

        let config = Self {
            api_url,
            staff_id,
            event_id,
            camera_gate: get("GATECHECK_CAMERA_GATE").unwrap_or(defaults.camera_gate),
            desk_gate: get("GATECHECK_DESK_GATE").unwrap_or(defaults.desk_gate),
            request_timeout,
            frame_interval,
            scan_mode,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "GATECHECK_REQUEST_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "timeout must be > 0".to_string(),
            });
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: "GATECHECK_API_URL",
                value: self.api_url.clone(),
                reason: "expected an http(s) URL".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(load(&[]).unwrap(), Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("GATECHECK_API_URL", "https://tickets.example.org/api/"),
            ("GATECHECK_STAFF_ID", "42"),
            ("GATECHECK_EVENT_ID", "7"),
            ("GATECHECK_CAMERA_GATE", "North Gate"),
            ("GATECHECK_REQUEST_TIMEOUT_SECS", "3"),
            ("GATECHECK_FRAME_INTERVAL_MS", "40"),
            ("GATECHECK_SCAN_MODE", "continuous"),
        ])
        .unwrap();

        assert_eq!(config.api_url, "https://tickets.example.org/api");
        assert_eq!(config.staff_id, Some(StaffId(42)));
        assert_eq!(config.event_id, Some(EventId(7)));
        assert_eq!(config.camera_gate, "North Gate");
        assert_eq!(config.desk_gate, "Ticket Validation Gate");
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.frame_interval, Duration::from_millis(40));
        assert_eq!(config.scan_mode, ScanMode::Continuous);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = load(&[("GATECHECK_STAFF_ID", "abc")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "GATECHECK_STAFF_ID", .. }));

        let err = load(&[("GATECHECK_REQUEST_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { var: "GATECHECK_REQUEST_TIMEOUT_SECS", .. }
        ));

        let err = load(&[("GATECHECK_API_URL", "ftp://nope")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "GATECHECK_API_URL", .. }));
    }
}
