//! Configuration for routing heuristics and consistency trackers.

use crate::{ConfigError, TandemError, TandemResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// ROUTING
// ============================================================================

/// Limits and allow-lists used by the SQL classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// How many leading characters are searched for a `SELECT fn(` shape.
    pub function_call_prefix: usize,
    /// How many trailing characters are searched for `for update`.
    pub select_for_update_suffix: usize,
    /// Functions known to be read-only; calling them does not count as a write.
    pub read_only_functions: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            function_call_prefix: 80,
            select_for_update_suffix: 100,
            read_only_functions: Vec::new(),
        }
    }
}

impl RoutingConfig {
    /// Add a function name to the read-only allow-list.
    pub fn with_read_only_function(mut self, name: impl Into<String>) -> Self {
        self.read_only_functions.push(name.into());
        self
    }
}

// ============================================================================
// CONSISTENCY
// ============================================================================

/// Timing policy for consistency trackers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    /// Replication lag assumed by the clock-based tracker.
    pub clock_lag: Duration,
    /// Longest time a write may take to reach a replica.
    pub max_propagation: Duration,
    /// After this long a single-flight refresh may be taken over.
    pub refresh_timeout: Duration,
    /// Answer used when progress is unknown.
    pub fall_back_to_consistency: bool,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            clock_lag: Duration::from_millis(100),
            max_propagation: Duration::from_millis(100),
            refresh_timeout: Duration::from_secs(5),
            fall_back_to_consistency: false,
        }
    }
}

// ============================================================================
// TOP LEVEL
// ============================================================================

/// Full TANDEM configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TandemConfig {
    pub routing: RoutingConfig,
    pub consistency: ConsistencyConfig,
}

impl TandemConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> TandemResult<()> {
        if self.routing.function_call_prefix == 0 {
            return Err(invalid(
                "function_call_prefix",
                self.routing.function_call_prefix.to_string(),
                "function_call_prefix must be greater than 0",
            ));
        }

        if self.routing.select_for_update_suffix < "for update".len() {
            return Err(invalid(
                "select_for_update_suffix",
                self.routing.select_for_update_suffix.to_string(),
                "select_for_update_suffix must fit the 'for update' clause",
            ));
        }

        if let Some(name) = self
            .routing
            .read_only_functions
            .iter()
            .find(|name| name.trim().is_empty())
        {
            return Err(invalid(
                "read_only_functions",
                format!("{:?}", name),
                "function names must not be blank",
            ));
        }

        for (field, value) in [
            ("clock_lag", self.consistency.clock_lag),
            ("max_propagation", self.consistency.max_propagation),
            ("refresh_timeout", self.consistency.refresh_timeout),
        ] {
            if value.is_zero() {
                return Err(invalid(
                    field,
                    format!("{:?}", value),
                    "duration must be greater than 0",
                ));
            }
        }

        Ok(())
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TANDEM_FUNCTION_CALL_PREFIX`: characters searched for a function call (default: 80)
    /// - `TANDEM_SELECT_FOR_UPDATE_SUFFIX`: characters searched for `for update` (default: 100)
    /// - `TANDEM_READ_ONLY_FUNCTIONS`: comma separated read-only function names
    /// - `TANDEM_CLOCK_LAG_MS`: assumed replication lag (default: 100)
    /// - `TANDEM_MAX_PROPAGATION_MS`: assumed max propagation time (default: 100)
    /// - `TANDEM_REFRESH_TIMEOUT_MS`: single-flight refresh timeout (default: 5000)
    /// - `TANDEM_FALL_BACK_TO_CONSISTENCY`: optimistic answer when progress is unknown (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            routing: RoutingConfig {
                function_call_prefix: env_parse("TANDEM_FUNCTION_CALL_PREFIX")
                    .unwrap_or(defaults.routing.function_call_prefix),
                select_for_update_suffix: env_parse("TANDEM_SELECT_FOR_UPDATE_SUFFIX")
                    .unwrap_or(defaults.routing.select_for_update_suffix),
                read_only_functions: std::env::var("TANDEM_READ_ONLY_FUNCTIONS")
                    .ok()
                    .map(|s| parse_list(&s))
                    .unwrap_or(defaults.routing.read_only_functions),
            },
            consistency: ConsistencyConfig {
                clock_lag: env_parse("TANDEM_CLOCK_LAG_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.consistency.clock_lag),
                max_propagation: env_parse("TANDEM_MAX_PROPAGATION_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.consistency.max_propagation),
                refresh_timeout: env_parse("TANDEM_REFRESH_TIMEOUT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.consistency.refresh_timeout),
                fall_back_to_consistency: env_parse("TANDEM_FALL_BACK_TO_CONSISTENCY")
                    .unwrap_or(defaults.consistency.fall_back_to_consistency),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(field: &str, value: String, reason: &str) -> TandemError {
    TandemError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(TandemConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_prefix_rejected() {
        let mut config = TandemConfig::default();
        config.routing.function_call_prefix = 0;
        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("function_call_prefix"));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let mut config = TandemConfig::default();
        config.consistency.refresh_timeout = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("refresh_timeout"));
    }

    #[test]
    fn test_blank_function_name_rejected() {
        let config = TandemConfig {
            routing: RoutingConfig::default().with_read_only_function("  "),
            ..TandemConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_list_skips_blanks() {
        assert_eq!(
            parse_list(" now, ,pg_catalog.version ,"),
            vec!["now".to_string(), "pg_catalog.version".to_string()]
        );
    }

    #[test]
    fn test_from_env_overrides_and_defaults() {
        let _timeout = EnvVarGuard::set("TANDEM_REFRESH_TIMEOUT_MS", Some("250"));
        let _fallback = EnvVarGuard::set("TANDEM_FALL_BACK_TO_CONSISTENCY", Some("true"));
        let _functions = EnvVarGuard::set("TANDEM_READ_ONLY_FUNCTIONS", Some("now, version"));
        let _lag = EnvVarGuard::set("TANDEM_CLOCK_LAG_MS", Some("not a number"));

        let config = TandemConfig::from_env();
        assert_eq!(config.consistency.refresh_timeout, Duration::from_millis(250));
        assert!(config.consistency.fall_back_to_consistency);
        assert_eq!(config.routing.read_only_functions, vec!["now", "version"]);
        assert_eq!(config.consistency.clock_lag, ConsistencyConfig::default().clock_lag);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = TandemConfig {
            routing: RoutingConfig::default().with_read_only_function("now"),
            ..TandemConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: TandemConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
