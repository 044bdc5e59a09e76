//! Configuration types for throttles and program output

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read throttle config {path:?}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse throttle config {path:?}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid throttle config: {0}")]
    Invalid(String),
}

/// Throttle settings independent of where they came from (command line, JSON file).
///
/// Every field is optional. Fields left unset are resolved by the throttle itself: first from
/// the record stored under the throttle's name, then from the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Storage key of the throttle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Initial sleep value in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep: Option<f64>,
    /// Number of invocations between storage flushes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Calls per second ceiling (0 = use the calculation hook, if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rate: Option<u64>,
}

impl ThrottleConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Returns `self` with every field that is set in `overrides` replaced.
    pub fn merge(self, overrides: ThrottleConfig) -> Self {
        Self {
            name: overrides.name.or(self.name),
            sleep: overrides.sleep.or(self.sleep),
            interval: overrides.interval.or(self.interval),
            max_rate: overrides.max_rate.or(self.max_rate),
        }
    }

    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(sleep) = self.sleep.filter(|sleep| !sleep.is_finite() || *sleep < 0.0) {
            return Err(ConfigError::Invalid(format!(
                "sleep must be a non-negative number of seconds, got {sleep}"
            )));
        }
        if self.interval == Some(0) {
            return Err(ConfigError::Invalid(
                "interval must be at least 1".to_string(),
            ));
        }
        if matches!(&self.name, Some(name) if name.is_empty()) {
            return Err(ConfigError::Invalid("name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Throttle builder with the fields that are set here applied.
    pub fn builder(&self) -> throttle::Builder {
        let mut builder = throttle::Throttle::builder();
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        if let Some(sleep) = self.sleep {
            builder = builder.sleep(sleep);
        }
        if let Some(interval) = self.interval {
            builder = builder.interval(interval);
        }
        if let Some(max_rate) = self.max_rate {
            builder = builder.max_rate(max_rate);
        }
        builder
    }
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn merge_prefers_overrides() {
        let file = ThrottleConfig {
            name: Some("api".to_string()),
            sleep: Some(0.5),
            interval: Some(10),
            max_rate: None,
        };
        let flags = ThrottleConfig {
            interval: Some(20),
            max_rate: Some(5),
            ..Default::default()
        };
        let merged = file.merge(flags);
        assert_eq!(merged.name.as_deref(), Some("api"));
        assert_eq!(merged.sleep, Some(0.5));
        assert_eq!(merged.interval, Some(20));
        assert_eq!(merged.max_rate, Some(5));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad = [
            ThrottleConfig {
                interval: Some(0),
                ..Default::default()
            },
            ThrottleConfig {
                sleep: Some(-0.1),
                ..Default::default()
            },
            ThrottleConfig {
                sleep: Some(f64::INFINITY),
                ..Default::default()
            },
            ThrottleConfig {
                name: Some(String::new()),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{config:?}"
            );
        }
        assert!(ThrottleConfig::default().validate().is_ok());
    }

    #[test]
    fn load_from_json() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"name": "api", "interval": 5, "max_rate": 100}}"#)?;
        let config = ThrottleConfig::load(file.path())?;
        assert_eq!(config.name.as_deref(), Some("api"));
        assert_eq!(config.interval, Some(5));
        assert_eq!(config.max_rate, Some(100));
        assert_eq!(config.sleep, None);
        Ok(())
    }

    #[test]
    fn load_rejects_non_numeric_and_unknown_fields() -> anyhow::Result<()> {
        for text in [r#"{"interval": "often"}"#, r#"{"max_rps": 3}"#] {
            let mut file = tempfile::NamedTempFile::new()?;
            write!(file, "{text}")?;
            assert!(matches!(
                ThrottleConfig::load(file.path()),
                Err(ConfigError::Parse { .. })
            ));
        }
        assert!(matches!(
            ThrottleConfig::load(std::path::Path::new("/nonexistent/warpd.json")),
            Err(ConfigError::Read { .. })
        ));
        Ok(())
    }

    #[test]
    fn builder_applies_set_fields() -> anyhow::Result<()> {
        let config = ThrottleConfig {
            name: Some("configured".to_string()),
            interval: Some(7),
            ..Default::default()
        };
        let throttle = config.builder().build()?;
        assert_eq!(throttle.name(), "configured");
        assert_eq!(throttle.interval(), 7);
        assert_eq!(throttle.state().sleep(), throttle::DEFAULT_SLEEP);
        Ok(())
    }
}
