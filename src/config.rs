//! Configuration file loading.
//!
//! Configuration lives in a JSON file (`config.json` by default) selecting
//! the output, the sensor whitelist and, for the queue output, the remote
//! endpoint and delivery tuning. Unknown fields are rejected so that typos
//! fail loudly instead of silently disabling sensors.

use crate::whitelist::SensorWhitelist;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MIN_SEND_INTERVAL: Duration = Duration::from_secs(1);

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub output: OutputKind,
    pub sensor_whitelist: SensorWhitelist,
    #[serde(default)]
    pub queue: Option<QueueConfig>,
}

/// Which output sink to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Print resolved observations as JSON lines on stdout
    Console,
    /// Batch resolved observations to the remote queue
    Queue,
}

/// Settings for the queue output.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Remote queue endpoint as host:port
    pub endpoint: String,
    /// Overall retry budget for one batch
    #[serde(
        default = "default_send_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub send_timeout: Duration,
    /// Minimum interval between batch submissions below capacity
    #[serde(
        default = "default_min_send_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub min_send_interval: Duration,
}

fn default_send_timeout() -> Duration {
    DEFAULT_SEND_TIMEOUT
}

fn default_min_send_interval() -> Duration {
    DEFAULT_MIN_SEND_INTERVAL
}

/// Errors raised while loading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("output \"queue\" requires a queue section")]
    MissingQueueConfig,
}

impl Config {
    /// Load and validate the configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = serde_json::from_str(&text)?;

        if config.output == OutputKind::Queue && config.queue.is_none() {
            return Err(ConfigError::MissingQueueConfig);
        }

        Ok(config)
    }
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use ruuvi_relay::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    if let Some(num) = src.strip_suffix("ms") {
        let millis: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid milliseconds: {}", num))?;
        return Ok(Duration::from_millis(millis));
    }

    if let Some(num) = src.strip_suffix('h') {
        let hours: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid hours: {}", num))?;
        return Ok(Duration::from_secs(hours * 3600));
    }

    if let Some(num) = src.strip_suffix('m') {
        let minutes: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid minutes: {}", num))?;
        return Ok(Duration::from_secs(minutes * 60));
    }

    if let Some(num) = src.strip_suffix('s') {
        let secs: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid seconds: {}", num))?;
        return Ok(Duration::from_secs(secs));
    }

    // no suffix, treat as seconds
    let secs: u64 = src
        .parse()
        .map_err(|_| format!("invalid duration: {}", src))?;
    Ok(Duration::from_secs(secs))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_queue_config() {
        let config: Config = serde_json::from_str(
            r#"{
                "output": "queue",
                "sensor_whitelist": {
                    "fb:72:36:09:90:15": "sauna",
                    "e5:fa:12:7e:ef:65": "yard"
                },
                "queue": {
                    "endpoint": "10.0.0.5:7677",
                    "send_timeout": "45s",
                    "min_send_interval": "500ms"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.output, OutputKind::Queue);
        assert_eq!(config.sensor_whitelist.len(), 2);
        assert_eq!(
            config
                .sensor_whitelist
                .get(&"fb:72:36:09:90:15".parse().unwrap()),
            Some(&"sauna".to_string())
        );

        let queue = config.queue.unwrap();
        assert_eq!(queue.endpoint, "10.0.0.5:7677");
        assert_eq!(queue.send_timeout, Duration::from_secs(45));
        assert_eq!(queue.min_send_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_queue_tuning_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "output": "queue",
                "sensor_whitelist": {},
                "queue": { "endpoint": "10.0.0.5:7677" }
            }"#,
        )
        .unwrap();

        let queue = config.queue.unwrap();
        assert_eq!(queue.send_timeout, DEFAULT_SEND_TIMEOUT);
        assert_eq!(queue.min_send_interval, DEFAULT_MIN_SEND_INTERVAL);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = serde_json::from_str::<Config>(
            r#"{
                "output": "console",
                "sensor_whitelist": {},
                "sensor_whitelst": {}
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_whitelist_address_rejected() {
        let result = serde_json::from_str::<Config>(
            r#"{
                "output": "console",
                "sensor_whitelist": { "not-an-address": "sauna" }
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_duration_suffixes() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration(" 3s ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-1s").is_err());
    }
}
