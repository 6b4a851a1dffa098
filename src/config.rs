//! Client configuration.
//!
//! [`ClientConfig`] holds everything a [`Client`](crate::Client) needs:
//! where the server is and how long a single call may run. It can be
//! built in code (usually through [`ClientBuilder`](crate::ClientBuilder))
//! or loaded from JSON, where durations are given in seconds:
//!
//! ```json
//! { "host": "10.0.0.5", "port": 4444, "deadline": 2.5, "max_attempts": 10 }
//! ```
//!
//! Omitted fields keep their defaults; `null` disables an optional bound.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Result, TokenBucketError};
use crate::protocol::DEFAULT_MAX_LINE_LENGTH;

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 4444;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Server host name or IP address.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Bound on establishing the TCP connection.
    #[serde(deserialize_with = "opt_secs")]
    pub connect_timeout: Option<Duration>,
    /// Bound on a whole `acquire`/`lock` call. `None` waits as long as
    /// the server keeps answering `WAIT`.
    #[serde(deserialize_with = "opt_secs")]
    pub deadline: Option<Duration>,
    /// Maximum number of requests per `acquire`/`lock` call.
    pub max_attempts: Option<u32>,
    /// Longest single backoff honoured; longer `WAIT`s are clamped.
    #[serde(deserialize_with = "opt_secs")]
    pub max_wait: Option<Duration>,
    /// Longest reply line accepted, terminator excluded.
    pub max_line_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            deadline: None,
            max_attempts: None,
            max_wait: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(TokenBucketError::ConfigIo)?;
        Self::from_json_str(&json)
    }

    /// Check values that the type system does not.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(TokenBucketError::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(TokenBucketError::Config("port must be in 1-65535".into()));
        }
        if self.max_line_length == 0 {
            return Err(TokenBucketError::Config(
                "max_line_length must be positive".into(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(TokenBucketError::Config(
                "max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// `host:port`, for display.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Deserialize an optional duration given as (fractional) seconds.
fn opt_secs<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let secs: Option<f64> = Option::deserialize(deserializer)?;
    secs.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
        .transpose()
}
