// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Dashboard configuration
//!
//! [`DashboardConfig`] works with zero configuration apart from the server
//! address. Every interval has a default taken from [`timeouts`].
//!
//! ```rust,ignore
//! use aprsc_dash::DashboardConfig;
//!
//! let config = DashboardConfig::builder()
//!     .base_url("http://aprs.example.net:14501/")
//!     .retry_interval(Duration::from_secs(10))
//!     .build()?;
//! ```
//!
//! The same structure can be loaded from a JSON file, durations given in
//! seconds:
//!
//! ```json
//! { "base_url": "http://localhost:14501/", "poll_interval": 5, "status_timeout": 35 }
//! ```

pub mod timeouts;

use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Metric shown on the graph when the dashboard starts
pub const DEFAULT_METRIC: &str = "totals.tcp_bytes_rx";

/// Default server address (aprsc serves its status page on port 14501)
pub const DEFAULT_BASE_URL: &str = "http://localhost:14501/";

/// Configuration for a dashboard session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    /// Base URL of the server's HTTP status port
    pub base_url: String,

    /// Timeout of one `/status.json` request
    #[serde(with = "duration_secs")]
    pub status_timeout: Duration,

    /// Delay between a successful status poll and the next one
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Delay between a failed status poll and the next one
    #[serde(with = "duration_secs")]
    pub retry_interval: Duration,

    /// Timeout of one `/counterdata` request
    #[serde(with = "duration_secs")]
    pub graph_timeout: Duration,

    /// Delay between graph refreshes
    #[serde(with = "duration_secs")]
    pub graph_interval: Duration,

    /// Timeout of one message-of-the-day request
    #[serde(with = "duration_secs")]
    pub motd_timeout: Duration,

    /// Delay between message-of-the-day checks
    #[serde(with = "duration_secs")]
    pub motd_interval: Duration,

    /// Metric graphed when the session starts
    pub initial_metric: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            status_timeout: timeouts::status::REQUEST_TIMEOUT,
            poll_interval: timeouts::status::POLL_INTERVAL,
            retry_interval: timeouts::status::RETRY_INTERVAL,
            graph_timeout: timeouts::graph::REQUEST_TIMEOUT,
            graph_interval: timeouts::graph::REFRESH_INTERVAL,
            motd_timeout: timeouts::motd::REQUEST_TIMEOUT,
            motd_interval: timeouts::motd::CHECK_INTERVAL,
            initial_metric: DEFAULT_METRIC.to_string(),
        }
    }
}

impl DashboardConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for fluent construction
    pub fn builder() -> DashboardConfigBuilder {
        DashboardConfigBuilder::default()
    }

    /// Load a config from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the config for values the dashboard cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base()?;

        let durations = [
            ("status_timeout", self.status_timeout),
            ("poll_interval", self.poll_interval),
            ("retry_interval", self.retry_interval),
            ("graph_timeout", self.graph_timeout),
            ("graph_interval", self.graph_interval),
            ("motd_timeout", self.motd_timeout),
            ("motd_interval", self.motd_interval),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ZeroDuration(name));
        }

        if self.initial_metric.trim().is_empty() {
            return Err(ConfigError::EmptyMetric);
        }

        Ok(())
    }

    /// The parsed base URL, always ending in `/` so relative joins stay below it
    pub fn base(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("URL cannot be a base".to_string()));
        }
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

/// Builder for [`DashboardConfig`]
#[derive(Debug, Default)]
pub struct DashboardConfigBuilder {
    config: DashboardConfig,
}

impl DashboardConfigBuilder {
    /// Set the server base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the `/status.json` request timeout
    pub fn status_timeout(mut self, timeout: Duration) -> Self {
        self.config.status_timeout = timeout;
        self
    }

    /// Set the delay between successful polls
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the delay after a failed poll
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = interval;
        self
    }

    /// Set the `/counterdata` request timeout
    pub fn graph_timeout(mut self, timeout: Duration) -> Self {
        self.config.graph_timeout = timeout;
        self
    }

    /// Set the delay between graph refreshes
    pub fn graph_interval(mut self, interval: Duration) -> Self {
        self.config.graph_interval = interval;
        self
    }

    /// Set the message-of-the-day request timeout
    pub fn motd_timeout(mut self, timeout: Duration) -> Self {
        self.config.motd_timeout = timeout;
        self
    }

    /// Set the delay between message-of-the-day checks
    pub fn motd_interval(mut self, interval: Duration) -> Self {
        self.config.motd_interval = interval;
        self
    }

    /// Set the metric graphed at startup
    pub fn initial_metric(mut self, metric: impl Into<String>) -> Self {
        self.config.initial_metric = metric.into();
        self
    }

    /// Validate and build the config
    pub fn build(self) -> Result<DashboardConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Durations as (fractional) seconds
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
