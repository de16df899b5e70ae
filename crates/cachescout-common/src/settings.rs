use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::endpoint::{ClusterEndpoint, NodeEndpoint};
use crate::error::{CachescoutError, Result};

/// Default number of attempts for the initial configuration resolution.
pub const DEFAULT_TRIES: u32 = 5;

/// Default delay between initial resolution attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Default discovery polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(60_000);

/// Default interval between liveness probes of dead nodes.
pub const DEFAULT_DEAD_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Wire protocol used for cache operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Text,
    #[default]
    Binary,
}

impl FromStr for Protocol {
    type Err = CachescoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Protocol::Text),
            "binary" => Ok(Protocol::Binary),
            _ => Err(CachescoutError::UnknownProtocol(s.to_string())),
        }
    }
}

/// Settings for the auto-discovery client core.
///
/// Constructed with [`ClusterSettings::new`], which validates the cluster
/// endpoint, then refined with the `with_*` methods. All knobs default to
/// the values in the module-level constants.
///
/// # Example
///
/// ```
/// use cachescout_common::settings::ClusterSettings;
/// use std::time::Duration;
///
/// let settings = ClusterSettings::new("demo.cfg.cache.example", 11211)
///     .unwrap()
///     .with_poll_interval_ms(30_000)
///     .with_dead_timeout(Duration::from_secs(5));
/// assert_eq!(settings.poll_interval, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Address of the configuration discovery service.
    pub endpoint: ClusterEndpoint,
    /// Seed roster used at startup; when empty the pool performs an initial
    /// resolution against the configuration endpoint instead.
    pub initial_nodes: Vec<NodeEndpoint>,
    /// Attempts for the initial configuration resolution.
    pub tries: u32,
    /// Delay between initial resolution attempts.
    pub retry_delay: Duration,
    /// Discovery polling interval.
    pub poll_interval: Duration,
    /// Interval between liveness probes of dead nodes.
    pub dead_timeout: Duration,
    /// Wire protocol for cache operations.
    pub protocol: Protocol,
}

impl ClusterSettings {
    /// Creates settings for the given configuration endpoint with all other
    /// options at their defaults.
    ///
    /// # Errors
    ///
    /// Propagates [`ClusterEndpoint::new`] validation failures (empty
    /// hostname, zero port) and rejects endpoints without the `.cfg.`
    /// label, which do not support auto-discovery.
    pub fn new(hostname: impl Into<String>, port: u16) -> Result<Self> {
        let endpoint = ClusterEndpoint::new(hostname, port)?;
        if !endpoint.supports_autodiscovery() {
            return Err(CachescoutError::Configuration(format!(
                "endpoint '{}' does not support auto-discovery (expected a '.cfg.' hostname)",
                endpoint.hostname()
            )));
        }
        Ok(Self {
            endpoint,
            initial_nodes: Vec::new(),
            tries: DEFAULT_TRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            dead_timeout: DEFAULT_DEAD_TIMEOUT,
            protocol: Protocol::default(),
        })
    }

    /// Seed roster used before the first discovery poll completes.
    pub fn with_initial_nodes(mut self, nodes: Vec<NodeEndpoint>) -> Self {
        self.initial_nodes = nodes;
        self
    }

    pub fn with_tries(mut self, tries: u32) -> Self {
        self.tries = tries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Polling interval in milliseconds; a negative value selects the
    /// default interval.
    pub fn with_poll_interval_ms(mut self, interval_ms: i64) -> Self {
        self.poll_interval = if interval_ms < 0 {
            DEFAULT_POLL_INTERVAL
        } else {
            Duration::from_millis(interval_ms as u64)
        };
        self
    }

    pub fn with_dead_timeout(mut self, timeout: Duration) -> Self {
        self.dead_timeout = timeout;
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults() {
        let settings = ClusterSettings::new("demo.cfg.cache.example", 11211).unwrap();
        assert_eq!(settings.tries, 5);
        assert_eq!(settings.retry_delay, Duration::from_millis(1000));
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
        assert_eq!(settings.dead_timeout, Duration::from_secs(10));
        assert_eq!(settings.protocol, Protocol::Binary);
        assert!(settings.initial_nodes.is_empty());
    }

    #[test]
    fn settings_rejects_non_discovery_endpoint() {
        let err = ClusterSettings::new("demo.cache.example", 11211).unwrap_err();
        assert!(matches!(err, CachescoutError::Configuration(_)));
    }

    #[test]
    fn negative_poll_interval_selects_default() {
        let settings = ClusterSettings::new("demo.cfg.cache.example", 11211)
            .unwrap()
            .with_poll_interval_ms(-1);
        assert_eq!(settings.poll_interval, DEFAULT_POLL_INTERVAL);

        let settings = settings.with_poll_interval_ms(15_000);
        assert_eq!(settings.poll_interval, Duration::from_secs(15));
    }

    #[test]
    fn protocol_from_str() {
        assert_eq!("text".parse::<Protocol>().unwrap(), Protocol::Text);
        assert_eq!("Binary".parse::<Protocol>().unwrap(), Protocol::Binary);

        let err = "udp".parse::<Protocol>().unwrap_err();
        assert!(matches!(err, CachescoutError::UnknownProtocol(p) if p == "udp"));
    }
}
