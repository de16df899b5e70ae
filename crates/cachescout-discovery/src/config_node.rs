use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use cachescout_common::endpoint::ClusterEndpoint;
use cachescout_common::error::{CachescoutError, Result};
use cachescout_common::settings::ClusterSettings;
use cachescout_common::transport::TextConnection;

use crate::response::{parse_header, parse_payload, ClusterConfig};

/// Dedicated client for the cluster's configuration endpoint.
///
/// Owns one connection to the discovery service and reuses it across
/// polls; any failure drops the connection so the next call redials. The
/// connection is never shared with cache traffic.
pub struct ConfigNode {
    endpoint: ClusterEndpoint,
    tries: u32,
    retry_delay: Duration,
    connection: Mutex<Option<TextConnection>>,
}

impl ConfigNode {
    /// Creates a config node with the default retry policy.
    pub fn new(endpoint: ClusterEndpoint) -> Self {
        Self {
            endpoint,
            tries: cachescout_common::settings::DEFAULT_TRIES,
            retry_delay: cachescout_common::settings::DEFAULT_RETRY_DELAY,
            connection: Mutex::new(None),
        }
    }

    /// Creates a config node taking endpoint and retry policy from settings.
    pub fn from_settings(settings: &ClusterSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            tries: settings.tries,
            retry_delay: settings.retry_delay,
            connection: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &ClusterEndpoint {
        &self.endpoint
    }

    /// Resolves the cluster's current roster and version.
    ///
    /// Issues `config get cluster` over the dedicated connection and
    /// parses the three-line response:
    ///
    /// ```text
    /// CONFIG cluster 0 <payload_byte_length>\r\n
    /// <config_version>\n<host>|<ip>|<port> ...\r\n
    /// END\r\n
    /// ```
    ///
    /// # Errors
    ///
    /// Connection, timeout, and parse failures surface to the caller; the
    /// cached connection is dropped on any of them so the next resolution
    /// starts from a fresh dial.
    pub async fn resolve(&self) -> Result<ClusterConfig> {
        let mut guard = self.connection.lock().await;
        match Self::resolve_on(&mut guard, &self.endpoint).await {
            Ok(config) => Ok(config),
            Err(e) => {
                *guard = None;
                Err(e)
            }
        }
    }

    async fn resolve_on(
        slot: &mut Option<TextConnection>,
        endpoint: &ClusterEndpoint,
    ) -> Result<ClusterConfig> {
        let conn = match slot {
            Some(conn) => conn,
            None => {
                debug!(endpoint = %endpoint, "dialing configuration endpoint");
                slot.insert(TextConnection::connect(&endpoint.address()).await?)
            }
        };

        conn.send_command("config get cluster").await?;

        let header = conn.read_line().await?;
        let payload_len = parse_header(&header)?;
        let payload = conn.read_data(payload_len).await?;
        let trailer = conn.read_line().await?;
        if trailer != "END" {
            return Err(CachescoutError::Parse(format!(
                "expected END trailer, got '{}'",
                trailer
            )));
        }

        let payload = String::from_utf8(payload)
            .map_err(|_| CachescoutError::Parse("payload is not valid UTF-8".to_string()))?;
        parse_payload(&payload)
    }

    /// Initial resolution with the configured retry policy: up to `tries`
    /// attempts separated by `retry_delay`, surfacing the last error once
    /// exhausted.
    pub async fn resolve_with_retry(&self) -> Result<ClusterConfig> {
        let mut last_err = None;
        for attempt in 1..=self.tries.max(1) {
            match self.resolve().await {
                Ok(config) => return Ok(config),
                Err(e) => {
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        tries = self.tries.max(1),
                        error = %e,
                        "initial configuration resolution failed"
                    );
                    last_err = Some(e);
                    if attempt < self.tries.max(1) {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            CachescoutError::Configuration("initial resolution made no attempts".to_string())
        }))
    }

    /// Drops the dedicated connection.
    pub async fn dispose(&self) {
        *self.connection.lock().await = None;
    }
}
