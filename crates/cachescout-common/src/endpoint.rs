use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::{CachescoutError, Result};

/// Address of the cluster's configuration discovery service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    hostname: String,
    port: u16,
}

impl ClusterEndpoint {
    /// Creates a validated cluster endpoint.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the hostname is empty or the port
    /// is zero. Whether the endpoint actually supports auto-discovery (the
    /// `.cfg.` label) is checked when client settings are built, since
    /// plain node endpoints are dialed through the same type.
    pub fn new(hostname: impl Into<String>, port: u16) -> Result<Self> {
        let hostname = hostname.into();
        if hostname.trim().is_empty() {
            return Err(CachescoutError::Configuration(
                "cluster endpoint hostname must not be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(CachescoutError::Configuration(
                "cluster endpoint port must be greater than zero".to_string(),
            ));
        }
        Ok(Self { hostname, port })
    }

    /// True when the hostname carries the `.cfg.` label the cluster
    /// management plane publishes for configuration endpoints.
    pub fn supports_autodiscovery(&self) -> bool {
        self.hostname.to_ascii_lowercase().contains(".cfg.")
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The `host:port` string the transport dials.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

impl fmt::Display for ClusterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// Identity of a single cache node.
///
/// The hostname form is preserved for diagnostics, but equality and hashing
/// use the representation the transport actually dials: the IP when one is
/// known, otherwise the hostname. Two endpoints naming the same node through
/// the same resolved form therefore collapse to one identity across roster
/// updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEndpoint {
    hostname: String,
    ip: Option<IpAddr>,
    port: u16,
}

impl NodeEndpoint {
    /// Endpoint known only by hostname.
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            ip: None,
            port,
        }
    }

    /// Endpoint with a resolved IP; the hostname is kept for display.
    pub fn with_ip(hostname: impl Into<String>, ip: IpAddr, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            ip: Some(ip),
            port,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The `host:port` string the transport dials, preferring the IP.
    pub fn dial_address(&self) -> String {
        match self.ip {
            Some(ip) => SocketAddr::new(ip, self.port).to_string(),
            None => format!("{}:{}", self.hostname, self.port),
        }
    }
}

impl PartialEq for NodeEndpoint {
    fn eq(&self, other: &Self) -> bool {
        if self.port != other.port {
            return false;
        }
        match (self.ip, other.ip) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.hostname == other.hostname,
            _ => false,
        }
    }
}

impl Eq for NodeEndpoint {}

impl Hash for NodeEndpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.ip {
            Some(ip) => ip.hash(state),
            None => self.hostname.hash(state),
        }
        self.port.hash(state);
    }
}

impl fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hostname.is_empty() {
            write!(f, "{}", self.dial_address())
        } else {
            write!(f, "{}:{}", self.hostname, self.port)
        }
    }
}
