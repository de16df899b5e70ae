use cachescout_common::endpoint::NodeEndpoint;
use cachescout_common::error::{CachescoutError, Result};

/// A versioned snapshot of the cluster's node roster.
///
/// `version` is published by the configuration endpoint and never
/// decreases; a snapshot with a version at or below the last applied one
/// is stale and must be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub version: u64,
    pub nodes: Vec<NodeEndpoint>,
}

/// Parses the `CONFIG cluster 0 <len>` response header and returns the
/// payload byte length.
pub(crate) fn parse_header(line: &str) -> Result<usize> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        ["CONFIG", "cluster", _flags, len] => len.parse::<usize>().map_err(|_| {
            CachescoutError::Parse(format!("non-numeric payload length in '{}'", line))
        }),
        ["CONFIG", "cluster", ..] => Err(CachescoutError::Parse(format!(
            "malformed CONFIG header '{}'",
            line
        ))),
        ["CONFIG", key, ..] => Err(CachescoutError::Parse(format!(
            "unexpected configuration key '{}'",
            key
        ))),
        _ => Err(CachescoutError::Parse(format!(
            "unexpected response header '{}'",
            line
        ))),
    }
}

/// Parses a configuration payload of the form
/// `<version>\n<host>|<ip>|<port> <host>|<ip>|<port> ...`.
///
/// An empty node line yields an empty roster, which is a valid (if
/// unfortunate) cluster state. Trailing CR/LF inside the payload is
/// tolerated in both positions.
pub(crate) fn parse_payload(payload: &str) -> Result<ClusterConfig> {
    let (version_line, node_line) = match payload.split_once('\n') {
        Some(parts) => parts,
        None => {
            return Err(CachescoutError::Parse(
                "payload is missing the version line".to_string(),
            ))
        }
    };

    let version = version_line.trim().parse::<u64>().map_err(|_| {
        CachescoutError::Parse(format!("non-numeric config version '{}'", version_line.trim()))
    })?;

    let nodes = node_line
        .split_whitespace()
        .map(parse_node_token)
        .collect::<Result<Vec<_>>>()?;

    Ok(ClusterConfig { version, nodes })
}

/// Parses one `hostname|ip|port` node token.
///
/// Either `hostname` or `ip` may be empty; the IP is preferred when
/// present so equality follows the address the transport will dial.
fn parse_node_token(token: &str) -> Result<NodeEndpoint> {
    let mut fields = token.split('|');
    let (hostname, ip, port) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(hostname), Some(ip), Some(port), None) => (hostname, ip, port),
        _ => {
            return Err(CachescoutError::Parse(format!(
                "node token '{}' is not of the form hostname|ip|port",
                token
            )))
        }
    };

    let port = port.parse::<u16>().map_err(|_| {
        CachescoutError::Parse(format!("invalid port in node token '{}'", token))
    })?;
    if port == 0 {
        return Err(CachescoutError::Parse(format!(
            "zero port in node token '{}'",
            token
        )));
    }

    if !ip.is_empty() {
        let ip = ip.parse().map_err(|_| {
            CachescoutError::Parse(format!("invalid ip in node token '{}'", token))
        })?;
        Ok(NodeEndpoint::with_ip(hostname, ip, port))
    } else if !hostname.is_empty() {
        Ok(NodeEndpoint::new(hostname, port))
    } else {
        Err(CachescoutError::Parse(format!(
            "node token '{}' has neither hostname nor ip",
            token
        )))
    }
}
