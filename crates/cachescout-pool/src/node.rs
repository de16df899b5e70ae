use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use cachescout_common::endpoint::NodeEndpoint;
use cachescout_common::transport::TextConnection;

/// One cache node as seen by the pool.
///
/// This is the seam to the underlying cache client library: the pool needs
/// identity, a liveness flag, a reconnect probe, and socket teardown, and
/// nothing else. Cache traffic itself flows through the library that owns
/// the node's socket pool.
#[async_trait]
pub trait CacheNode: Send + Sync + 'static {
    fn endpoint(&self) -> &NodeEndpoint;

    /// True until the node is marked failed; reset by a successful [`ping`].
    ///
    /// [`ping`]: CacheNode::ping
    fn is_alive(&self) -> bool;

    /// Flags the node dead and notifies the owning pool. Repeated calls
    /// between resurrections collapse into one notification.
    fn mark_failed(&self);

    /// Attempts to re-establish connectivity; flips the node back to alive
    /// and returns true on success.
    async fn ping(&self) -> bool;

    /// Releases sockets held by the node.
    async fn dispose(&self);
}

/// Creates node handles wired to the pool's failure channel.
///
/// The sender is the node's only back-reference to the pool, so a handle
/// never keeps its pool alive.
pub trait NodeFactory: Send + Sync + 'static {
    type Node: CacheNode;

    fn create(
        &self,
        endpoint: NodeEndpoint,
        failures: mpsc::UnboundedSender<NodeEndpoint>,
    ) -> Arc<Self::Node>;
}

/// Node handle backed by a real TCP connection.
///
/// The connection is established lazily by the liveness probe; a fresh
/// handle is assumed alive until an operation against it fails.
pub struct TcpNode {
    endpoint: NodeEndpoint,
    alive: AtomicBool,
    connection: Mutex<Option<TextConnection>>,
    failures: mpsc::UnboundedSender<NodeEndpoint>,
}

impl TcpNode {
    fn new(endpoint: NodeEndpoint, failures: mpsc::UnboundedSender<NodeEndpoint>) -> Self {
        Self {
            endpoint,
            alive: AtomicBool::new(true),
            connection: Mutex::new(None),
            failures,
        }
    }
}

#[async_trait]
impl CacheNode for TcpNode {
    fn endpoint(&self) -> &NodeEndpoint {
        &self.endpoint
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn mark_failed(&self) {
        // swap keeps the notification single-shot per failure episode
        if self.alive.swap(false, Ordering::SeqCst) {
            let _ = self.failures.send(self.endpoint.clone());
        }
    }

    async fn ping(&self) -> bool {
        let mut connection = self.connection.lock().await;
        *connection = None;

        let mut fresh = match TextConnection::connect(&self.endpoint.dial_address()).await {
            Ok(conn) => conn,
            Err(e) => {
                debug!(node = %self.endpoint, error = %e, "liveness probe failed to connect");
                return false;
            }
        };

        let answered = match fresh.send_command("version").await {
            Ok(()) => matches!(fresh.read_line().await, Ok(line) if line.starts_with("VERSION")),
            Err(_) => false,
        };

        if answered {
            *connection = Some(fresh);
            self.alive.store(true, Ordering::SeqCst);
        }
        answered
    }

    async fn dispose(&self) {
        *self.connection.lock().await = None;
    }
}

/// Factory producing [`TcpNode`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpNodeFactory;

impl NodeFactory for TcpNodeFactory {
    type Node = TcpNode;

    fn create(
        &self,
        endpoint: NodeEndpoint,
        failures: mpsc::UnboundedSender<NodeEndpoint>,
    ) -> Arc<TcpNode> {
        Arc::new(TcpNode::new(endpoint, failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn version_server() -> NodeEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 64];
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 {
                            return;
                        }
                        if socket.write_all(b"VERSION 1.6.17\r\n").await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        NodeEndpoint::with_ip("node.test", addr.ip(), addr.port())
    }

    #[tokio::test]
    async fn mark_failed_notifies_once_per_episode() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let node = TcpNodeFactory.create(NodeEndpoint::new("node.test", 11211), tx);

        assert!(node.is_alive());
        node.mark_failed();
        node.mark_failed();
        assert!(!node.is_alive());

        assert_eq!(rx.recv().await.unwrap(), *node.endpoint());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ping_restores_a_dead_node() {
        let endpoint = version_server().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let node = TcpNodeFactory.create(endpoint, tx);

        node.mark_failed();
        assert!(!node.is_alive());

        assert!(node.ping().await);
        assert!(node.is_alive());
    }

    #[tokio::test]
    async fn ping_fails_against_an_unreachable_node() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, _rx) = mpsc::unbounded_channel();
        let node = TcpNodeFactory.create(
            NodeEndpoint::with_ip("node.test", addr.ip(), addr.port()),
            tx,
        );
        node.mark_failed();

        assert!(!node.ping().await);
        assert!(!node.is_alive());
    }
}
