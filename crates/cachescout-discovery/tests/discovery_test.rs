//! End-to-end tests for the configuration client and the polling loop,
//! driven against a scripted configuration endpoint on a real socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use cachescout_common::endpoint::{ClusterEndpoint, NodeEndpoint};
use cachescout_discovery::{ClusterPoller, ConfigNode, ConfigObserver};

/// Scripted configuration endpoint. Serves the currently-set roster to
/// every `config get cluster` it receives.
struct MockConfigServer {
    addr: String,
    state: Arc<Mutex<(u64, String)>>,
    accepts: Arc<AtomicUsize>,
}

impl MockConfigServer {
    async fn start(version: u64, nodes: &str) -> Self {
        Self::start_inner(version, nodes, false).await
    }

    /// Variant that closes each connection after serving one response, to
    /// exercise the redial path.
    async fn start_one_shot(version: u64, nodes: &str) -> Self {
        Self::start_inner(version, nodes, true).await
    }

    async fn start_inner(version: u64, nodes: &str, one_shot: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new((version, nodes.to_string())));
        let accepts = Arc::new(AtomicUsize::new(0));

        let server_state = state.clone();
        let server_accepts = accepts.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                server_accepts.fetch_add(1, Ordering::SeqCst);
                let state = server_state.clone();
                tokio::spawn(async move {
                    let mut reader = BufReader::new(socket);
                    loop {
                        let mut line = String::new();
                        match reader.read_line(&mut line).await {
                            Ok(0) | Err(_) => return,
                            Ok(_) => {}
                        }
                        if !line.starts_with("config get cluster") {
                            return;
                        }
                        let response = {
                            let state = state.lock().unwrap();
                            let payload = format!("{}\n{}", state.0, state.1);
                            format!("CONFIG cluster 0 {}\r\n{}\r\nEND\r\n", payload.len(), payload)
                        };
                        if reader.get_mut().write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                        if one_shot {
                            return;
                        }
                    }
                });
            }
        });

        Self { addr, state, accepts }
    }

    fn set(&self, version: u64, nodes: &str) {
        let mut state = self.state.lock().unwrap();
        *state = (version, nodes.to_string());
    }

    fn endpoint(&self) -> ClusterEndpoint {
        let (host, port) = self.addr.rsplit_once(':').unwrap();
        ClusterEndpoint::new(host, port.parse().unwrap()).unwrap()
    }

    fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}

/// Observer that records every roster it is handed.
#[derive(Default)]
struct RecordingObserver {
    applied: Mutex<Vec<Vec<NodeEndpoint>>>,
}

#[async_trait]
impl ConfigObserver for RecordingObserver {
    async fn apply_nodes(&self, nodes: Vec<NodeEndpoint>) {
        self.applied.lock().unwrap().push(nodes);
    }
}

impl RecordingObserver {
    fn applied_count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }
}

#[tokio::test]
async fn resolve_parses_versioned_roster() {
    let server = MockConfigServer::start(
        3,
        "foo.example|10.0.0.1|11211 bar.example|10.0.0.2|11211",
    )
    .await;

    let node = ConfigNode::new(server.endpoint());
    let config = node.resolve().await.unwrap();

    assert_eq!(config.version, 3);
    assert_eq!(config.nodes.len(), 2);
    assert_eq!(config.nodes[0].dial_address(), "10.0.0.1:11211");
    assert_eq!(config.nodes[1].dial_address(), "10.0.0.2:11211");
}

#[tokio::test]
async fn resolve_reuses_the_dedicated_connection() {
    let server = MockConfigServer::start(1, "foo.example|10.0.0.1|11211").await;

    let node = ConfigNode::new(server.endpoint());
    node.resolve().await.unwrap();
    node.resolve().await.unwrap();

    assert_eq!(server.accepts(), 1);
}

#[tokio::test]
async fn resolve_redials_after_connection_loss() {
    let server = MockConfigServer::start_one_shot(1, "foo.example|10.0.0.1|11211").await;

    let node = ConfigNode::new(server.endpoint());
    assert_eq!(node.resolve().await.unwrap().version, 1);

    // The server hung up after the first response; the stale connection
    // fails, then the following call dials fresh.
    let _ = node.resolve().await;
    assert_eq!(node.resolve().await.unwrap().version, 1);
    assert!(server.accepts() >= 2);
}

#[tokio::test]
async fn resolve_with_retry_surfaces_the_last_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut settings = cachescout_common::ClusterSettings::new("test.cfg.cache.example", 11211)
        .unwrap()
        .with_tries(3)
        .with_retry_delay(Duration::from_millis(30));
    settings.endpoint = ClusterEndpoint::new(addr.ip().to_string(), addr.port()).unwrap();
    let node = ConfigNode::from_settings(&settings);

    let started = std::time::Instant::now();
    let err = node.resolve_with_retry().await.unwrap_err();
    assert!(matches!(
        err,
        cachescout_common::CachescoutError::Connection(_)
    ));
    // Three attempts with a pause between each.
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn poller_applies_only_strictly_newer_versions() {
    let server = MockConfigServer::start(5, "a.example|10.0.0.1|11211").await;
    let observer = Arc::new(RecordingObserver::default());

    let poller = ClusterPoller::new(
        Arc::new(ConfigNode::new(server.endpoint())),
        observer.clone(),
        Duration::from_millis(50),
    );
    poller.start();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(observer.applied_count(), 1);
    assert_eq!(poller.last_config_version(), Some(5));

    // A lower version is stale and must be dropped.
    server.set(3, "b.example|10.0.0.2|11211");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(observer.applied_count(), 1);
    assert_eq!(poller.last_config_version(), Some(5));

    // Re-serving the applied version is idempotent.
    server.set(5, "a.example|10.0.0.1|11211");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(observer.applied_count(), 1);

    server.set(7, "a.example|10.0.0.1|11211 c.example|10.0.0.3|11211");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(observer.applied_count(), 2);
    assert_eq!(poller.last_config_version(), Some(7));

    let applied = observer.applied.lock().unwrap();
    assert_eq!(applied[0].len(), 1);
    assert_eq!(applied[1].len(), 2);
    drop(applied);

    poller.stop().await;
}

#[tokio::test]
async fn seeded_poller_skips_the_bootstrap_version() {
    let server = MockConfigServer::start(5, "a.example|10.0.0.1|11211").await;
    let observer = Arc::new(RecordingObserver::default());

    let poller = ClusterPoller::new(
        Arc::new(ConfigNode::new(server.endpoint())),
        observer.clone(),
        Duration::from_millis(50),
    );
    poller.seed_version(5);
    poller.start();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(observer.applied_count(), 0);

    server.set(6, "a.example|10.0.0.1|11211");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(observer.applied_count(), 1);
    assert_eq!(poller.last_config_version(), Some(6));

    poller.stop().await;
}

#[tokio::test]
async fn stopped_poller_ticks_no_more() {
    let server = MockConfigServer::start(1, "a.example|10.0.0.1|11211").await;
    let observer = Arc::new(RecordingObserver::default());

    let poller = ClusterPoller::new(
        Arc::new(ConfigNode::new(server.endpoint())),
        observer.clone(),
        Duration::from_millis(50),
    );
    poller.start();
    tokio::time::sleep(Duration::from_millis(120)).await;
    poller.stop().await;

    let applied = observer.applied_count();
    server.set(9, "b.example|10.0.0.2|11211");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(observer.applied_count(), applied);
}

#[tokio::test]
async fn poller_survives_an_unreachable_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let observer = Arc::new(RecordingObserver::default());
    let endpoint = ClusterEndpoint::new(addr.ip().to_string(), addr.port()).unwrap();
    let poller = ClusterPoller::new(
        Arc::new(ConfigNode::new(endpoint)),
        observer.clone(),
        Duration::from_millis(50),
    );
    poller.start();

    // Several failing ticks; the loop logs and keeps going.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(observer.applied_count(), 0);
    assert_eq!(poller.last_config_version(), None);

    poller.stop().await;
}
