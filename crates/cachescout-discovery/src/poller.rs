use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use cachescout_common::endpoint::NodeEndpoint;

use crate::config_node::ConfigNode;

/// Receives roster updates from the poller.
///
/// Implemented by the server pool; the implementation must hold at most a
/// weak reference back to whatever owns the poller, so the subscription
/// never keeps the pool alive.
#[async_trait]
pub trait ConfigObserver: Send + Sync + 'static {
    async fn apply_nodes(&self, nodes: Vec<NodeEndpoint>);
}

/// Timer-driven discovery loop.
///
/// Every `interval`, resolves the cluster configuration and hands the
/// roster to the observer when (and only when) the version is strictly
/// greater than the last applied one. Failures within a tick are logged
/// and never terminate the loop; a tick still running when the next fire
/// arrives causes that fire to be skipped.
pub struct ClusterPoller {
    shared: Arc<PollerShared>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct PollerShared {
    config_node: Arc<ConfigNode>,
    observer: Arc<dyn ConfigObserver>,
    interval: Duration,
    last_version: Mutex<Option<u64>>,
}

impl ClusterPoller {
    pub fn new(
        config_node: Arc<ConfigNode>,
        observer: Arc<dyn ConfigObserver>,
        interval: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(PollerShared {
                config_node,
                observer,
                interval,
                last_version: Mutex::new(None),
            }),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Marks `version` as already applied, so the first poll only pushes a
    /// roster strictly newer than the one the caller bootstrapped from.
    pub fn seed_version(&self, version: u64) {
        *self.shared.last_version.lock().expect("poller lock poisoned") = Some(version);
    }

    /// Greatest config version applied so far.
    pub fn last_config_version(&self) -> Option<u64> {
        *self.shared.last_version.lock().expect("poller lock poisoned")
    }

    /// Starts the polling task. The first tick fires immediately. Calling
    /// `start` on a running poller is a no-op.
    pub fn start(&self) {
        let mut task = self.task.lock().expect("poller lock poisoned");
        if task.is_some() {
            return;
        }

        let shared = self.shared.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        *task = Some(tokio::spawn(async move {
            let period = shared.interval.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval(period);
            // A tick that outlives its interval swallows the next fire
            // instead of piling up behind it.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => shared.tick().await,
                    _ = shutdown_rx.changed() => {
                        debug!("cluster poller stopping");
                        return;
                    }
                }
            }
        }));
    }

    /// Cancels future ticks and waits for an in-flight tick to finish.
    pub async fn stop(&self) {
        let handle = self.task.lock().expect("poller lock poisoned").take();
        if let Some(handle) = handle {
            let _ = self.shutdown.send(true);
            let _ = handle.await;
        }
    }
}

impl PollerShared {
    async fn tick(&self) {
        // One bounded retry per tick; after that the failure is logged and
        // the next tick takes over.
        let config = match self.config_node.resolve().await {
            Ok(config) => config,
            Err(first) => {
                debug!(error = %first, "configuration poll failed, retrying within tick");
                match self.config_node.resolve().await {
                    Ok(config) => config,
                    Err(e) => {
                        warn!(endpoint = %self.config_node.endpoint(), error = %e,
                            "configuration poll failed");
                        return;
                    }
                }
            }
        };

        {
            let last = self.last_version.lock().expect("poller lock poisoned");
            if let Some(last) = *last {
                if config.version <= last {
                    debug!(version = config.version, last, "dropping stale configuration");
                    return;
                }
            }
        }

        info!(
            version = config.version,
            nodes = config.nodes.len(),
            "applying cluster configuration"
        );
        let version = config.version;
        self.observer.apply_nodes(config.nodes).await;
        *self.last_version.lock().expect("poller lock poisoned") = Some(version);
    }
}
