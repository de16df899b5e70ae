use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use cachescout_common::endpoint::NodeEndpoint;
use cachescout_common::error::Result;
use cachescout_common::settings::ClusterSettings;
use cachescout_discovery::{ClusterPoller, ConfigNode, ConfigObserver};

use crate::node::{CacheNode, NodeFactory, TcpNodeFactory};
use crate::operations::{factory_for, OperationFactory};
use crate::ring::HashRing;

/// How long a handle dropped from the roster stays undisposed, so an
/// in-flight operation that located it before the swap can finish.
const RETIRE_GRACE: Duration = Duration::from_millis(2000);

/// Capacity of the public node-failure broadcast.
const FAILURE_EVENT_CAPACITY: usize = 32;

/// Auto-updating server pool.
///
/// Holds the cluster's live node set, routes keys over a consistent-hash
/// ring rebuilt on every membership change, and resurrects dead nodes once
/// they answer a liveness probe. Roster changes arrive from the discovery
/// poller; failures arrive from the node handles themselves.
///
/// The routing table is read with a single atomic load on every
/// [`locate`](AutoServerPool::locate) call and replaced wholesale under the
/// pool mutex, so user traffic never contends with membership updates.
pub struct AutoServerPool<F: NodeFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: NodeFactory> Clone for AutoServerPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct PoolInner<F: NodeFactory> {
    settings: ClusterSettings,
    factory: F,
    /// Current routing table; never null. Empty before `start` and after
    /// `dispose`.
    locator: ArcSwap<HashRing<F::Node>>,
    /// Guards `PoolState`. Never held across `locate`.
    dead_sync: Mutex<PoolState<F>>,
    /// Cloned into every node handle; carries failure notifications back.
    failure_tx: mpsc::UnboundedSender<NodeEndpoint>,
    failed_events: broadcast::Sender<Arc<F::Node>>,
    op_factory: Arc<dyn OperationFactory>,
}

struct PoolState<F: NodeFactory> {
    /// Every handle the pool knows about, alive first, then dead.
    all_nodes: Vec<Arc<F::Node>>,
    resurrect_timer_active: bool,
    started: bool,
    disposed: bool,
    failure_rx: Option<mpsc::UnboundedReceiver<NodeEndpoint>>,
    failure_drain: Option<JoinHandle<()>>,
    resurrect_task: Option<JoinHandle<()>>,
    poller: Option<ClusterPoller>,
    config_node: Option<Arc<ConfigNode>>,
}

impl AutoServerPool<TcpNodeFactory> {
    /// Pool backed by real TCP node handles.
    pub fn new(settings: ClusterSettings) -> Self {
        Self::with_factory(settings, TcpNodeFactory)
    }
}

impl<F: NodeFactory> AutoServerPool<F> {
    /// Pool with a custom node factory, the seam tests and alternative
    /// cache backends plug into.
    pub fn with_factory(settings: ClusterSettings, factory: F) -> Self {
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let (failed_events, _) = broadcast::channel(FAILURE_EVENT_CAPACITY);
        let op_factory = factory_for(settings.protocol);

        Self {
            inner: Arc::new(PoolInner {
                settings,
                factory,
                locator: ArcSwap::from_pointee(HashRing::empty()),
                dead_sync: Mutex::new(PoolState {
                    all_nodes: Vec::new(),
                    resurrect_timer_active: false,
                    started: false,
                    disposed: false,
                    failure_rx: Some(failure_rx),
                    failure_drain: None,
                    resurrect_task: None,
                    poller: None,
                    config_node: None,
                }),
                failure_tx,
                failed_events,
                op_factory,
            }),
        }
    }

    /// Starts the pool: builds the initial node set, publishes the first
    /// routing table, and launches the discovery poller.
    ///
    /// The initial roster comes from `settings.initial_nodes` when
    /// configured, otherwise from an initial resolution against the
    /// configuration endpoint using the settings' retry policy.
    ///
    /// Starting an already-started or disposed pool is a no-op.
    ///
    /// # Errors
    ///
    /// Surfaces the last resolution error when every initial discovery
    /// attempt fails; the pool is left unstarted.
    pub async fn start(&self) -> Result<()> {
        {
            let state = self.inner.dead_sync.lock().await;
            if state.disposed || state.started {
                return Ok(());
            }
        }

        let config_node = Arc::new(ConfigNode::from_settings(&self.inner.settings));
        let (initial_nodes, initial_version) = if self.inner.settings.initial_nodes.is_empty() {
            let config = config_node.resolve_with_retry().await?;
            (config.nodes, Some(config.version))
        } else {
            (self.inner.settings.initial_nodes.clone(), None)
        };

        {
            let mut state = self.inner.dead_sync.lock().await;
            if state.disposed || state.started {
                return Ok(());
            }
            state.started = true;
            state.config_node = Some(config_node.clone());
            if let Some(failures) = state.failure_rx.take() {
                state.failure_drain = Some(tokio::spawn(drain_failures(
                    Arc::downgrade(&self.inner),
                    failures,
                )));
            }
        }

        self.inner.update_locator(initial_nodes).await;

        let observer = Arc::new(PoolObserver {
            inner: Arc::downgrade(&self.inner),
        });
        let poller = ClusterPoller::new(
            config_node,
            observer,
            self.inner.settings.poll_interval,
        );
        if let Some(version) = initial_version {
            poller.seed_version(version);
        }
        poller.start();

        let mut state = self.inner.dead_sync.lock().await;
        if state.disposed {
            // dispose() won the race; unwind the poller we just started.
            drop(state);
            poller.stop().await;
            return Ok(());
        }
        state.poller = Some(poller);
        drop(state);

        info!(endpoint = %self.inner.settings.endpoint, "server pool started");
        Ok(())
    }

    /// Routes a key to its node. Wait-free: one atomic load of the current
    /// routing table. Returns `None` when no alive node exists or the pool
    /// is disposed.
    pub fn locate(&self, key: &str) -> Option<Arc<F::Node>> {
        self.inner.locator.load().locate(key)
    }

    /// Snapshot of the currently-alive nodes.
    pub async fn working_nodes(&self) -> Vec<Arc<F::Node>> {
        let state = self.inner.dead_sync.lock().await;
        state
            .all_nodes
            .iter()
            .filter(|node| node.is_alive())
            .cloned()
            .collect()
    }

    /// Every node the pool knows about, dead ones included.
    pub async fn node_count(&self) -> usize {
        self.inner.dead_sync.lock().await.all_nodes.len()
    }

    pub async fn alive_count(&self) -> usize {
        self.working_nodes().await.len()
    }

    /// The protocol-specific operation factory selected at construction.
    pub fn operation_factory(&self) -> Arc<dyn OperationFactory> {
        self.inner.op_factory.clone()
    }

    /// Subscribes to node-failure events. Each failure is delivered with
    /// the failing handle.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<Arc<F::Node>> {
        self.inner.failed_events.subscribe()
    }

    /// Applies a new roster; normally invoked by the discovery poller, but
    /// public so membership can also be driven externally.
    pub async fn update_locator(&self, endpoints: Vec<NodeEndpoint>) {
        self.inner.update_locator(endpoints).await;
    }

    /// Idempotent teardown: stops the poller, cancels the resurrection
    /// timer, swaps in an empty routing table, and disposes every node
    /// handle. Concurrent callers are safe; late callers return
    /// immediately.
    pub async fn dispose(&self) {
        let (nodes, poller, config_node, resurrect_task, failure_drain) = {
            let mut state = self.inner.dead_sync.lock().await;
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.resurrect_timer_active = false;
            (
                std::mem::take(&mut state.all_nodes),
                state.poller.take(),
                state.config_node.take(),
                state.resurrect_task.take(),
                state.failure_drain.take(),
            )
        };

        if let Some(poller) = poller {
            poller.stop().await;
        }
        if let Some(task) = resurrect_task {
            task.abort();
        }
        if let Some(task) = failure_drain {
            task.abort();
        }
        if let Some(config_node) = config_node {
            config_node.dispose().await;
        }

        self.inner.locator.store(Arc::new(HashRing::empty()));
        futures::future::join_all(nodes.iter().map(|node| node.dispose())).await;
        info!("server pool disposed");
    }
}

impl<F: NodeFactory> PoolInner<F> {
    /// Merges a new roster into the pool.
    ///
    /// Dead handles for endpoints still in the roster are kept so their
    /// probe state survives the update; every other endpoint gets a fresh
    /// handle. Handles for endpoints no longer in the roster are disposed
    /// after a grace period.
    async fn update_locator(self: &Arc<Self>, endpoints: Vec<NodeEndpoint>) {
        let mut state = self.dead_sync.lock().await;
        if state.disposed {
            return;
        }

        let mut existing: HashMap<NodeEndpoint, Arc<F::Node>> = state
            .all_nodes
            .drain(..)
            .map(|node| (node.endpoint().clone(), node))
            .collect();

        let mut seen = HashSet::with_capacity(endpoints.len());
        let mut alive = Vec::with_capacity(endpoints.len());
        let mut dead = Vec::new();
        let mut retired = Vec::new();

        for endpoint in endpoints {
            if !seen.insert(endpoint.clone()) {
                continue;
            }
            match existing.remove(&endpoint) {
                // A dead handle keeps its probe state across updates.
                Some(old) if !old.is_alive() => dead.push(old),
                old => {
                    if let Some(old) = old {
                        retired.push(old);
                    }
                    alive.push(self.factory.create(endpoint, self.failure_tx.clone()));
                }
            }
        }
        // Endpoints absent from the new roster are dropped entirely.
        retired.extend(existing.into_values());

        info!(
            alive = alive.len(),
            dead = dead.len(),
            retired = retired.len(),
            "applying cluster membership update"
        );

        let ring = HashRing::new(alive.clone());
        state.all_nodes = alive;
        state.all_nodes.extend(dead.iter().cloned());
        self.locator.store(Arc::new(ring));
        if !dead.is_empty() {
            self.arm_resurrect_timer(&mut state);
        }
        drop(state);

        if !retired.is_empty() {
            debug!(count = retired.len(), "retiring node handles after grace period");
            tokio::spawn(async move {
                tokio::time::sleep(RETIRE_GRACE).await;
                for node in retired {
                    node.dispose().await;
                }
            });
        }
    }

    /// Reacts to a failure notification from a node handle.
    async fn on_node_failed(self: &Arc<Self>, endpoint: NodeEndpoint) {
        let mut state = self.dead_sync.lock().await;
        if state.disposed {
            return;
        }
        let handle = state
            .all_nodes
            .iter()
            .find(|node| *node.endpoint() == endpoint)
            .cloned();
        let Some(handle) = handle else {
            // Retired handle failing late; nothing to reroute.
            return;
        };

        warn!(node = %endpoint, "node failed, removing from routing");
        let _ = self.failed_events.send(handle);

        let alive: Vec<_> = state
            .all_nodes
            .iter()
            .filter(|node| node.is_alive())
            .cloned()
            .collect();
        self.locator.store(Arc::new(HashRing::new(alive)));
        self.arm_resurrect_timer(&mut state);
    }

    /// Arms the resurrection timer if it is idle. A failure arriving while
    /// the timer is pending does not re-arm it; the pending tick inspects
    /// every dead node anyway.
    fn arm_resurrect_timer(self: &Arc<Self>, state: &mut PoolState<F>) {
        if state.resurrect_timer_active || state.disposed {
            return;
        }
        state.resurrect_timer_active = true;

        let weak = Arc::downgrade(self);
        let dead_timeout = self.settings.dead_timeout;
        debug!(timeout_ms = dead_timeout.as_millis() as u64, "arming resurrection timer");
        state.resurrect_task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(dead_timeout).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.resurrect_tick().await {
                    return;
                }
            }
        }));
    }

    /// One resurrection pass. Returns whether the timer should fire again.
    ///
    /// Probes run serialized under the pool mutex; the tick is infrequent
    /// and probing a node concurrently would risk duplicate probes.
    async fn resurrect_tick(&self) -> bool {
        let mut state = self.dead_sync.lock().await;
        if state.disposed {
            return false;
        }

        let mut changed = false;
        let mut dead_count = 0usize;
        let mut alive = Vec::with_capacity(state.all_nodes.len());
        for node in &state.all_nodes {
            if node.is_alive() {
                alive.push(node.clone());
            } else if node.ping().await {
                info!(node = %node.endpoint(), "dead node answered, restoring to routing");
                changed = true;
                alive.push(node.clone());
            } else {
                dead_count += 1;
            }
        }

        if changed {
            self.locator.store(Arc::new(HashRing::new(alive)));
        }
        if dead_count == 0 {
            debug!("no dead nodes remain, resurrection timer idling");
            state.resurrect_timer_active = false;
            false
        } else {
            true
        }
    }
}

/// Bridges the discovery poller to the pool without owning it.
struct PoolObserver<F: NodeFactory> {
    inner: Weak<PoolInner<F>>,
}

#[async_trait]
impl<F: NodeFactory> ConfigObserver for PoolObserver<F> {
    async fn apply_nodes(&self, nodes: Vec<NodeEndpoint>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.update_locator(nodes).await;
        }
    }
}

/// Forwards failure notifications from node handles into the pool. Holds
/// only a weak reference, so a leaked handle cannot keep the pool alive.
async fn drain_failures<F: NodeFactory>(
    inner: Weak<PoolInner<F>>,
    mut failures: mpsc::UnboundedReceiver<NodeEndpoint>,
) {
    while let Some(endpoint) = failures.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.on_node_failed(endpoint).await;
    }
}
