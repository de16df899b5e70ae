//! Cachescout Pool
//!
//! The auto-updating server pool at the heart of the cachescout core. It
//! keeps a client's view of a clustered cache synchronized with the
//! cluster's published membership while routing user operations with
//! stable consistent-hash assignment and tolerating per-node failure.
//!
//! # Architecture
//!
//! Three concerns meet here:
//!
//! 1. **Routing** - [`HashRing`] maps keys to alive node handles. The pool
//!    publishes a new ring atomically on every membership change;
//!    [`AutoServerPool::locate`] is a single atomic load.
//! 2. **Discovery** - the pool implements the discovery crate's observer
//!    seam, merging each new roster into its node set while preserving the
//!    probe state of nodes that are currently dead.
//! 3. **Resurrection** - a node's `failed` notification removes it from
//!    routing and arms a single self-rearming timer that probes every dead
//!    node until the set drains, at which point the timer idles.
//!
//! # Example
//!
//! ```no_run
//! use cachescout_common::ClusterSettings;
//! use cachescout_pool::{AutoServerPool, CacheNode};
//!
//! # async fn demo() -> cachescout_common::Result<()> {
//! let settings = ClusterSettings::new("demo.cfg.cache.example", 11211)?;
//! let pool = AutoServerPool::new(settings);
//! pool.start().await?;
//!
//! if let Some(node) = pool.locate("user:42") {
//!     println!("user:42 -> {}", node.endpoint());
//! }
//!
//! pool.dispose().await;
//! # Ok(())
//! # }
//! ```

pub mod node;
pub mod operations;
pub mod pool;
pub mod ring;

pub use node::{CacheNode, NodeFactory, TcpNode, TcpNodeFactory};
pub use operations::{factory_for, BinaryOperationFactory, OperationFactory, TextOperationFactory};
pub use pool::AutoServerPool;
pub use ring::HashRing;
