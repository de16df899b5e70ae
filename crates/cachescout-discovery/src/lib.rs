//! Cachescout Discovery
//!
//! The discovery half of the cachescout core: a dedicated client for the
//! cluster's configuration endpoint and the timer-driven loop that keeps a
//! consumer synchronized with the cluster's published membership.
//!
//! # Components
//!
//! - [`ConfigNode`] - opens one connection to the configuration endpoint,
//!   issues `config get cluster`, and parses the versioned roster
//! - [`ClusterPoller`] - invokes the config node on an interval and pushes
//!   strictly-newer rosters to a [`ConfigObserver`]
//! - [`ClusterConfig`] - the parsed `(version, nodes)` snapshot
//!
//! Version handling is the poller's job: a response whose version is less
//! than or equal to the last applied one is dropped without notifying the
//! observer, so observers see a strictly increasing version sequence.

pub mod config_node;
pub mod poller;
pub mod response;

pub use config_node::ConfigNode;
pub use poller::{ClusterPoller, ConfigObserver};
pub use response::ClusterConfig;
