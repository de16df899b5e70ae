//! Cachescout Common Types and Transport
//!
//! Shared foundation for the cachescout auto-discovery client core:
//!
//! - [`error`] - The workspace error type and `Result` alias
//! - [`endpoint`] - Cluster and node endpoint identities
//! - [`settings`] - Validated client settings and the protocol selector
//! - [`transport`] - Minimal memcached text-protocol transport
//!
//! # Overview
//!
//! Cachescout keeps a client's view of a managed cache cluster synchronized
//! with the cluster's true membership. The crates above this one implement
//! the discovery loop (`cachescout-discovery`) and the auto-updating server
//! pool (`cachescout-pool`); this crate holds the types both sides agree on.
//!
//! # Example
//!
//! ```
//! use cachescout_common::{ClusterSettings, Protocol};
//!
//! let settings = ClusterSettings::new("demo.cfg.cache.example", 11211)
//!     .unwrap()
//!     .with_protocol(Protocol::Text);
//! assert_eq!(settings.endpoint.port(), 11211);
//! ```

pub mod endpoint;
pub mod error;
pub mod settings;
pub mod transport;

pub use endpoint::{ClusterEndpoint, NodeEndpoint};
pub use error::{CachescoutError, Result};
pub use settings::{ClusterSettings, Protocol};
