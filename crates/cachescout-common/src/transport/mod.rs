//! Transport layer for the memcached text protocol.
//!
//! Only the small slice of the protocol the discovery core needs lives
//! here: dialing a node, sending a single command line, and reading
//! line- or length-delimited responses.

mod text;

pub use text::TextConnection;
