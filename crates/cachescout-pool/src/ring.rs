use std::hash::{Hash, Hasher};
use std::sync::Arc;

use siphasher::sip::SipHasher24;

use crate::node::CacheNode;

/// Points each node occupies on the ring. More points smooth the key
/// distribution at the cost of a larger (still binary-searched) table.
const POINTS_PER_NODE: usize = 160;

/// Hash an arbitrary byte slice to a `u64` ring position using SipHash-2-4.
fn hash_bytes(data: &[u8]) -> u64 {
    let mut hasher = SipHasher24::new();
    data.hash(&mut hasher);
    hasher.finish()
}

/// Immutable consistent-hash routing table over node handles.
///
/// A key is routed to the node owning the first ring point at or after the
/// key's hash, wrapping around. The ring is built afresh on every
/// membership change and published by atomic swap; it is never mutated
/// after construction, so readers holding an old ring always see a
/// coherent node set.
pub struct HashRing<N: CacheNode> {
    /// Sorted `(point, node index)` pairs.
    points: Vec<(u64, usize)>,
    nodes: Vec<Arc<N>>,
}

impl<N: CacheNode> HashRing<N> {
    /// Builds a ring over the given handles.
    ///
    /// Ring points are derived from each node's dialed address, so a node
    /// keeps its ring positions across rebuilds and most keys keep their
    /// assignment when an unrelated node joins or leaves.
    pub fn new(nodes: Vec<Arc<N>>) -> Self {
        let mut points = Vec::with_capacity(nodes.len() * POINTS_PER_NODE);
        for (index, node) in nodes.iter().enumerate() {
            let address = node.endpoint().dial_address();
            for replica in 0..POINTS_PER_NODE {
                let label = format!("{}#{}", address, replica);
                points.push((hash_bytes(label.as_bytes()), index));
            }
        }
        points.sort_unstable();
        Self { points, nodes }
    }

    /// Ring with no nodes; every lookup misses.
    pub fn empty() -> Self {
        Self {
            points: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Maps a key to its node, or `None` on an empty ring.
    pub fn locate(&self, key: &str) -> Option<Arc<N>> {
        if self.points.is_empty() {
            return None;
        }
        let position = hash_bytes(key.as_bytes());
        let at = self.points.partition_point(|(point, _)| *point < position);
        let (_, index) = self.points[at % self.points.len()];
        Some(self.nodes[index].clone())
    }

    /// The handles this ring was built over.
    pub fn nodes(&self) -> &[Arc<N>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
