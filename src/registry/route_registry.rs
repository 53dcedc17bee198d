//! The shared route registry.
//!
//! # Invariants (hold whenever the lock is released)
//! - A segment entry exists iff its wait list is non-empty
//! - `node_interest[n] > 0` iff some present segment has origin `n`, and equals
//!   the number of (segment, client) memberships with that origin
//! - A client appears at most once per segment
//!
//! # Locking
//! One `RwLock` guards everything. Register/unregister take it exclusively;
//! presence checks and snapshots take it shared and return owned data, so no
//! caller ever holds the lock across an await point.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::record::{ClientId, ClientRecord};
use super::segment::{Node, SegmentKey};
use super::waitlist::WaitList;

#[derive(Debug)]
struct Inner {
    node_interest: HashMap<Node, u32>,
    segments: HashMap<SegmentKey, WaitList>,
    last_client_id: ClientId,
}

impl Inner {
    fn next_client_id(&mut self) -> ClientId {
        self.last_client_id = self.last_client_id.wrapping_add(1).max(1);
        self.last_client_id
    }

    fn register(&mut self, key: SegmentKey, client: &Arc<ClientRecord>) -> bool {
        let id = client.assign_id(|| self.next_client_id());
        let inserted = self
            .segments
            .entry(key)
            .or_default()
            .push(id, Arc::clone(client));
        if inserted {
            *self.node_interest.entry(key.origin()).or_insert(0) += 1;
        }
        inserted
    }

    fn unregister(&mut self, key: SegmentKey, id: ClientId) -> bool {
        let Some(list) = self.segments.get_mut(&key) else {
            return false;
        };
        if !list.remove(id) {
            return false;
        }
        if list.is_empty() {
            self.segments.remove(&key);
        }

        let origin = key.origin();
        match self.node_interest.get_mut(&origin) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.node_interest.remove(&origin);
            }
            None => debug_assert!(false, "segment {key} present without interest in {origin}"),
        }
        true
    }
}

/// Segment index of waiting clients, shared by every session.
#[derive(Debug)]
pub struct RouteRegistry {
    inner: RwLock<Inner>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                node_interest: HashMap::new(),
                segments: HashMap::new(),
                last_client_id: 0,
            }),
        }
    }

    /// Add `client` to the wait list of `origin → destination`, assigning its
    /// id first if needed. Returns false if it was already waiting there.
    pub fn register_segment(&self, origin: Node, destination: Node, client: &Arc<ClientRecord>) -> bool {
        self.inner
            .write()
            .register(SegmentKey::new(origin, destination), client)
    }

    /// Remove client `id` from `origin → destination`. Returns false if it was
    /// not waiting there.
    pub fn unregister_segment(&self, origin: Node, destination: Node, id: ClientId) -> bool {
        self.inner
            .write()
            .unregister(SegmentKey::new(origin, destination), id)
    }

    /// Register every `origin → d` for `d` in `destinations` under one lock hold.
    pub fn register_route(&self, origin: Node, destinations: &[Node], client: &Arc<ClientRecord>) {
        let mut inner = self.inner.write();
        for &destination in destinations {
            inner.register(SegmentKey::new(origin, destination), client);
        }
    }

    /// Inverse of [`register_route`](Self::register_route).
    pub fn unregister_route(&self, origin: Node, destinations: &[Node], id: ClientId) {
        let mut inner = self.inner.write();
        for &destination in destinations {
            inner.unregister(SegmentKey::new(origin, destination), id);
        }
    }

    /// True iff some waiting client's segment starts at `node`.
    pub fn is_node_interested(&self, node: Node) -> bool {
        self.inner.read().node_interest.contains_key(&node)
    }

    /// Waiting clients on `origin → destination` in registration order.
    pub fn segment_snapshot(&self, origin: Node, destination: Node) -> Vec<Arc<ClientRecord>> {
        self.inner
            .read()
            .segments
            .get(&SegmentKey::new(origin, destination))
            .map(WaitList::snapshot)
            .unwrap_or_default()
    }

    pub fn has_segment(&self, origin: Node, destination: Node) -> bool {
        self.inner
            .read()
            .segments
            .contains_key(&SegmentKey::new(origin, destination))
    }

    /// Number of memberships whose segment starts at `node`.
    pub fn node_interest(&self, node: Node) -> u32 {
        self.inner.read().node_interest.get(&node).copied().unwrap_or(0)
    }

    pub fn segment_count(&self) -> usize {
        self.inner.read().segments.len()
    }

    pub fn interested_node_count(&self) -> usize {
        self.inner.read().node_interest.len()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.segments.is_empty() && inner.node_interest.is_empty()
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}
