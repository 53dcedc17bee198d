//! FIFO set of clients waiting on one segment.
//!
//! Ordered by a per-list ticket so removal by identity is O(log n) and never
//! disturbs the relative order of the remaining clients.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::record::{ClientId, ClientRecord};

#[derive(Debug, Default)]
pub struct WaitList {
    next_ticket: u64,
    queue: BTreeMap<u64, Arc<ClientRecord>>,
    tickets: HashMap<ClientId, u64>,
}

impl WaitList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `record` under `id`. Returns false if it is already waiting here.
    pub fn push(&mut self, id: ClientId, record: Arc<ClientRecord>) -> bool {
        if self.tickets.contains_key(&id) {
            return false;
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.tickets.insert(id, ticket);
        self.queue.insert(ticket, record);
        true
    }

    /// Remove the client with `id`. Returns false if it was not waiting here.
    pub fn remove(&mut self, id: ClientId) -> bool {
        match self.tickets.remove(&id) {
            Some(ticket) => {
                let removed = self.queue.remove(&ticket);
                debug_assert!(removed.is_some(), "ticket index out of sync");
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: ClientId) -> bool {
        self.tickets.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Clone the waiting clients in registration order.
    pub fn snapshot(&self) -> Vec<Arc<ClientRecord>> {
        self.queue.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::record::detached_record;

    fn ids(list: &WaitList) -> Vec<usize> {
        list.snapshot()
            .iter()
            .map(|r| r.profile().destination_index as usize)
            .collect()
    }

    fn tagged(tag: u16) -> Arc<ClientRecord> {
        let r = detached_record();
        r.set_profile(crate::registry::ClientProfile {
            destination_index: tag,
            ..Default::default()
        });
        r
    }

    #[test]
    fn preserves_fifo_across_removal() {
        let mut list = WaitList::new();
        for id in 1..=4 {
            assert!(list.push(id, tagged(id as u16)));
        }
        assert!(list.remove(2));
        assert_eq!(ids(&list), vec![1, 3, 4]);

        assert!(list.push(2, tagged(2)));
        assert_eq!(ids(&list), vec![1, 3, 4, 2]);
    }

    #[test]
    fn rejects_duplicates_and_unknown_removals() {
        let mut list = WaitList::new();
        assert!(list.push(1, tagged(1)));
        assert!(!list.push(1, tagged(1)));
        assert_eq!(list.len(), 1);

        assert!(!list.remove(9));
        assert!(list.remove(1));
        assert!(list.is_empty());
        assert!(!list.contains(1));
    }
}
