/*!
The routing table: an indexed store of known neighbor nodes and their
scheduled contacts.

The table is touched only from the bundle processor's task, so it needs no
interior locking; the contact manager learns about boundary changes through
a watch channel carrying the next boundary time.
*/

use super::*;
use tern_bpv7::eid::Eid;

mod contact;
mod node;

#[cfg(test)]
mod tests;

pub use contact::{Contact, ContactId, ScheduledBundle};
pub use node::Node;

/// The routing priority classes, in increasing rank.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Bulk,
    Normal,
    Expedited,
}

impl Priority {
    pub(crate) const COUNT: usize = 3;

    /// All priorities, lowest rank first.
    pub const ALL: [Priority; Self::COUNT] = [Priority::Bulk, Priority::Normal, Priority::Expedited];

    /// The index of this priority in capacity arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            Priority::Bulk => 0,
            Priority::Normal => 1,
            Priority::Expedited => 2,
        }
    }

    /// The weight of this priority in preemption scoring.
    pub(crate) fn weight(self) -> u64 {
        match self {
            Priority::Bulk => 1,
            Priority::Normal => 2,
            Priority::Expedited => 4,
        }
    }
}

/// The routing table: neighbor nodes, their served endpoints and their
/// scheduled contacts, plus a time-ordered index over all contacts.
pub struct RoutingTable {
    nodes: std::collections::HashMap<Eid, Node>,
    contacts: std::collections::HashMap<ContactId, Contact>,
    /// Time-ordered index over every contact in the table.
    by_start: std::collections::BTreeSet<(time::OffsetDateTime, ContactId)>,
    next_contact_id: u64,
    /// Soft cap on the total bytes scheduled across all future contacts.
    backlog_limit: u64,
    backlog: u64,
}

impl RoutingTable {
    /// Creates an empty table with a backlog cap of `global_mbs` megabytes.
    pub fn new(global_mbs: u64) -> Self {
        Self {
            nodes: std::collections::HashMap::new(),
            contacts: std::collections::HashMap::new(),
            by_start: std::collections::BTreeSet::new(),
            next_contact_id: 1,
            backlog_limit: global_mbs.saturating_mul(1_000_000),
            backlog: 0,
        }
    }

    /// Adds or replaces a neighbor node record.
    ///
    /// Contacts already scheduled for the node are retained.
    pub fn add_node(&mut self, eid: Eid, endpoints: Vec<String>) {
        let node_id = eid.node_id();
        self.nodes
            .entry(node_id.clone())
            .or_insert_with(|| Node::new(node_id))
            .endpoints = endpoints;
    }

    /// Removes a node and all of its contacts.
    ///
    /// Returns the bundle ids that were scheduled on the removed contacts
    /// so the processor can re-route them.
    pub fn remove_node(&mut self, eid: &Eid) -> Vec<u64> {
        let Some(node) = self.nodes.remove(&eid.node_id()) else {
            return Vec::new();
        };
        let mut orphans = Vec::new();
        for contact_id in node.contacts {
            if let Some(contact) = self.contacts.remove(&contact_id) {
                self.by_start.remove(&(contact.from, contact_id));
                self.backlog = self.backlog.saturating_sub(contact.scheduled_bytes());
                orphans.extend(contact.scheduled.iter().map(|s| s.bundle_id));
            }
        }
        orphans
    }

    /// Adds a scheduled contact, creating the neighbor node if unknown.
    ///
    /// Returns the contact id, in `O(log n)`.
    pub fn add_contact(
        &mut self,
        node_eid: Eid,
        cla_name: String,
        cla_address: String,
        from: time::OffsetDateTime,
        to: time::OffsetDateTime,
        bitrate: u64,
    ) -> ContactId {
        let node_id = node_eid.node_id();
        let node = self
            .nodes
            .entry(node_id.clone())
            .or_insert_with(|| Node::new(node_id.clone()));

        let id = ContactId(self.next_contact_id);
        self.next_contact_id += 1;

        let contact = Contact::new(id, node_id, cla_name, cla_address, from, to, bitrate);

        let at = node
            .contacts
            .binary_search_by_key(&from, |c| {
                self.contacts
                    .get(c)
                    .map(|c| c.from)
                    .unwrap_or(time::OffsetDateTime::UNIX_EPOCH)
            })
            .unwrap_or_else(|at| at);
        node.contacts.insert(at, id);

        self.by_start.insert((from, id));
        self.contacts.insert(id, contact);
        id
    }

    /// Removes a contact, returning the bundle ids scheduled on it.
    pub fn remove_contact(&mut self, id: ContactId) -> Vec<u64> {
        let Some(contact) = self.contacts.remove(&id) else {
            return Vec::new();
        };
        self.by_start.remove(&(contact.from, id));
        self.backlog = self.backlog.saturating_sub(contact.scheduled_bytes());
        if let Some(node) = self.nodes.get_mut(&contact.node) {
            node.contacts.retain(|c| *c != id);
        }
        contact.scheduled.iter().map(|s| s.bundle_id).collect()
    }

    /// Finds the contact with a neighbor covering the given start time.
    pub fn find_contact(&self, node_eid: &Eid, from: time::OffsetDateTime) -> Option<ContactId> {
        let node = self.nodes.get(&node_eid.node_id())?;
        node.contacts
            .iter()
            .find(|id| {
                self.contacts
                    .get(id)
                    .map(|c| c.from == from)
                    .unwrap_or(false)
            })
            .copied()
    }

    /// Clears every node and contact, returning all scheduled bundle ids.
    pub fn reset(&mut self) -> Vec<u64> {
        let orphans = self
            .contacts
            .values()
            .flat_map(|c| c.scheduled.iter().map(|s| s.bundle_id))
            .collect();
        self.nodes.clear();
        self.contacts.clear();
        self.by_start.clear();
        self.backlog = 0;
        orphans
    }

    /// Looks up the contacts that can carry traffic towards `destination`:
    /// contacts with any node whose EID matches the destination's node id,
    /// or that declares an endpoint prefix covering the destination.
    pub fn lookup_destination(&self, destination: &Eid) -> Vec<ContactId> {
        let dest_node = destination.node_id();
        let dest_text = destination.to_string();
        let mut found = Vec::new();
        for node in self.nodes.values() {
            if node.eid == dest_node || node.serves(&dest_text) {
                found.extend(node.contacts.iter().copied());
            }
        }
        found
    }

    /// Accesses a contact by id.
    pub fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.get(&id)
    }

    /// Iterates over every contact in start-time order.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.by_start
            .iter()
            .filter_map(|(_, id)| self.contacts.get(id))
    }

    /// Accesses a contact by id, mutably.
    pub fn contact_mut(&mut self, id: ContactId) -> Option<&mut Contact> {
        self.contacts.get_mut(&id)
    }

    /// Reserves `size` bytes at `priority` on a contact for a bundle.
    ///
    /// Fails if the contact lacks capacity or the global backlog cap would
    /// be exceeded.
    pub fn schedule(
        &mut self,
        id: ContactId,
        bundle_id: u64,
        size: u64,
        priority: Priority,
    ) -> Result<(), ScheduleError> {
        if self.backlog.saturating_add(size) > self.backlog_limit {
            return Err(ScheduleError::BacklogExceeded);
        }
        let contact = self.contacts.get_mut(&id).ok_or(ScheduleError::NoContact)?;
        contact.schedule(bundle_id, size, priority)?;
        self.backlog += size;
        Ok(())
    }

    /// Releases a reservation, re-crediting the contact's capacity.
    ///
    /// Used when a transmission fails or a bundle is cancelled.
    pub fn unschedule(&mut self, id: ContactId, bundle_id: u64) {
        if let Some(contact) = self.contacts.get_mut(&id) {
            let released = contact.unschedule(bundle_id);
            self.backlog = self.backlog.saturating_sub(released);
        }
    }

    /// Marks a scheduled bundle as transmitted, consuming its reservation
    /// without re-crediting the contact.
    pub fn mark_transmitted(&mut self, id: ContactId, bundle_id: u64) {
        if let Some(contact) = self.contacts.get_mut(&id) {
            let released = contact.remove_scheduled(bundle_id);
            self.backlog = self.backlog.saturating_sub(released);
        }
    }

    /// The next contact boundary (start or end) after `after`, if any.
    pub fn next_boundary(&self, after: time::OffsetDateTime) -> Option<time::OffsetDateTime> {
        self.contacts
            .values()
            .flat_map(|c| [c.from, c.to])
            .filter(|t| *t > after)
            .min()
    }

    /// The contacts whose window covers `now`.
    pub fn active_contacts(&self, now: time::OffsetDateTime) -> Vec<ContactId> {
        self.contacts
            .values()
            .filter(|c| c.from <= now && now < c.to)
            .map(|c| c.id)
            .collect()
    }

    /// The total bytes currently scheduled across all contacts.
    pub fn backlog(&self) -> u64 {
        self.backlog
    }
}

/// Errors from capacity reservation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// The contact no longer exists.
    #[error("No such contact")]
    NoContact,

    /// The contact lacks remaining capacity at the bundle's priority.
    #[error("Contact capacity exhausted")]
    CapacityExhausted,

    /// The global scheduled-bytes cap would be exceeded.
    #[error("Global backlog cap exceeded")]
    BacklogExceeded,
}
