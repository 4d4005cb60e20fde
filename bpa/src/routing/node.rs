use super::*;

/// A neighbor node record: its EID, the endpoint prefixes it declares it
/// can reach, and its future contacts in start-time order.
#[derive(Debug, Clone)]
pub struct Node {
    /// The neighbor's node EID.
    pub eid: Eid,
    /// EID prefixes served by this neighbor.
    pub endpoints: Vec<String>,
    /// Contacts with this neighbor, ordered by start time.
    pub contacts: Vec<ContactId>,
}

impl Node {
    pub(super) fn new(eid: Eid) -> Self {
        Self {
            eid,
            endpoints: Vec::new(),
            contacts: Vec::new(),
        }
    }

    /// Returns `true` if the node declares an endpoint prefix covering the
    /// destination.
    pub fn serves(&self, destination: &str) -> bool {
        self.endpoints
            .iter()
            .any(|prefix| destination.starts_with(prefix.as_str()))
    }
}
