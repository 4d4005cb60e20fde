use super::*;

/// A stable identifier for a contact within the routing table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactId(pub(super) u64);

/// A reservation of contact capacity for one bundle (or fragment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledBundle {
    pub bundle_id: u64,
    pub size: u64,
    pub priority: Priority,
}

/// A scheduled unidirectional communication opportunity with a neighbor.
///
/// The nominal capacity is `bitrate × (to − from)`.  Remaining capacity is
/// tracked per priority class: reserving at priority `p` consumes the
/// capacity visible to `p` and every class below it, so higher-priority
/// bundles may reserve what lower-priority ones may not.
#[derive(Debug, Clone)]
pub struct Contact {
    /// The table-assigned contact id.
    pub id: ContactId,
    /// The neighbor node reached during this contact.
    pub node: Eid,
    /// The convergence layer carrying the contact.
    pub cla_name: String,
    /// The CLA-specific address of the neighbor.
    pub cla_address: String,
    /// When the contact window opens.
    pub from: time::OffsetDateTime,
    /// When the contact window closes.
    pub to: time::OffsetDateTime,
    /// The link data rate in bytes per second.
    pub bitrate: u64,
    /// The bundles scheduled on this contact, in scheduling order.
    pub scheduled: Vec<ScheduledBundle>,
    remaining: [u64; Priority::COUNT],
}

impl Contact {
    pub(super) fn new(
        id: ContactId,
        node: Eid,
        cla_name: String,
        cla_address: String,
        from: time::OffsetDateTime,
        to: time::OffsetDateTime,
        bitrate: u64,
    ) -> Self {
        let nominal = Self::nominal_capacity(from, to, bitrate);
        Self {
            id,
            node,
            cla_name,
            cla_address,
            from,
            to,
            bitrate,
            scheduled: Vec::new(),
            remaining: [nominal; Priority::COUNT],
        }
    }

    fn nominal_capacity(from: time::OffsetDateTime, to: time::OffsetDateTime, bitrate: u64) -> u64 {
        let duration = (to - from).whole_seconds().max(0) as u64;
        bitrate.saturating_mul(duration)
    }

    /// The nominal capacity of the contact in bytes.
    pub fn nominal(&self) -> u64 {
        Self::nominal_capacity(self.from, self.to, self.bitrate)
    }

    /// The remaining capacity visible to bundles of `priority`.
    pub fn remaining(&self, priority: Priority) -> u64 {
        self.remaining[priority.index()]
    }

    /// The total bytes currently reserved on this contact.
    pub fn scheduled_bytes(&self) -> u64 {
        self.scheduled.iter().map(|s| s.size).sum()
    }

    /// The physically unreserved bytes, regardless of priority class.
    pub fn physical_free(&self) -> u64 {
        self.nominal().saturating_sub(self.scheduled_bytes())
    }

    pub(super) fn schedule(
        &mut self,
        bundle_id: u64,
        size: u64,
        priority: Priority,
    ) -> Result<(), ScheduleError> {
        if self.remaining(priority) < size {
            return Err(ScheduleError::CapacityExhausted);
        }
        for p in 0..=priority.index() {
            self.remaining[p] = self.remaining[p].saturating_sub(size);
        }
        self.scheduled.push(ScheduledBundle {
            bundle_id,
            size,
            priority,
        });
        Ok(())
    }

    /// Releases a reservation and re-credits capacity.  Returns the
    /// released size, zero if the bundle was not scheduled here.
    pub(super) fn unschedule(&mut self, bundle_id: u64) -> u64 {
        let Some(at) = self.scheduled.iter().position(|s| s.bundle_id == bundle_id) else {
            return 0;
        };
        let entry = self.scheduled.remove(at);
        let nominal = self.nominal();
        for p in 0..=entry.priority.index() {
            self.remaining[p] = (self.remaining[p] + entry.size).min(nominal);
        }
        entry.size
    }

    /// Consumes a reservation without re-crediting capacity, once the
    /// bytes have actually been transmitted.
    pub(super) fn remove_scheduled(&mut self, bundle_id: u64) -> u64 {
        let Some(at) = self.scheduled.iter().position(|s| s.bundle_id == bundle_id) else {
            return 0;
        };
        self.scheduled.remove(at).size
    }

    /// The bytes that bundles below `priority` have reserved, which a
    /// higher-priority bundle could reclaim by preemption.
    pub fn preemptible_bytes(&self, priority: Priority) -> u64 {
        self.scheduled
            .iter()
            .filter(|s| s.priority < priority)
            .map(|s| s.size)
            .sum()
    }
}
