/*!
The core `Bundle` structure: the in-memory representation of a BPv7 bundle,
its processing flags, and its unique identifier.
*/

use super::*;
use tern_cbor as cbor;

/// Holds fragmentation information for a bundle (RFC 9171 §4.3.1).
///
/// Present in the primary block if the bundle is a fragment of a larger
/// original bundle.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FragmentInfo {
    /// The offset of this fragment's payload within the original ADU.
    pub offset: u64,
    /// The total length of the original application data unit.
    pub total_adu_length: u64,
}

/// The unique identifier of a bundle.
///
/// The tuple `(source EID, creation timestamp, fragment info)` is unique
/// across the DTN.
#[derive(Default, Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Id {
    /// The EID of the node that created the bundle.
    pub source: eid::Eid,
    /// The creation timestamp, including a sequence number for uniqueness.
    pub timestamp: creation_timestamp::CreationTimestamp,
    /// Fragmentation information, if this bundle is a fragment.
    pub fragment_info: Option<FragmentInfo>,
}

impl core::fmt::Display for Id {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(fi) = &self.fragment_info {
            write!(
                f,
                "{}/{} fragment {}/{}",
                self.source, self.timestamp, fi.offset, fi.total_adu_length
            )
        } else {
            write!(f, "{}/{}", self.source, self.timestamp)
        }
    }
}

/// The processing control flags of a bundle (RFC 9171 §4.2.3).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    /// This bundle is a fragment of a larger bundle.
    pub is_fragment: bool,
    /// The payload is an administrative record.
    pub is_admin_record: bool,
    /// The bundle must not be fragmented.
    pub do_not_fragment: bool,
    /// The destination application is asked to acknowledge the bundle.
    pub app_ack_requested: bool,
    /// Status reports should include the time of the reported event.
    pub report_status_time: bool,
    /// A status report is requested on bundle reception.
    pub receipt_report_requested: bool,
    /// A status report is requested on bundle forwarding.
    pub forward_report_requested: bool,
    /// A status report is requested on bundle delivery.
    pub delivery_report_requested: bool,
    /// A status report is requested on bundle deletion.
    pub delete_report_requested: bool,
    /// A bitmask of any unrecognized flags encountered during parsing.
    pub unrecognised: Option<u64>,
}

impl From<u64> for Flags {
    fn from(value: u64) -> Self {
        let mut flags = Self {
            is_fragment: value & (1 << 0) != 0,
            is_admin_record: value & (1 << 1) != 0,
            do_not_fragment: value & (1 << 2) != 0,
            app_ack_requested: value & (1 << 5) != 0,
            report_status_time: value & (1 << 6) != 0,
            receipt_report_requested: value & (1 << 14) != 0,
            forward_report_requested: value & (1 << 16) != 0,
            delivery_report_requested: value & (1 << 17) != 0,
            delete_report_requested: value & (1 << 18) != 0,
            unrecognised: None,
        };
        let unrecognised = value
            & !((1 << 0)
                | (1 << 1)
                | (1 << 2)
                | (1 << 5)
                | (1 << 6)
                | (1 << 14)
                | (1 << 16)
                | (1 << 17)
                | (1 << 18));
        if unrecognised != 0 {
            flags.unrecognised = Some(unrecognised);
        }
        flags
    }
}

impl From<&Flags> for u64 {
    fn from(value: &Flags) -> Self {
        let mut flags = value.unrecognised.unwrap_or(0);
        if value.is_fragment {
            flags |= 1 << 0;
        }
        if value.is_admin_record {
            flags |= 1 << 1;
        }
        if value.do_not_fragment {
            flags |= 1 << 2;
        }
        if value.app_ack_requested {
            flags |= 1 << 5;
        }
        if value.report_status_time {
            flags |= 1 << 6;
        }
        if value.receipt_report_requested {
            flags |= 1 << 14;
        }
        if value.forward_report_requested {
            flags |= 1 << 16;
        }
        if value.delivery_report_requested {
            flags |= 1 << 17;
        }
        if value.delete_report_requested {
            flags |= 1 << 18;
        }
        flags
    }
}

impl cbor::encode::ToCbor for Flags {
    type Result = ();

    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) -> Self::Result {
        encoder.emit(&u64::from(self))
    }
}

impl cbor::decode::FromCbor for Flags {
    type Error = cbor::decode::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        u64::from_cbor(data).map(|(value, len)| (value.into(), len))
    }
}

/// A complete BPv7 bundle.
///
/// The canonical blocks are kept in wire order; the payload block is always
/// last.  Typed accessors interpret the recognized extension blocks on
/// demand, so the block list remains the single source of truth.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// The unique identifier for the bundle.
    pub id: Id,
    /// The bundle processing control flags.
    pub flags: Flags,
    /// The type of CRC protecting the primary block.
    pub crc_type: crc::CrcType,
    /// The EID of the bundle's final destination.
    pub destination: eid::Eid,
    /// The EID to which status reports should be sent.
    pub report_to: eid::Eid,
    /// The time duration after which the bundle expires, from creation.
    pub lifetime: core::time::Duration,
    /// The canonical blocks, in wire order.
    pub blocks: Vec<block::Block>,
}

impl Bundle {
    /// Returns the payload block's data.
    pub fn payload(&self) -> Option<&[u8]> {
        self.find_block(block::Type::Payload).map(|b| b.data.as_ref())
    }

    /// Returns the first block of the given type, if any.
    pub fn find_block(&self, block_type: block::Type) -> Option<&block::Block> {
        self.blocks.iter().find(|b| b.block_type == block_type)
    }

    fn find_block_mut(&mut self, block_type: block::Type) -> Option<&mut block::Block> {
        self.blocks.iter_mut().find(|b| b.block_type == block_type)
    }

    /// The EID of the node that last forwarded the bundle, if recorded.
    pub fn previous_node(&self) -> Option<eid::Eid> {
        self.find_block(block::Type::PreviousNode)
            .and_then(|b| cbor::decode::parse(&b.data).ok())
    }

    /// The age of the bundle, if it carries a Bundle Age block.
    pub fn age(&self) -> Option<core::time::Duration> {
        self.find_block(block::Type::BundleAge)
            .and_then(|b| cbor::decode::parse::<u64>(&b.data).ok())
            .map(core::time::Duration::from_millis)
    }

    /// The hop limit and count, if the bundle carries a Hop Count block.
    pub fn hop_count(&self) -> Option<hop_info::HopInfo> {
        self.find_block(block::Type::HopCount)
            .and_then(|b| cbor::decode::parse(&b.data).ok())
    }

    /// Removes the Previous Node block, if present.
    ///
    /// RFC 9171 §5.4: the block must be removed before the bundle is
    /// forwarded; the next hop inserts its own.
    pub fn remove_previous_node(&mut self) {
        self.blocks
            .retain(|b| b.block_type != block::Type::PreviousNode);
    }

    /// Inserts or replaces the Previous Node block.
    pub fn set_previous_node(&mut self, node: &eid::Eid) {
        let data = cbor::encode::emit(node).into_boxed_slice();
        if let Some(b) = self.find_block_mut(block::Type::PreviousNode) {
            b.data = data;
        } else {
            self.insert_extension_block(block::Type::PreviousNode, data);
        }
    }

    /// Adds `dwell` to the Bundle Age block, if the bundle carries one.
    ///
    /// RFC 9171 §5.4: the age value must be increased by the time spent at
    /// this node, at the last possible moment before forwarding.
    pub fn update_age(&mut self, dwell: core::time::Duration) {
        if let Some(b) = self.find_block_mut(block::Type::BundleAge) {
            let age = cbor::decode::parse::<u64>(&b.data).unwrap_or(0);
            b.data = cbor::encode::emit(&age.saturating_add(dwell.as_millis() as u64))
                .into_boxed_slice();
        }
    }

    /// Increments the hop count, if the bundle carries a Hop Count block.
    pub fn increment_hop_count(&mut self) {
        if let Some(b) = self.find_block_mut(block::Type::HopCount)
            && let Ok(hop_info) = cbor::decode::parse::<hop_info::HopInfo>(&b.data)
        {
            b.data = cbor::encode::emit(&hop_info::HopInfo {
                limit: hop_info.limit,
                count: hop_info.count + 1,
            })
            .into_boxed_slice();
        }
    }

    /// Inserts an extension block before the payload block, assigning the
    /// lowest free block number.
    pub fn insert_extension_block(&mut self, block_type: block::Type, data: Box<[u8]>) -> u64 {
        let mut number = 2;
        while self.blocks.iter().any(|b| b.number == number) {
            number += 1;
        }
        let at = self
            .blocks
            .iter()
            .position(|b| b.block_type == block::Type::Payload)
            .unwrap_or(self.blocks.len());
        self.blocks
            .insert(at, block::Block::new(block_type, number, data));
        number
    }

    /// The absolute expiry time of the bundle.
    ///
    /// For bundles from sources without a clock, expiry is reckoned from the
    /// bundle age instead; callers supply the time of reception.  Lifetime
    /// and age are unbounded wire values, so the arithmetic saturates.
    pub fn expiry_time(&self, received_at: time::OffsetDateTime) -> time::OffsetDateTime {
        let lifetime = time::Duration::try_from(self.lifetime).unwrap_or(time::Duration::MAX);
        match self.id.timestamp.creation_time() {
            Some(t) => time::OffsetDateTime::from(*t).saturating_add(lifetime),
            None => {
                let age = time::Duration::try_from(self.age().unwrap_or_default())
                    .unwrap_or(time::Duration::MAX);
                received_at.saturating_sub(age).saturating_add(lifetime)
            }
        }
    }

    /// Returns `true` if the bundle has passed its expiry time.
    pub fn has_expired(&self, received_at: time::OffsetDateTime) -> bool {
        self.expiry_time(received_at) <= time::OffsetDateTime::now_utc()
    }
}
