/*!
The in-memory representation of an RFC 5050 bundle: processing flags with
class-of-service and status-report bits, four endpoint references, and
length-prefixed canonical blocks.
*/

use super::*;
use tern_bpv7::eid::Eid;

/// The class-of-service priority of a v6 bundle (RFC 5050 §4.2, bits 7-8).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Bulk,
    #[default]
    Normal,
    Expedited,
}

/// The processing control flags of a v6 bundle (RFC 5050 §4.2).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    /// This bundle is a fragment of a larger bundle.
    pub is_fragment: bool,
    /// The payload is an administrative record.
    pub is_admin_record: bool,
    /// The bundle must not be fragmented.
    pub do_not_fragment: bool,
    /// Custody transfer is requested.
    pub custody_requested: bool,
    /// The destination endpoint is a singleton.
    pub singleton_destination: bool,
    /// The destination application is asked to acknowledge the bundle.
    pub app_ack_requested: bool,
    /// The class-of-service priority.
    pub priority: Priority,
    /// A status report is requested on bundle reception.
    pub receipt_report_requested: bool,
    /// A status report is requested on custody acceptance.
    pub custody_report_requested: bool,
    /// A status report is requested on bundle forwarding.
    pub forward_report_requested: bool,
    /// A status report is requested on bundle delivery.
    pub delivery_report_requested: bool,
    /// A status report is requested on bundle deletion.
    pub delete_report_requested: bool,
    /// A bitmask of any unrecognized flags encountered during parsing.
    pub unrecognised: Option<u64>,
}

const KNOWN_FLAGS: u64 = (1 << 0)
    | (1 << 1)
    | (1 << 2)
    | (1 << 3)
    | (1 << 4)
    | (1 << 5)
    | (0b11 << 7)
    | (1 << 14)
    | (1 << 15)
    | (1 << 16)
    | (1 << 17)
    | (1 << 18);

impl From<u64> for Flags {
    fn from(value: u64) -> Self {
        let mut flags = Self {
            is_fragment: value & (1 << 0) != 0,
            is_admin_record: value & (1 << 1) != 0,
            do_not_fragment: value & (1 << 2) != 0,
            custody_requested: value & (1 << 3) != 0,
            singleton_destination: value & (1 << 4) != 0,
            app_ack_requested: value & (1 << 5) != 0,
            priority: match (value >> 7) & 0b11 {
                0 => Priority::Bulk,
                1 => Priority::Normal,
                _ => Priority::Expedited,
            },
            receipt_report_requested: value & (1 << 14) != 0,
            custody_report_requested: value & (1 << 15) != 0,
            forward_report_requested: value & (1 << 16) != 0,
            delivery_report_requested: value & (1 << 17) != 0,
            delete_report_requested: value & (1 << 18) != 0,
            unrecognised: None,
        };
        let unrecognised = value & !KNOWN_FLAGS;
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
        if value.custody_requested {
            flags |= 1 << 3;
        }
        if value.singleton_destination {
            flags |= 1 << 4;
        }
        if value.app_ack_requested {
            flags |= 1 << 5;
        }
        flags |= match value.priority {
            Priority::Bulk => 0,
            Priority::Normal => 1,
            Priority::Expedited => 2,
        } << 7;
        if value.receipt_report_requested {
            flags |= 1 << 14;
        }
        if value.custody_report_requested {
            flags |= 1 << 15;
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

/// The type of a v6 canonical block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// Payload block (type code 1).
    Payload,
    /// Previous-Hop Insertion Block (RFC 6259, type code 5).
    PreviousHop,
    /// Age Extension Block (type code 10).
    Age,
    /// An unrecognized block type.
    Unrecognised(u64),
}

impl From<BlockType> for u64 {
    fn from(value: BlockType) -> Self {
        match value {
            BlockType::Payload => 1,
            BlockType::PreviousHop => 5,
            BlockType::Age => 10,
            BlockType::Unrecognised(v) => v,
        }
    }
}

impl From<u64> for BlockType {
    fn from(value: u64) -> Self {
        match value {
            1 => BlockType::Payload,
            5 => BlockType::PreviousHop,
            10 => BlockType::Age,
            value => BlockType::Unrecognised(value),
        }
    }
}

/// The processing control flags of a v6 canonical block (RFC 5050 §4.3).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct BlockFlags {
    /// The block must be replicated in every fragment.
    pub must_replicate: bool,
    /// A status report should be generated if the block cannot be processed.
    pub report_on_failure: bool,
    /// The bundle should be deleted if the block cannot be processed.
    pub delete_bundle_on_failure: bool,
    /// This is the last block of the bundle.
    pub last_block: bool,
    /// The block should be discarded if it cannot be processed.
    pub discard_on_failure: bool,
    /// The block was forwarded without being processed.
    pub forwarded_unprocessed: bool,
    /// The block contains EID references.
    pub has_eid_references: bool,
    /// A bitmask of any unrecognized flags encountered during parsing.
    pub unrecognised: Option<u64>,
}

impl From<u64> for BlockFlags {
    fn from(value: u64) -> Self {
        let mut flags = Self {
            must_replicate: value & (1 << 0) != 0,
            report_on_failure: value & (1 << 1) != 0,
            delete_bundle_on_failure: value & (1 << 2) != 0,
            last_block: value & (1 << 3) != 0,
            discard_on_failure: value & (1 << 4) != 0,
            forwarded_unprocessed: value & (1 << 5) != 0,
            has_eid_references: value & (1 << 6) != 0,
            unrecognised: None,
        };
        let unrecognised = value & !0x7F;
        if unrecognised != 0 {
            flags.unrecognised = Some(unrecognised);
        }
        flags
    }
}

impl From<&BlockFlags> for u64 {
    fn from(value: &BlockFlags) -> Self {
        let mut flags = value.unrecognised.unwrap_or(0);
        if value.must_replicate {
            flags |= 1 << 0;
        }
        if value.report_on_failure {
            flags |= 1 << 1;
        }
        if value.delete_bundle_on_failure {
            flags |= 1 << 2;
        }
        if value.last_block {
            flags |= 1 << 3;
        }
        if value.discard_on_failure {
            flags |= 1 << 4;
        }
        if value.forwarded_unprocessed {
            flags |= 1 << 5;
        }
        if value.has_eid_references {
            flags |= 1 << 6;
        }
        flags
    }
}

/// A v6 canonical block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The type of the block.
    pub block_type: BlockType,
    /// The block processing control flags.
    pub flags: BlockFlags,
    /// EID references carried by the block, if any.
    pub eid_references: Vec<Eid>,
    /// The block-type-specific data bytes.
    pub data: Box<[u8]>,
}

impl Block {
    /// Constructs a new block with no flags and no EID references.
    pub fn new(block_type: BlockType, data: Box<[u8]>) -> Self {
        Self {
            block_type,
            flags: BlockFlags::default(),
            eid_references: Vec::new(),
            data,
        }
    }
}

/// A complete v6 bundle.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// The bundle processing control flags, including class of service.
    pub flags: Flags,
    /// The EID of the bundle's final destination.
    pub destination: Eid,
    /// The EID of the node that created the bundle.
    pub source: Eid,
    /// The EID to which status reports should be sent.
    pub report_to: Eid,
    /// The EID of the current custodian.
    pub custodian: Eid,
    /// The creation time in seconds since the DTN epoch.
    pub creation_timestamp: u64,
    /// The creation timestamp sequence number.
    pub sequence_number: u64,
    /// The time duration after which the bundle expires, from creation.
    pub lifetime: core::time::Duration,
    /// Fragmentation information, if this bundle is a fragment.
    pub fragment_info: Option<FragmentInfo>,
    /// The canonical blocks, in wire order.
    pub blocks: Vec<Block>,
}

/// Fragmentation information from the primary block.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FragmentInfo {
    /// The offset of this fragment's payload within the original ADU.
    pub offset: u64,
    /// The total length of the original application data unit.
    pub total_adu_length: u64,
}

impl Bundle {
    /// Returns the payload block's data.
    pub fn payload(&self) -> Option<&[u8]> {
        self.find_block(BlockType::Payload).map(|b| b.data.as_ref())
    }

    /// Returns the first block of the given type, if any.
    pub fn find_block(&self, block_type: BlockType) -> Option<&Block> {
        self.blocks.iter().find(|b| b.block_type == block_type)
    }

    fn find_block_mut(&mut self, block_type: BlockType) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.block_type == block_type)
    }

    /// The EID of the node that last forwarded the bundle, if recorded.
    pub fn previous_hop(&self) -> Option<Eid> {
        // The PHIB carries "scheme\0scheme:ssp\0"
        let block = self.find_block(BlockType::PreviousHop)?;
        let mut parts = block.data.split(|b| *b == 0);
        let _scheme = parts.next()?;
        core::str::from_utf8(parts.next()?).ok()?.parse().ok()
    }

    /// Removes the Previous-Hop Insertion Block, if present.
    pub fn remove_previous_hop(&mut self) {
        self.blocks
            .retain(|b| b.block_type != BlockType::PreviousHop);
    }

    /// Inserts or replaces the Previous-Hop Insertion Block.
    pub fn set_previous_hop(&mut self, node: &Eid) {
        let text = node.to_string();
        let scheme = text.split(':').next().unwrap_or_default();
        let mut data = Vec::with_capacity(scheme.len() + text.len() + 2);
        data.extend_from_slice(scheme.as_bytes());
        data.push(0);
        data.extend_from_slice(text.as_bytes());
        data.push(0);
        let data = data.into_boxed_slice();
        if let Some(b) = self.find_block_mut(BlockType::PreviousHop) {
            b.data = data;
        } else {
            self.insert_extension_block(Block::new(BlockType::PreviousHop, data));
        }
    }

    /// The age of the bundle in microseconds, if it carries an Age block.
    pub fn age(&self) -> Option<core::time::Duration> {
        let block = self.find_block(BlockType::Age)?;
        sdnv::decode(&block.data)
            .ok()
            .map(|(micros, _)| core::time::Duration::from_micros(micros))
    }

    /// Adds `dwell` to the Age block, if the bundle carries one.
    pub fn update_age(&mut self, dwell: core::time::Duration) {
        if let Some(b) = self.find_block_mut(BlockType::Age) {
            let age = sdnv::decode(&b.data).map(|(v, _)| v).unwrap_or(0);
            let mut data = Vec::new();
            sdnv::encode(age.saturating_add(dwell.as_micros() as u64), &mut data);
            b.data = data.into_boxed_slice();
        }
    }

    /// Inserts an extension block before the payload block, maintaining the
    /// last-block flag.
    pub fn insert_extension_block(&mut self, block: Block) {
        let at = self
            .blocks
            .iter()
            .position(|b| b.block_type == BlockType::Payload)
            .unwrap_or(self.blocks.len());
        self.blocks.insert(at, block);
        self.fix_last_block_flags();
    }

    /// Re-establishes the invariant that exactly the final block carries the
    /// last-block flag.
    pub fn fix_last_block_flags(&mut self) {
        let last = self.blocks.len().saturating_sub(1);
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.flags.last_block = i == last;
        }
    }

    /// The absolute expiry time of the bundle.
    ///
    /// Timestamp, lifetime and age are unbounded wire values, so the
    /// arithmetic saturates instead of failing.
    pub fn expiry_time(&self, received_at: time::OffsetDateTime) -> time::OffsetDateTime {
        const DTN_EPOCH_UNIX_SECS: i64 = 946_684_800;
        let lifetime = time::Duration::try_from(self.lifetime).unwrap_or(time::Duration::MAX);
        if self.creation_timestamp != 0 {
            i64::try_from(self.creation_timestamp)
                .ok()
                .and_then(|t| t.checked_add(DTN_EPOCH_UNIX_SECS))
                .and_then(|t| time::OffsetDateTime::from_unix_timestamp(t).ok())
                .unwrap_or(received_at)
                .saturating_add(lifetime)
        } else {
            let age = time::Duration::try_from(self.age().unwrap_or_default())
                .unwrap_or(time::Duration::MAX);
            received_at.saturating_sub(age).saturating_add(lifetime)
        }
    }

    /// Returns `true` if the bundle has passed its expiry time.
    pub fn has_expired(&self, received_at: time::OffsetDateTime) -> bool {
        self.expiry_time(received_at) <= time::OffsetDateTime::now_utc()
    }
}
