/*!
The version-agnostic bundle wrapper owned by the bundle processor.

A [`Bundle`] pairs the protocol-specific representation with the node-local
state the processor tracks: the internal 64-bit id assigned at ingest, the
reception timestamp used for age updates, and the retry counter.  The
wrapper is the unit of ownership: it moves between the processor's maps and
the transmit queues, never copied.
*/

use super::*;
use routing::Priority;
use tern_bpv7::eid::Eid;

static NEXT_BUNDLE_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

/// The protocol-specific representation of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    V6(tern_bpv6::Bundle),
    V7(tern_bpv7::Bundle),
}

/// The external identity of a bundle, used for duplicate detection:
/// `(source, creation timestamp, sequence number, fragment offset)`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ExternalId {
    pub source: Eid,
    pub creation_timestamp: u64,
    pub sequence_number: u64,
    pub fragment_offset: Option<u64>,
}

/// A bundle resident in the node.
#[derive(Debug)]
pub struct Bundle {
    /// The node-internal id, monotonic, assigned at ingest.
    pub id: u64,
    /// The protocol-specific bundle.
    pub data: Data,
    /// When the bundle was received by this node.
    pub received_at: time::OffsetDateTime,
    /// How many times forwarding has been retried.
    pub retries: u32,
}

impl Bundle {
    /// Wraps a parsed bundle, assigning the next internal id.
    pub fn new(data: Data) -> Self {
        Self {
            id: NEXT_BUNDLE_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            data,
            received_at: time::OffsetDateTime::now_utc(),
            retries: 0,
        }
    }

    /// The bundle protocol version.
    pub fn version(&self) -> u8 {
        match &self.data {
            Data::V6(_) => 6,
            Data::V7(_) => 7,
        }
    }

    /// The destination EID.
    pub fn destination(&self) -> &Eid {
        match &self.data {
            Data::V6(b) => &b.destination,
            Data::V7(b) => &b.destination,
        }
    }

    /// The source EID.
    pub fn source(&self) -> &Eid {
        match &self.data {
            Data::V6(b) => &b.source,
            Data::V7(b) => &b.id.source,
        }
    }

    /// The external identity used for duplicate detection.
    pub fn external_id(&self) -> ExternalId {
        match &self.data {
            Data::V6(b) => ExternalId {
                source: b.source.clone(),
                creation_timestamp: b.creation_timestamp,
                sequence_number: b.sequence_number,
                fragment_offset: b.fragment_info.as_ref().map(|fi| fi.offset),
            },
            Data::V7(b) => ExternalId {
                source: b.id.source.clone(),
                creation_timestamp: b
                    .id
                    .timestamp
                    .creation_time()
                    .map(|t| t.millisecs())
                    .unwrap_or(0),
                sequence_number: b.id.timestamp.sequence_number(),
                fragment_offset: b.id.fragment_info.as_ref().map(|fi| fi.offset),
            },
        }
    }

    /// The routing priority: the v6 class of service, normal for v7.
    pub fn priority(&self) -> Priority {
        match &self.data {
            Data::V6(b) => match b.flags.priority {
                tern_bpv6::bundle::Priority::Bulk => Priority::Bulk,
                tern_bpv6::bundle::Priority::Normal => Priority::Normal,
                tern_bpv6::bundle::Priority::Expedited => Priority::Expedited,
            },
            Data::V7(_) => Priority::Normal,
        }
    }

    /// Whether the bundle may be fragmented.
    pub fn may_fragment(&self) -> bool {
        match &self.data {
            Data::V6(b) => !b.flags.do_not_fragment,
            Data::V7(b) => !b.flags.do_not_fragment,
        }
    }

    /// Whether custody transfer was requested.
    pub fn custody_requested(&self) -> bool {
        match &self.data {
            Data::V6(b) => b.flags.custody_requested,
            Data::V7(_) => false,
        }
    }

    /// Whether the payload is an administrative record.
    pub fn is_admin_record(&self) -> bool {
        match &self.data {
            Data::V6(b) => b.flags.is_admin_record,
            Data::V7(b) => b.flags.is_admin_record,
        }
    }

    /// Whether a deletion status report was requested.
    pub fn delete_report_requested(&self) -> bool {
        match &self.data {
            Data::V6(b) => b.flags.delete_report_requested,
            Data::V7(b) => b.flags.delete_report_requested,
        }
    }

    /// The payload bytes.
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.data {
            Data::V6(b) => b.payload(),
            Data::V7(b) => b.payload(),
        }
    }

    /// The serialized size of the bundle in bytes.
    pub fn serialized_size(&self) -> usize {
        match &self.data {
            Data::V6(b) => tern_bpv6::serialize::serialized_size(b),
            Data::V7(b) => tern_bpv7::serialize::serialized_size(b),
        }
    }

    /// Serializes the bundle into a writer, one block at a time.
    pub fn serialize_into<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: std::io::Write + ?Sized,
    {
        match &self.data {
            Data::V6(b) => tern_bpv6::serialize::serialize_into(b, writer),
            Data::V7(b) => tern_bpv7::serialize::serialize_into(b, writer),
        }
    }

    /// Yields the encoded segments of the bundle, one block at a time, for
    /// streaming over a convergence layer link.
    pub fn serialize_segments(&self) -> Box<dyn Iterator<Item = Vec<u8>> + Send + '_> {
        match &self.data {
            Data::V6(b) => Box::new(tern_bpv6::serialize::serialize_segments(b)),
            Data::V7(b) => Box::new(tern_bpv7::serialize::serialize_segments(b)),
        }
    }

    /// The absolute expiry time of the bundle.
    pub fn expiry_time(&self) -> time::OffsetDateTime {
        match &self.data {
            Data::V6(b) => b.expiry_time(self.received_at),
            Data::V7(b) => b.expiry_time(self.received_at),
        }
    }

    /// Returns `true` if the bundle has passed its expiry time.
    pub fn has_expired(&self) -> bool {
        self.expiry_time() <= time::OffsetDateTime::now_utc()
    }

    /// Prepares the bundle for forwarding to the next hop.
    ///
    /// Removes the previous-node block and folds the dwell time at this
    /// node into the age block, at the last possible moment before the
    /// bytes leave.
    pub fn prepare_for_forwarding(&mut self) {
        let dwell = (time::OffsetDateTime::now_utc() - self.received_at)
            .try_into()
            .unwrap_or_default();
        match &mut self.data {
            Data::V6(b) => {
                b.remove_previous_hop();
                b.fix_last_block_flags();
                b.update_age(dwell);
            }
            Data::V7(b) => {
                b.remove_previous_node();
                b.update_age(dwell);
            }
        }
    }

    /// Splits the bundle into a first fragment within `first_max_bytes` and
    /// a remainder, wrapping both as new resident bundles.
    pub fn fragment(&self, first_max_bytes: usize) -> Result<(Bundle, Bundle), Error> {
        let (first, rest) = match &self.data {
            Data::V6(b) => {
                let (first, rest) = tern_bpv6::fragment::fragment(b, first_max_bytes)?;
                (Data::V6(first), Data::V6(rest))
            }
            Data::V7(b) => {
                let (first, rest) = tern_bpv7::fragment::fragment(b, first_max_bytes)?;
                (Data::V7(first), Data::V7(rest))
            }
        };
        Ok((Bundle::new(first), Bundle::new(rest)))
    }
}

/// Errors from bundle-level operations in the node core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A v6 codec error.
    #[error(transparent)]
    V6(#[from] tern_bpv6::Error),

    /// A v7 codec error.
    #[error(transparent)]
    V7(#[from] tern_bpv7::Error),
}

/// Parses a received byte sequence as a bundle of either protocol version.
///
/// The first byte discriminates: `0x9F` (the indefinite-length CBOR array
/// marker) begins a v7 bundle, `0x06` a v6 bundle.
pub fn parse_bundle_data(data: &[u8]) -> Result<Data, Error> {
    match data.first() {
        Some(0x06) => Ok(Data::V6(tern_bpv6::parse::parse_bundle(data)?)),
        _ => Ok(Data::V7(tern_bpv7::parse::parse_bundle(data)?)),
    }
}
