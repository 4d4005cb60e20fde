/*!
The BPv7 Creation Timestamp: a `[time, sequence]` pair that, together with
the source EID, uniquely identifies a bundle across the DTN.
*/

use super::*;
use error::CaptureFieldErr;
use tern_cbor as cbor;

static GLOBAL_COUNTER: core::sync::atomic::AtomicU64 = core::sync::atomic::AtomicU64::new(1);

/// A bundle creation timestamp.
///
/// The `time` is a DTN Time in milliseconds; a node without an accurate
/// clock encodes zero, represented here as `None`.  The sequence number
/// disambiguates bundles created within the same millisecond.
#[derive(Default, Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CreationTimestamp {
    creation_time: Option<dtn_time::DtnTime>,
    sequence_number: u64,
}

impl CreationTimestamp {
    /// Creates a new `CreationTimestamp` based on the current system time.
    pub fn now() -> Self {
        Self {
            creation_time: Some(dtn_time::DtnTime::now()),
            sequence_number: GLOBAL_COUNTER
                .fetch_add(1, core::sync::atomic::Ordering::Relaxed),
        }
    }

    /// Creates a new `CreationTimestamp` without a time value, for nodes
    /// without an accurate clock.
    pub fn new_sequential() -> Self {
        Self {
            creation_time: None,
            sequence_number: GLOBAL_COUNTER
                .fetch_add(1, core::sync::atomic::Ordering::Relaxed),
        }
    }

    /// Assembles a `CreationTimestamp` from its parts.
    pub fn from_parts(creation_time: Option<dtn_time::DtnTime>, sequence_number: u64) -> Self {
        Self {
            creation_time,
            sequence_number,
        }
    }

    /// The creation time, if the source had a clock.
    pub fn creation_time(&self) -> Option<&dtn_time::DtnTime> {
        self.creation_time.as_ref()
    }

    /// The sequence number.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }
}

impl core::fmt::Display for CreationTimestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(ct) = self.creation_time {
            write!(f, "{} seq {}", ct, self.sequence_number)
        } else {
            write!(f, "(No clock) {}", self.sequence_number)
        }
    }
}

impl cbor::encode::ToCbor for CreationTimestamp {
    type Result = ();

    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) -> Self::Result {
        encoder.emit(&(
            self.creation_time.unwrap_or_default().millisecs(),
            self.sequence_number,
        ))
    }
}

impl cbor::decode::FromCbor for CreationTimestamp {
    type Error = Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        cbor::decode::parse_array(data, |a, _| {
            let timestamp = a.parse::<u64>().map_field_err("bundle creation time")?;
            let sequence_number = a.parse().map_field_err("sequence number")?;
            Ok::<_, Error>(CreationTimestamp {
                creation_time: (timestamp != 0).then(|| dtn_time::DtnTime::new(timestamp)),
                sequence_number,
            })
        })
        .map(|(v, len)| (v, len))
    }
}
