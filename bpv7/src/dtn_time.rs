/*!
DTN time: the number of non-leap milliseconds since the DTN epoch,
2000-01-01 00:00:00 UTC.
*/

use super::*;
use tern_cbor as cbor;

/// The DTN epoch, 2000-01-01 00:00:00 UTC.
const DTN_EPOCH: time::OffsetDateTime = time::macros::datetime!(2000-01-01 00:00:00 UTC);

/// The offset in milliseconds between the Unix epoch and the DTN epoch.
const DTN_EPOCH_OFFSET_MS: i128 = 946_684_800_000;

/// A point in time expressed as milliseconds since the DTN epoch.
///
/// The value zero is reserved to mean "no clock" and is not representable
/// as a `DtnTime`; see [`creation_timestamp::CreationTimestamp`].
#[derive(Debug, Copy, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct DtnTime(u64);

impl DtnTime {
    /// Wraps a raw millisecond count.
    pub fn new(millisecs: u64) -> Self {
        Self(millisecs)
    }

    /// Returns the current time as a `DtnTime`.
    pub fn now() -> Self {
        let millisecs = (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000)
            - DTN_EPOCH_OFFSET_MS;
        Self(millisecs.clamp(0, u64::MAX as i128) as u64)
    }

    /// The raw millisecond count since the DTN epoch.
    pub fn millisecs(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for DtnTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let t: time::OffsetDateTime = (*self).into();
        match t.format(&time::format_description::well_known::Rfc3339) {
            Ok(s) => f.write_str(&s),
            // RFC 3339 cannot express years past 9999; show the raw count
            Err(_) => write!(f, "{} ms after DTN epoch", self.0),
        }
    }
}

impl From<DtnTime> for time::OffsetDateTime {
    fn from(value: DtnTime) -> Self {
        // The wire value is an unbounded u64; clamp rather than fail, an
        // extreme timestamp must never take down parsing
        let millisecs = value.0.min(i64::MAX as u64) as i64;
        DTN_EPOCH.saturating_add(time::Duration::milliseconds(millisecs))
    }
}

impl TryFrom<time::OffsetDateTime> for DtnTime {
    type Error = core::num::TryFromIntError;

    fn try_from(value: time::OffsetDateTime) -> Result<Self, Self::Error> {
        u64::try_from((value.unix_timestamp_nanos() / 1_000_000) - DTN_EPOCH_OFFSET_MS)
            .map(Self)
    }
}

impl cbor::encode::ToCbor for DtnTime {
    type Result = ();

    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) -> Self::Result {
        encoder.emit(&self.0)
    }
}

impl cbor::decode::FromCbor for DtnTime {
    type Error = cbor::decode::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        u64::from_cbor(data).map(|(v, len)| (Self(v), len))
    }
}
