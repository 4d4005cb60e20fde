/*!
RFC 5050 administrative records: bundle status reports and custody signals.

An administrative record is the payload of a bundle flagged as carrying
one.  The first byte holds the record type in its high nibble and the
record flags in its low nibble; the only flag is "record is for a
fragment", which adds fragment offset and length fields.
*/

use super::*;
use tern_bpv7::eid::Eid;

const RECORD_TYPE_STATUS_REPORT: u8 = 1;
const RECORD_TYPE_CUSTODY_SIGNAL: u8 = 2;
const RECORD_FLAG_FOR_FRAGMENT: u8 = 1;

/// Identifies the bundle an administrative record refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRef {
    pub source: Eid,
    pub creation_timestamp: u64,
    pub sequence_number: u64,
    /// Fragment offset and length, if the record is about a fragment.
    pub fragment: Option<(u64, u64)>,
}

/// Status flags asserted by a v6 status report.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags {
    pub received: bool,
    pub custody_accepted: bool,
    pub forwarded: bool,
    pub delivered: bool,
    pub deleted: bool,
}

impl From<StatusFlags> for u8 {
    fn from(value: StatusFlags) -> Self {
        let mut flags = 0;
        if value.received {
            flags |= 1 << 0;
        }
        if value.custody_accepted {
            flags |= 1 << 1;
        }
        if value.forwarded {
            flags |= 1 << 2;
        }
        if value.delivered {
            flags |= 1 << 3;
        }
        if value.deleted {
            flags |= 1 << 4;
        }
        flags
    }
}

impl From<u8> for StatusFlags {
    fn from(value: u8) -> Self {
        Self {
            received: value & (1 << 0) != 0,
            custody_accepted: value & (1 << 1) != 0,
            forwarded: value & (1 << 2) != 0,
            delivered: value & (1 << 3) != 0,
            deleted: value & (1 << 4) != 0,
        }
    }
}

/// A v6 bundle status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub flags: StatusFlags,
    /// Reason code (RFC 5050 §6.1.1).
    pub reason: u8,
    /// The time of the reported event, in seconds since the DTN epoch.
    pub time: u64,
    pub bundle: BundleRef,
}

/// A v6 custody signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustodySignal {
    /// Whether custody transfer succeeded.
    pub succeeded: bool,
    /// Reason code (RFC 5050 §6.3).
    pub reason: u8,
    /// The time of the signal, in seconds since the DTN epoch.
    pub time: u64,
    pub bundle: BundleRef,
}

/// A parsed administrative record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminRecord {
    StatusReport(StatusReport),
    CustodySignal(CustodySignal),
}

fn emit_bundle_ref(bundle: &BundleRef, out: &mut Vec<u8>) {
    if let Some((offset, len)) = bundle.fragment {
        sdnv::encode(offset, out);
        sdnv::encode(len, out);
    }
    sdnv::encode(bundle.creation_timestamp, out);
    sdnv::encode(bundle.sequence_number, out);
    let eid = bundle.source.to_string();
    sdnv::encode(eid.len() as u64, out);
    out.extend_from_slice(eid.as_bytes());
}

impl StatusReport {
    /// Serializes the record as an administrative record payload.
    pub fn emit(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(
            (RECORD_TYPE_STATUS_REPORT << 4)
                | if self.bundle.fragment.is_some() {
                    RECORD_FLAG_FOR_FRAGMENT
                } else {
                    0
                },
        );
        out.push(self.flags.into());
        out.push(self.reason);
        if let Some((offset, len)) = self.bundle.fragment {
            sdnv::encode(offset, &mut out);
            sdnv::encode(len, &mut out);
        }
        // One event time per asserted status
        let count = [
            self.flags.received,
            self.flags.custody_accepted,
            self.flags.forwarded,
            self.flags.delivered,
            self.flags.deleted,
        ]
        .iter()
        .filter(|f| **f)
        .count();
        for _ in 0..count {
            sdnv::encode(self.time, &mut out);
        }
        emit_bundle_ref(
            &BundleRef {
                fragment: None,
                ..self.bundle.clone()
            },
            &mut out,
        );
        out
    }
}

impl CustodySignal {
    /// Serializes the record as an administrative record payload.
    pub fn emit(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(
            (RECORD_TYPE_CUSTODY_SIGNAL << 4)
                | if self.bundle.fragment.is_some() {
                    RECORD_FLAG_FOR_FRAGMENT
                } else {
                    0
                },
        );
        out.push(if self.succeeded { 0x80 } else { 0 } | (self.reason & 0x7F));
        if let Some((offset, len)) = self.bundle.fragment {
            sdnv::encode(offset, &mut out);
            sdnv::encode(len, &mut out);
        }
        sdnv::encode(self.time, &mut out);
        emit_bundle_ref(
            &BundleRef {
                fragment: None,
                ..self.bundle.clone()
            },
            &mut out,
        );
        out
    }
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn read_u8(&mut self) -> Result<u8, Error> {
        let b = *self.data.get(self.offset).ok_or(Error::NeedMoreData(1))?;
        self.offset += 1;
        Ok(b)
    }

    fn read_sdnv(&mut self) -> Result<u64, Error> {
        let (v, len) = sdnv::decode(&self.data[self.offset..])?;
        self.offset += len;
        Ok(v)
    }

    fn read_eid(&mut self) -> Result<Eid, Error> {
        let len = self.read_sdnv()? as usize;
        let Some(bytes) = self
            .offset
            .checked_add(len)
            .and_then(|end| self.data.get(self.offset..end))
        else {
            return Err(Error::NeedMoreData(len));
        };
        self.offset += len;
        core::str::from_utf8(bytes)
            .map_err(|e| Error::InvalidField {
                field: "administrative record EID",
                source: e.into(),
            })?
            .parse()
            .map_err(Error::InvalidEid)
    }
}

/// Parses an administrative record payload.
pub fn parse(data: &[u8]) -> Result<AdminRecord, Error> {
    let mut reader = Reader { data, offset: 0 };
    let header = reader.read_u8()?;
    let for_fragment = header & RECORD_FLAG_FOR_FRAGMENT != 0;

    match header >> 4 {
        RECORD_TYPE_STATUS_REPORT => {
            let flags = StatusFlags::from(reader.read_u8()?);
            let reason = reader.read_u8()?;
            let fragment = if for_fragment {
                Some((reader.read_sdnv()?, reader.read_sdnv()?))
            } else {
                None
            };
            let count = [
                flags.received,
                flags.custody_accepted,
                flags.forwarded,
                flags.delivered,
                flags.deleted,
            ]
            .iter()
            .filter(|f| **f)
            .count();
            let mut time = 0;
            for _ in 0..count {
                time = reader.read_sdnv()?;
            }
            let creation_timestamp = reader.read_sdnv()?;
            let sequence_number = reader.read_sdnv()?;
            let source = reader.read_eid()?;
            Ok(AdminRecord::StatusReport(StatusReport {
                flags,
                reason,
                time,
                bundle: BundleRef {
                    source,
                    creation_timestamp,
                    sequence_number,
                    fragment,
                },
            }))
        }
        RECORD_TYPE_CUSTODY_SIGNAL => {
            let status = reader.read_u8()?;
            let fragment = if for_fragment {
                Some((reader.read_sdnv()?, reader.read_sdnv()?))
            } else {
                None
            };
            let time = reader.read_sdnv()?;
            let creation_timestamp = reader.read_sdnv()?;
            let sequence_number = reader.read_sdnv()?;
            let source = reader.read_eid()?;
            Ok(AdminRecord::CustodySignal(CustodySignal {
                succeeded: status & 0x80 != 0,
                reason: status & 0x7F,
                time,
                bundle: BundleRef {
                    source,
                    creation_timestamp,
                    sequence_number,
                    fragment,
                },
            }))
        }
        t => Err(Error::InvalidField {
            field: "administrative record type",
            source: format!("unknown record type {t}").into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle_ref() -> BundleRef {
        BundleRef {
            source: "dtn:GS4/source".parse().unwrap(),
            creation_timestamp: 658489863,
            sequence_number: 9,
            fragment: None,
        }
    }

    #[test]
    fn status_report_round_trip() {
        let report = StatusReport {
            flags: StatusFlags {
                delivered: true,
                ..Default::default()
            },
            reason: 0,
            time: 658489900,
            bundle: bundle_ref(),
        };
        assert_eq!(
            parse(&report.emit()).unwrap(),
            AdminRecord::StatusReport(report)
        );
    }

    #[test]
    fn custody_signal_round_trip() {
        let signal = CustodySignal {
            succeeded: true,
            reason: 0,
            time: 658489900,
            bundle: bundle_ref(),
        };
        assert_eq!(
            parse(&signal.emit()).unwrap(),
            AdminRecord::CustodySignal(signal)
        );
    }

    #[test]
    fn fragment_fields_round_trip() {
        let signal = CustodySignal {
            succeeded: false,
            reason: 0x03,
            time: 1,
            bundle: BundleRef {
                fragment: Some((100, 400)),
                ..bundle_ref()
            },
        };
        assert_eq!(
            parse(&signal.emit()).unwrap(),
            AdminRecord::CustodySignal(signal)
        );
    }

    #[test]
    fn unknown_record_type_rejected() {
        assert!(parse(&[0x70, 0x00]).is_err());
    }
}
