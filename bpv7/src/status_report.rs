/*!
Bundle status reports (RFC 9171 §6.1): administrative records describing the
reception, forwarding, delivery or deletion of a bundle, sent to the bundle's
report-to endpoint when the corresponding processing flag is set.
*/

use super::*;
use error::CaptureFieldErr;
use tern_cbor as cbor;

/// The administrative record type code for a bundle status report.
const STATUS_REPORT_RECORD_TYPE: u64 = 1;

/// Status report reason codes (RFC 9171 §6.1.1).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReasonCode {
    #[default]
    NoAdditionalInformation,
    LifetimeExpired,
    ForwardedOverUnidirectionalLink,
    TransmissionCanceled,
    DepletedStorage,
    DestinationEndpointIDUnavailable,
    NoKnownRouteToDestinationFromHere,
    NoTimelyContactWithNextNodeOnRoute,
    BlockUnintelligible,
    HopLimitExceeded,
    TrafficPared,
    BlockUnsupported,
    Unassigned(u64),
}

impl From<ReasonCode> for u64 {
    fn from(value: ReasonCode) -> Self {
        match value {
            ReasonCode::NoAdditionalInformation => 0,
            ReasonCode::LifetimeExpired => 1,
            ReasonCode::ForwardedOverUnidirectionalLink => 2,
            ReasonCode::TransmissionCanceled => 3,
            ReasonCode::DepletedStorage => 4,
            ReasonCode::DestinationEndpointIDUnavailable => 5,
            ReasonCode::NoKnownRouteToDestinationFromHere => 6,
            ReasonCode::NoTimelyContactWithNextNodeOnRoute => 7,
            ReasonCode::BlockUnintelligible => 8,
            ReasonCode::HopLimitExceeded => 9,
            ReasonCode::TrafficPared => 10,
            ReasonCode::BlockUnsupported => 11,
            ReasonCode::Unassigned(v) => v,
        }
    }
}

impl From<u64> for ReasonCode {
    fn from(value: u64) -> Self {
        match value {
            0 => ReasonCode::NoAdditionalInformation,
            1 => ReasonCode::LifetimeExpired,
            2 => ReasonCode::ForwardedOverUnidirectionalLink,
            3 => ReasonCode::TransmissionCanceled,
            4 => ReasonCode::DepletedStorage,
            5 => ReasonCode::DestinationEndpointIDUnavailable,
            6 => ReasonCode::NoKnownRouteToDestinationFromHere,
            7 => ReasonCode::NoTimelyContactWithNextNodeOnRoute,
            8 => ReasonCode::BlockUnintelligible,
            9 => ReasonCode::HopLimitExceeded,
            10 => ReasonCode::TrafficPared,
            11 => ReasonCode::BlockUnsupported,
            value => ReasonCode::Unassigned(value),
        }
    }
}

/// A single status assertion: whether the event occurred, and when, if the
/// bundle requested status times.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct StatusAssertion {
    pub asserted: bool,
    pub timestamp: Option<dtn_time::DtnTime>,
}

impl cbor::encode::ToCbor for StatusAssertion {
    type Result = ();

    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) -> Self::Result {
        match &self.timestamp {
            Some(t) => encoder.emit_array(Some(2), |a| {
                a.emit(&self.asserted);
                a.emit(t);
            }),
            None => encoder.emit_array(Some(1), |a| {
                a.emit(&self.asserted);
            }),
        }
    }
}

impl cbor::decode::FromCbor for StatusAssertion {
    type Error = Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        cbor::decode::parse_array(data, |a, _| {
            let asserted = a.parse().map_field_err("status indicator")?;
            let timestamp = if a.at_end().map_err(Error::InvalidCbor)? {
                None
            } else {
                Some(a.parse().map_field_err("status time")?)
            };
            Ok::<_, Error>(StatusAssertion {
                asserted,
                timestamp,
            })
        })
    }
}

/// A bundle status report.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub received: StatusAssertion,
    pub forwarded: StatusAssertion,
    pub delivered: StatusAssertion,
    pub deleted: StatusAssertion,
    pub reason: ReasonCode,
    /// The id of the bundle the report describes.
    pub bundle_id: bundle::Id,
}

impl cbor::encode::ToCbor for StatusReport {
    type Result = ();

    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) -> Self::Result {
        // [record-type, [status-info, reason, source, timestamp, ?frag-info]]
        encoder.emit_array(Some(2), |a| {
            a.emit(&STATUS_REPORT_RECORD_TYPE);
            a.emit_array(
                Some(if self.bundle_id.fragment_info.is_some() {
                    6
                } else {
                    4
                }),
                |a| {
                    a.emit_array(Some(4), |a| {
                        a.emit(&self.received);
                        a.emit(&self.forwarded);
                        a.emit(&self.delivered);
                        a.emit(&self.deleted);
                    });
                    a.emit(&u64::from(self.reason));
                    a.emit(&self.bundle_id.source);
                    a.emit(&self.bundle_id.timestamp);
                    if let Some(fi) = &self.bundle_id.fragment_info {
                        a.emit(&fi.offset);
                        a.emit(&fi.total_adu_length);
                    }
                },
            );
        })
    }
}

impl cbor::decode::FromCbor for StatusReport {
    type Error = Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        cbor::decode::parse_array(data, |a, _| {
            let record_type = a.parse::<u64>().map_field_err("record type code")?;
            if record_type != STATUS_REPORT_RECORD_TYPE {
                return Err(Error::InvalidField {
                    field: "record type code",
                    source: format!("unexpected administrative record type {record_type}")
                        .into(),
                });
            }
            a.parse_array(|a, _| {
                let (received, forwarded, delivered, deleted) = a
                    .parse_array(|a, _| {
                        Ok::<_, Error>((
                            a.parse().map_field_err("received status")?,
                            a.parse().map_field_err("forwarded status")?,
                            a.parse().map_field_err("delivered status")?,
                            a.parse().map_field_err("deleted status")?,
                        ))
                    })?
                    .0;
                let reason = a
                    .parse::<u64>()
                    .map_field_err("reason code")
                    .map(ReasonCode::from)?;
                let source = a.parse().map_field_err("source EID")?;
                let timestamp = a.parse().map_field_err("creation timestamp")?;
                let fragment_info = if a.at_end().map_err(Error::InvalidCbor)? {
                    None
                } else {
                    Some(bundle::FragmentInfo {
                        offset: a.parse().map_field_err("fragment offset")?,
                        total_adu_length: a
                            .parse()
                            .map_field_err("total application data unit length")?,
                    })
                };
                Ok::<_, Error>(StatusReport {
                    received,
                    forwarded,
                    delivered,
                    deleted,
                    reason,
                    bundle_id: bundle::Id {
                        source,
                        timestamp,
                        fragment_info,
                    },
                })
            })
            .map(|(v, _)| v)
        })
    }
}

/// Builds the administrative bundle carrying a status report about `subject`,
/// addressed to its report-to endpoint.
///
/// Returns `None` if the subject has a null report-to endpoint.
pub fn new_status_report(
    report: &StatusReport,
    subject: &bundle::Bundle,
    source: eid::Eid,
) -> Option<(bundle::Bundle, Vec<u8>)> {
    if subject.report_to.is_null() {
        return None;
    }
    Some(
        builder::Builder::new(source, subject.report_to.clone())
            .is_admin_record()
            .with_lifetime(subject.lifetime)
            .with_payload(cbor::encode::emit(report))
            .build(creation_timestamp::CreationTimestamp::now()),
    )
}
