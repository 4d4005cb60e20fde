use super::*;
use tern_bpv7::status_report::{ReasonCode, StatusAssertion, StatusReport};

impl Processor {
    /// Emits a deletion status report if the bundle asked for one.
    pub(super) fn report_deletion(&mut self, bundle: &bundle::Bundle, reason: ReasonCode) {
        if !bundle.delete_report_requested() {
            return;
        }
        self.send_report(bundle, reason, |flags| flags.deleted = true);
    }

    /// Emits a reception status report if the bundle asked for one.
    pub(super) fn report_reception(&mut self, bundle: &bundle::Bundle) {
        let requested = match &bundle.data {
            bundle::Data::V6(b) => b.flags.receipt_report_requested,
            bundle::Data::V7(b) => b.flags.receipt_report_requested,
        };
        if !requested {
            return;
        }
        self.send_report(bundle, ReasonCode::NoAdditionalInformation, |flags| {
            flags.received = true
        });
    }

    /// Accepts custody of a v6 bundle: notifies the previous custodian
    /// with a custody signal and records this node as custodian.
    pub(super) fn accept_custody(&mut self, bundle: &mut bundle::Bundle) {
        let bundle::Data::V6(b) = &mut bundle.data else {
            return;
        };
        let previous_custodian = core::mem::replace(&mut b.custodian, self.node_eid.clone());
        if previous_custodian.is_null() || previous_custodian.same_node(&self.node_eid) {
            return;
        }

        let record = tern_bpv6::admin::CustodySignal {
            succeeded: true,
            reason: 0,
            time: (time::OffsetDateTime::now_utc().unix_timestamp() - 946_684_800).max(0) as u64,
            bundle: tern_bpv6::admin::BundleRef {
                source: b.source.clone(),
                creation_timestamp: b.creation_timestamp,
                sequence_number: b.sequence_number,
                fragment: b.fragment_info.map(|fi| (fi.offset, fi.total_adu_length)),
            },
        };
        let mut signal_bundle = tern_bpv6::Bundle {
            flags: tern_bpv6::bundle::Flags {
                is_admin_record: true,
                singleton_destination: true,
                ..Default::default()
            },
            destination: previous_custodian,
            source: self.node_eid.clone(),
            report_to: tern_bpv7::eid::Eid::Null,
            custodian: tern_bpv7::eid::Eid::Null,
            creation_timestamp: 0,
            sequence_number: next_report_sequence(),
            lifetime: b.lifetime,
            fragment_info: None,
            blocks: vec![tern_bpv6::bundle::Block::new(
                tern_bpv6::bundle::BlockType::Payload,
                record.emit().into(),
            )],
        };
        signal_bundle.fix_last_block_flags();

        trace!("Accepting custody, signalling {}", signal_bundle.destination);
        self.dispatch(bundle::Bundle::new(bundle::Data::V6(signal_bundle)));
    }

    /// Emits a delivery status report if the bundle asked for one.
    pub(super) fn report_delivery(&mut self, bundle: &bundle::Bundle) {
        let requested = match &bundle.data {
            bundle::Data::V6(b) => b.flags.delivery_report_requested,
            bundle::Data::V7(b) => b.flags.delivery_report_requested,
        };
        if !requested {
            return;
        }
        self.send_report(bundle, ReasonCode::NoAdditionalInformation, |flags| {
            flags.delivered = true
        });
    }

    /// Emits a forwarding status report if the bundle asked for one.
    pub(super) fn report_forwarded(&mut self, bundle: &bundle::Bundle) {
        let requested = match &bundle.data {
            bundle::Data::V6(b) => b.flags.forward_report_requested,
            bundle::Data::V7(b) => b.flags.forward_report_requested,
        };
        if !requested {
            return;
        }
        self.send_report(bundle, ReasonCode::NoAdditionalInformation, |flags| {
            flags.forwarded = true
        });
    }

    /// Builds the status-report bundle in the subject's own protocol
    /// version and puts it through dispatch like any other bundle.
    fn send_report<F>(&mut self, subject: &bundle::Bundle, reason: ReasonCode, assert: F)
    where
        F: FnOnce(&mut ReportedStatus),
    {
        // Reports about administrative records would recurse
        if subject.is_admin_record() {
            return;
        }

        let mut status = ReportedStatus::default();
        assert(&mut status);

        let report = match &subject.data {
            bundle::Data::V6(b) => {
                if b.report_to.is_null() {
                    return;
                }
                let record = tern_bpv6::admin::StatusReport {
                    flags: tern_bpv6::admin::StatusFlags {
                        received: status.received,
                        forwarded: status.forwarded,
                        delivered: status.delivered,
                        deleted: status.deleted,
                        custody_accepted: false,
                    },
                    reason: u64::from(reason) as u8,
                    // Seconds since the DTN epoch, 2000-01-01 UTC
                    time: (time::OffsetDateTime::now_utc().unix_timestamp() - 946_684_800).max(0)
                        as u64,
                    bundle: tern_bpv6::admin::BundleRef {
                        source: b.source.clone(),
                        creation_timestamp: b.creation_timestamp,
                        sequence_number: b.sequence_number,
                        fragment: b
                            .fragment_info
                            .map(|fi| (fi.offset, fi.total_adu_length)),
                    },
                };
                let mut report_bundle = tern_bpv6::Bundle {
                    flags: tern_bpv6::bundle::Flags {
                        is_admin_record: true,
                        singleton_destination: true,
                        ..Default::default()
                    },
                    destination: b.report_to.clone(),
                    source: self.node_eid.clone(),
                    report_to: tern_bpv7::eid::Eid::Null,
                    custodian: tern_bpv7::eid::Eid::Null,
                    creation_timestamp: 0,
                    sequence_number: next_report_sequence(),
                    lifetime: b.lifetime,
                    fragment_info: None,
                    blocks: vec![tern_bpv6::bundle::Block::new(
                        tern_bpv6::bundle::BlockType::Payload,
                        record.emit().into(),
                    )],
                };
                report_bundle.fix_last_block_flags();
                bundle::Bundle::new(bundle::Data::V6(report_bundle))
            }
            bundle::Data::V7(b) => {
                let record = StatusReport {
                    received: StatusAssertion {
                        asserted: status.received,
                        timestamp: None,
                    },
                    forwarded: StatusAssertion {
                        asserted: status.forwarded,
                        timestamp: None,
                    },
                    delivered: StatusAssertion {
                        asserted: status.delivered,
                        timestamp: None,
                    },
                    deleted: StatusAssertion {
                        asserted: status.deleted,
                        timestamp: None,
                    },
                    reason,
                    bundle_id: b.id.clone(),
                };
                let Some((report_bundle, _)) = tern_bpv7::status_report::new_status_report(
                    &record,
                    b,
                    self.node_eid.clone(),
                ) else {
                    return;
                };
                bundle::Bundle::new(bundle::Data::V7(report_bundle))
            }
        };

        trace!("Sending status report to {}", report.destination());
        self.dispatch(report);
    }
}

/// The statuses a report can assert.
#[derive(Default)]
pub(super) struct ReportedStatus {
    pub received: bool,
    pub forwarded: bool,
    pub delivered: bool,
    pub deleted: bool,
}

fn next_report_sequence() -> u64 {
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);
    COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}
