use super::*;

impl Processor {
    /// Delivers a bundle addressed to this node: reassembly for fragments,
    /// administrative record handling, then agent delivery by sink.
    pub(super) fn deliver_local(&mut self, bundle: bundle::Bundle) {
        let is_fragment = match &bundle.data {
            bundle::Data::V6(b) => b.fragment_info.is_some(),
            bundle::Data::V7(b) => b.id.fragment_info.is_some(),
        };
        if is_fragment {
            return self.reassemble(bundle);
        }

        if bundle.is_admin_record() {
            return self.administrative_bundle(bundle);
        }

        let Some(sink) = bundle.destination().sink() else {
            debug!(
                "No sink in local destination {}, bundle dropped",
                bundle.destination()
            );
            return self.destroy(
                bundle,
                Some(tern_bpv7::status_report::ReasonCode::DestinationEndpointIDUnavailable),
            );
        };

        let Some(agent) = self.agents.find(&sink) else {
            debug!("No agent at sink \"{sink}\", bundle dropped");
            return self.destroy(
                bundle,
                Some(tern_bpv7::status_report::ReasonCode::DestinationEndpointIDUnavailable),
            );
        };

        let Some(payload) = bundle.payload().map(Box::from) else {
            return self.destroy(
                bundle,
                Some(tern_bpv7::status_report::ReasonCode::BlockUnintelligible),
            );
        };

        trace!("Delivering bundle {} to sink \"{sink}\"", bundle.id);
        agent.deliver(agents::Adu {
            source: bundle.source().clone(),
            destination: bundle.destination().clone(),
            payload,
        });

        self.report_delivery(&bundle);
        drop(bundle);
    }

    /// Adds a fragment to the reassembly buffer and delivers the original
    /// bundle once the ADU is complete.
    fn reassemble(&mut self, bundle: bundle::Bundle) {
        // Key by the original bundle: external id without the offset
        let mut key = bundle.external_id();
        key.fragment_offset = None;

        let fragments = self.reassembly.entry(key.clone()).or_default();
        fragments.push(bundle.data);

        let complete = match fragments.first() {
            Some(bundle::Data::V6(first)) => {
                let total = first
                    .fragment_info
                    .map(|fi| fi.total_adu_length)
                    .unwrap_or(0);
                covered(
                    fragments.iter().filter_map(|f| match f {
                        bundle::Data::V6(b) => Some((
                            b.fragment_info.map(|fi| fi.offset).unwrap_or(0),
                            b.payload().map(<[u8]>::len).unwrap_or(0) as u64,
                        )),
                        _ => None,
                    }),
                    total,
                )
            }
            Some(bundle::Data::V7(first)) => {
                let total = first
                    .id
                    .fragment_info
                    .map(|fi| fi.total_adu_length)
                    .unwrap_or(0);
                covered(
                    fragments.iter().filter_map(|f| match f {
                        bundle::Data::V7(b) => Some((
                            b.id.fragment_info.map(|fi| fi.offset).unwrap_or(0),
                            b.payload().map(<[u8]>::len).unwrap_or(0) as u64,
                        )),
                        _ => None,
                    }),
                    total,
                )
            }
            None => false,
        };
        if !complete {
            return;
        }

        let fragments = self.reassembly.remove(&key).unwrap_or_default();
        let v6 = matches!(fragments.first(), Some(bundle::Data::V6(_)));
        let reassembled = if v6 {
            tern_bpv6::fragment::reassemble(
                fragments
                    .into_iter()
                    .filter_map(|f| match f {
                        bundle::Data::V6(b) => Some(b),
                        _ => None,
                    })
                    .collect(),
            )
            .map(bundle::Data::V6)
            .map_err(|e| e.to_string())
        } else {
            tern_bpv7::fragment::reassemble(
                fragments
                    .into_iter()
                    .filter_map(|f| match f {
                        bundle::Data::V7(b) => Some(b),
                        _ => None,
                    })
                    .collect(),
            )
            .map(bundle::Data::V7)
            .map_err(|e| e.to_string())
        };

        match reassembled {
            Ok(data) => {
                debug!("Reassembly complete");
                self.deliver_local(bundle::Bundle::new(data))
            }
            Err(e) => warn!("Reassembly failed: {e}"),
        }
    }

    /// Handles a bundle addressed to the node's administrative endpoint.
    fn administrative_bundle(&mut self, bundle: bundle::Bundle) {
        let Some(payload) = bundle.payload() else {
            return self.destroy(
                bundle,
                Some(tern_bpv7::status_report::ReasonCode::BlockUnintelligible),
            );
        };

        match &bundle.data {
            bundle::Data::V6(_) => match tern_bpv6::admin::parse(payload) {
                Ok(tern_bpv6::admin::AdminRecord::CustodySignal(signal)) => {
                    self.custody_signal(signal);
                }
                Ok(tern_bpv6::admin::AdminRecord::StatusReport(report)) => {
                    info!(
                        "Status report for {}/{}: {:?} reason {}",
                        report.bundle.source,
                        report.bundle.creation_timestamp,
                        report.flags,
                        report.reason
                    );
                }
                Err(e) => warn!("Malformed administrative record: {e}"),
            },
            bundle::Data::V7(_) => {
                match tern_cbor::decode::parse::<tern_bpv7::status_report::StatusReport>(payload) {
                    Ok(report) => {
                        info!(
                            "Status report for {}: reason {:?}",
                            report.bundle_id, report.reason
                        );
                    }
                    Err(e) => warn!("Malformed administrative record: {e}"),
                }
            }
        }
        drop(bundle);
    }

    /// Releases a custody-held bundle acknowledged by the next hop.
    fn custody_signal(&mut self, signal: tern_bpv6::admin::CustodySignal) {
        let held = self.custody.iter().find_map(|(id, held)| {
            let external = held.external_id();
            (external.source == signal.bundle.source
                && external.creation_timestamp == signal.bundle.creation_timestamp
                && external.sequence_number == signal.bundle.sequence_number)
                .then_some(*id)
        });
        let Some(bundle_id) = held else {
            debug!("Custody signal for unknown bundle from {}", signal.bundle.source);
            return;
        };
        if signal.succeeded {
            debug!("Custody accepted downstream, releasing bundle {bundle_id}");
            if let Some(bundle) = self.custody.remove(&bundle_id) {
                self.destroy(bundle, None);
            }
        } else {
            debug!("Custody refused downstream, re-routing bundle {bundle_id}");
            if let Some(bundle) = self.custody.remove(&bundle_id) {
                self.retry(bundle);
            }
        }
    }
}

/// Returns `true` if the `(offset, length)` spans cover `0..total` without
/// gaps.
fn covered(spans: impl Iterator<Item = (u64, u64)>, total: u64) -> bool {
    let mut spans: Vec<(u64, u64)> = spans.collect();
    spans.sort_unstable();
    let mut end = 0;
    for (offset, len) in spans {
        if offset > end {
            return false;
        }
        end = end.max(offset + len);
    }
    total > 0 && end >= total
}
