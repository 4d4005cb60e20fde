use super::*;
use processor::Signal;

/// The echo agent: returns every delivered payload to its source.
pub struct EchoAgent {
    local_eid: Eid,
    signals: flume::Sender<Signal>,
}

impl EchoAgent {
    pub fn new(local_eid: Eid, signals: flume::Sender<Signal>) -> Self {
        Self { local_eid, signals }
    }
}

impl Agent for EchoAgent {
    fn deliver(&self, adu: Adu) {
        if adu.source.is_null() {
            return;
        }

        let (reply, _) = tern_bpv7::builder::Builder::new(
            self.local_eid
                .with_sink(ECHO_SINK)
                .unwrap_or_else(|_| self.local_eid.clone()),
            adu.source.clone(),
        )
        .with_payload(adu.payload.into_vec())
        .build(tern_bpv7::creation_timestamp::CreationTimestamp::now());

        let bundle = bundle::Bundle::new(bundle::Data::V7(reply));
        if let Err(e) = self.signals.try_send(Signal::DispatchBundle(bundle)) {
            warn!("EchoAgent: dropped echo reply: {e}");
        }
    }
}
