use super::*;
use tern_bpa::contact_manager::ContactInfo;
use tern_bpa::processor::Signal;
use tern_bpa::{bundle, cla};
use tern_bpv7::eid::Eid;

/// The encapsulating side of a BIBE tunnel, as a convergence layer.
///
/// A BIBE contact's CLA address is the decapsulation endpoint EID of the
/// far tunnel end.  Each packet written to a link is wrapped in a BPDU,
/// carried as the payload of a new outer bundle, and re-injected into the
/// node for ordinary routing.
pub struct BibeCla {
    tunnel_source: Eid,
    signals: flume::Sender<Signal>,
}

impl BibeCla {
    /// Creates a BIBE CLA sourcing outer bundles from `tunnel_source` and
    /// re-injecting them through `signals`.
    pub fn new(tunnel_source: Eid, signals: flume::Sender<Signal>) -> Self {
        Self {
            tunnel_source,
            signals,
        }
    }
}

#[async_trait::async_trait]
impl cla::Cla for BibeCla {
    fn name(&self) -> &str {
        "bibe"
    }

    async fn open(&self, contact: &ContactInfo) -> cla::Result<Box<dyn cla::Link>> {
        debug!("BIBE link to {} opened", contact.node);
        Ok(Box::new(BibeLink {
            tunnel_source: self.tunnel_source.clone(),
            signals: self.signals.clone(),
            packet: None,
        }))
    }
}

struct BibeLink {
    tunnel_source: Eid,
    signals: flume::Sender<Signal>,
    packet: Option<(Vec<u8>, Eid)>,
}

#[async_trait::async_trait]
impl cla::Link for BibeLink {
    async fn begin_packet(&mut self, size: usize, cla_address: &str) -> cla::Result<()> {
        let decap_endpoint: Eid = cla_address
            .parse()
            .map_err(|e: tern_bpv7::eid::EidError| cla::Error::Internal(Box::new(e)))?;
        self.packet = Some((Vec::with_capacity(size), decap_endpoint));
        Ok(())
    }

    async fn send_packet_data(&mut self, data: &[u8]) -> cla::Result<()> {
        let Some((packet, _)) = &mut self.packet else {
            return Err(cla::Error::LinkClosed);
        };
        packet.extend_from_slice(data);
        Ok(())
    }

    async fn end_packet(&mut self) -> cla::Result<()> {
        let Some((inner, decap_endpoint)) = self.packet.take() else {
            return Err(cla::Error::LinkClosed);
        };

        // Carry the inner bundle's remaining lifetime on the outer bundle
        let lifetime = bundle::parse_bundle_data(&inner)
            .ok()
            .map(|data| match data {
                bundle::Data::V6(b) => b.lifetime,
                bundle::Data::V7(b) => b.lifetime,
            })
            .unwrap_or(core::time::Duration::from_secs(24 * 60 * 60));

        let payload = tern_cbor::encode::emit(&Bpdu::new(inner.into()));
        let (outer, _) = tern_bpv7::builder::Builder::new(
            self.tunnel_source.clone(),
            decap_endpoint,
        )
        .with_lifetime(lifetime)
        .with_payload(payload)
        .build(tern_bpv7::creation_timestamp::CreationTimestamp::now());

        self.signals
            .send_async(Signal::DispatchBundle(bundle::Bundle::new(
                bundle::Data::V7(outer),
            )))
            .await
            .map_err(|_| cla::Error::LinkClosed)
    }

    async fn close(&mut self) -> cla::Result<()> {
        self.packet = None;
        Ok(())
    }
}
