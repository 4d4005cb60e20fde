use super::*;
use tern_bpa::agents::{Adu, Agent};
use tern_bpa::processor::Signal;
use tern_bpa::Bytes;

/// The decapsulating side of a BIBE tunnel, as an application agent.
///
/// Registered at the [`BIBE_SINK`] sink; every delivered ADU is expected
/// to be a BPDU whose inner bundle is pushed back through ingress.
pub struct DecapAgent {
    ingress: flume::Sender<Signal>,
}

impl DecapAgent {
    pub fn new(ingress: flume::Sender<Signal>) -> Self {
        Self { ingress }
    }
}

impl Agent for DecapAgent {
    fn deliver(&self, adu: Adu) {
        let bpdu: Bpdu = match tern_cbor::decode::parse(&adu.payload) {
            Ok(bpdu) => bpdu,
            Err(e) => {
                warn!("Malformed BPDU from {}: {e}", adu.source);
                return;
            }
        };
        debug!(
            "Decapsulating {} byte bundle from {}",
            bpdu.encapsulated_bundle.len(),
            adu.source
        );
        if self
            .ingress
            .try_send(Signal::ReceiveBundle {
                data: Bytes::from(bpdu.encapsulated_bundle.into_vec()),
                source_cla_address: None,
            })
            .is_err()
        {
            warn!("Ingress queue full, decapsulated bundle dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tern_bpa::{Bpa, agents, cla, config};

    struct CaptureAgent {
        delivered: flume::Sender<Adu>,
    }

    impl Agent for CaptureAgent {
        fn deliver(&self, adu: Adu) {
            let _ = self.delivered.send(adu);
        }
    }

    fn node(eid: &str) -> Bpa {
        Bpa::start(config::Config {
            node_eid: eid.to_string(),
            ..Default::default()
        })
    }

    async fn wire(from: &Bpa, to: &Bpa, to_node: &str) {
        // A loopback CLA whose far end is another node's ingress makes a
        // perfectly reliable inter-node link
        from.register_cla(Arc::new(cla::loopback::LoopbackCla::new(to.ingress())))
            .unwrap();
        let now = time::OffsetDateTime::now_utc();
        from.router_command(agents::RouterCommand::AddContact {
            node: to_node.parse().unwrap(),
            from: now - time::Duration::seconds(1),
            to: now + time::Duration::seconds(3600),
            bitrate: 1_000_000,
            cla_name: "loopback".to_string(),
            cla_address: to_node.to_string(),
            endpoints: Vec::new(),
        })
        .await;
    }

    /// node1 encapsulates bundles for the `ipn:60` network into a tunnel
    /// whose decapsulation endpoint lives on node2; node2 unwraps and
    /// forwards the inner bundle to node3, where it is delivered.
    #[tokio::test]
    async fn tunnel_end_to_end() {
        let node1 = node("dtn:node1");
        let node2 = node("ipn:50.0");
        let node3 = node("ipn:60.0");

        // node1: BIBE encapsulation, plus a link to node2 for the outer
        // bundles
        node1
            .register_cla(Arc::new(BibeCla::new(
                "dtn:node1".parse().unwrap(),
                node1.ingress(),
            )))
            .unwrap();
        wire(&node1, &node2, "ipn:50.0").await;
        let now = time::OffsetDateTime::now_utc();
        node1
            .router_command(agents::RouterCommand::AddContact {
                node: "dtn:tunnel1".parse().unwrap(),
                from: now - time::Duration::seconds(1),
                to: now + time::Duration::seconds(3600),
                bitrate: 1_000_000,
                cla_name: "bibe".to_string(),
                cla_address: "ipn:50.99".to_string(),
                endpoints: vec!["ipn:60.".to_string()],
            })
            .await;

        // node2: decapsulation endpoint at ipn:50.99, link onwards to node3
        node2
            .register_agent("99", Arc::new(DecapAgent::new(node2.ingress())))
            .await
            .unwrap();
        wire(&node2, &node3, "ipn:60.0").await;

        // node3: the inner destination application
        let (app_tx, app_rx) = flume::unbounded();
        node3
            .register_agent("7", Arc::new(CaptureAgent { delivered: app_tx }))
            .await
            .unwrap();

        node1
            .send(
                "client",
                "ipn:60.7".parse().unwrap(),
                b"through the tunnel".to_vec(),
                core::time::Duration::from_secs(60),
            )
            .await
            .unwrap();

        let adu = tokio::time::timeout(
            core::time::Duration::from_secs(5),
            app_rx.recv_async(),
        )
        .await
        .expect("timed out")
        .unwrap();
        assert_eq!(adu.payload.as_ref(), b"through the tunnel");
        assert_eq!(adu.source.to_string(), "dtn:node1/client");
        assert_eq!(adu.destination.to_string(), "ipn:60.7");

        node3.shutdown().await;
        node2.shutdown().await;
        node1.shutdown().await;
    }
}
