#![cfg(test)]
use super::*;
use crate::cla::capture::CaptureCla;

struct TestAgent {
    delivered: flume::Sender<agents::Adu>,
}

impl agents::Agent for TestAgent {
    fn deliver(&self, adu: agents::Adu) {
        let _ = self.delivered.send(adu);
    }
}

fn test_config() -> config::Config {
    config::Config {
        node_eid: "dtn:node1".to_string(),
        fragment_min_payload: 32,
        ..Default::default()
    }
}

async fn recv<T>(rx: &flume::Receiver<T>) -> T {
    tokio::time::timeout(core::time::Duration::from_secs(5), rx.recv_async())
        .await
        .expect("timed out")
        .expect("channel closed")
}

fn active_contact(node: &str, bitrate: u64) -> RouterCommand {
    let now = time::OffsetDateTime::now_utc();
    RouterCommand::AddContact {
        node: node.parse().unwrap(),
        from: now - time::Duration::seconds(1),
        to: now + time::Duration::seconds(3600),
        bitrate,
        cla_name: "capture".to_string(),
        cla_address: "peer".to_string(),
        endpoints: Vec::new(),
    }
}

#[tokio::test]
async fn delivers_to_local_agent() {
    let bpa = Bpa::start(test_config());
    let (tx, rx) = flume::unbounded();
    bpa.register_agent("app", Arc::new(TestAgent { delivered: tx }))
        .await
        .unwrap();

    bpa.send(
        "client",
        "dtn:node1/app".parse().unwrap(),
        b"hello agent".to_vec(),
        core::time::Duration::from_secs(60),
    )
    .await
    .unwrap();

    let adu = recv(&rx).await;
    assert_eq!(adu.payload.as_ref(), b"hello agent");
    assert_eq!(adu.source.to_string(), "dtn:node1/client");
    assert_eq!(adu.destination.to_string(), "dtn:node1/app");

    bpa.shutdown().await;
}

#[tokio::test]
async fn rejects_duplicate_sink() {
    let bpa = Bpa::start(test_config());
    let (tx, _rx) = flume::unbounded();
    let agent = Arc::new(TestAgent { delivered: tx });

    bpa.register_agent("app", agent.clone()).await.unwrap();
    assert!(matches!(
        bpa.register_agent("app", agent.clone()).await,
        Err(agents::AgentError::DuplicateSink(_))
    ));

    // The predefined config sink is taken too
    assert!(matches!(
        bpa.register_agent(agents::CONFIG_SINK, agent.clone()).await,
        Err(agents::AgentError::DuplicateSink(_))
    ));

    // Deregistering frees the sink
    bpa.deregister_agent("app").await.unwrap();
    bpa.register_agent("app", agent).await.unwrap();

    bpa.shutdown().await;
}

#[tokio::test]
async fn forwards_in_fifo_order() {
    let bpa = Bpa::start(test_config());
    let (packets_tx, packets_rx) = flume::unbounded();
    bpa.register_cla(Arc::new(CaptureCla::new("capture", packets_tx)))
        .unwrap();
    bpa.router_command(active_contact("dtn:GS2", 1_000_000))
        .await;

    for i in 0..5u8 {
        bpa.send(
            "client",
            "dtn:GS2/inbox".parse().unwrap(),
            vec![i; 10],
            core::time::Duration::from_secs(60),
        )
        .await
        .unwrap();
    }

    // The transmission order equals the scheduling order
    for i in 0..5u8 {
        let (packet, address) = recv(&packets_rx).await;
        assert_eq!(address, "peer");
        let parsed = bundle::parse_bundle_data(&packet).unwrap();
        let bundle::Data::V7(b) = parsed else {
            panic!("expected v7 bundle");
        };
        assert_eq!(b.payload().unwrap(), vec![i; 10].as_slice());
        // The TX engine added the dwell time to nothing (no age block),
        // and the destination is preserved
        assert_eq!(b.destination.to_string(), "dtn:GS2/inbox");
    }

    bpa.shutdown().await;
}

#[tokio::test]
async fn defers_until_contact_starts() {
    let bpa = Bpa::start(test_config());
    let (packets_tx, packets_rx) = flume::unbounded();
    bpa.register_cla(Arc::new(CaptureCla::new("capture", packets_tx)))
        .unwrap();

    // A contact 2 seconds out
    let now = time::OffsetDateTime::now_utc();
    bpa.router_command(RouterCommand::AddContact {
        node: "dtn:GS2".parse().unwrap(),
        from: now + time::Duration::seconds(2),
        to: now + time::Duration::seconds(3600),
        bitrate: 1_000_000,
        cla_name: "capture".to_string(),
        cla_address: "peer".to_string(),
        endpoints: Vec::new(),
    })
    .await;

    bpa.send(
        "client",
        "dtn:GS2".parse().unwrap(),
        b"deferred until the window opens".to_vec(),
        core::time::Duration::from_secs(600),
    )
    .await
    .unwrap();

    // Nothing may be transmitted before the window opens
    assert!(packets_rx.try_recv().is_err());

    let (packet, _) = recv(&packets_rx).await;
    let parsed = bundle::parse_bundle_data(&packet).unwrap();
    let bundle::Data::V7(b) = parsed else {
        panic!("expected v7 bundle");
    };
    assert_eq!(b.payload().unwrap(), b"deferred until the window opens");

    bpa.shutdown().await;
}

#[tokio::test]
async fn emits_deletion_report_when_unroutable() {
    let bpa = Bpa::start(test_config());
    let (tx, rx) = flume::unbounded();
    bpa.register_agent("reports", Arc::new(TestAgent { delivered: tx }))
        .await
        .unwrap();

    // A bundle to an unknown destination, asking for a deletion report
    // sent to a local sink
    let (b, data) = tern_bpv7::builder::Builder::new(
        "ipn:99.1".parse().unwrap(),
        "dtn:nowhere".parse().unwrap(),
    )
    .with_report_to("dtn:node1/reports".parse().unwrap())
    .with_flags(tern_bpv7::bundle::Flags {
        delete_report_requested: true,
        ..Default::default()
    })
    .with_payload(b"doomed".to_vec())
    .build(tern_bpv7::creation_timestamp::CreationTimestamp::now());

    bpa.receive(data.into(), None).await;

    let adu = recv(&rx).await;
    let report: tern_bpv7::status_report::StatusReport =
        tern_cbor::decode::parse(&adu.payload).unwrap();
    assert!(report.deleted.asserted);
    assert_eq!(
        report.reason,
        tern_bpv7::status_report::ReasonCode::NoKnownRouteToDestinationFromHere
    );
    assert_eq!(report.bundle_id, b.id);

    bpa.shutdown().await;
}

#[tokio::test]
async fn echo_agent_round_trip() {
    let bpa = Bpa::start(config::Config {
        echo_agent: true,
        ..test_config()
    });
    let (tx, rx) = flume::unbounded();
    bpa.register_agent("client", Arc::new(TestAgent { delivered: tx }))
        .await
        .unwrap();

    bpa.send(
        "client",
        "dtn:node1/echo".parse().unwrap(),
        b"are you there?".to_vec(),
        core::time::Duration::from_secs(60),
    )
    .await
    .unwrap();

    let adu = recv(&rx).await;
    assert_eq!(adu.payload.as_ref(), b"are you there?");
    assert_eq!(adu.source.to_string(), "dtn:node1/echo");

    bpa.shutdown().await;
}

#[tokio::test]
async fn config_agent_applies_router_commands() {
    let bpa = Bpa::start(test_config());
    let (packets_tx, packets_rx) = flume::unbounded();
    bpa.register_cla(Arc::new(CaptureCla::new("capture", packets_tx)))
        .unwrap();

    // Configure a contact through the config agent, from a local source
    bpa.send(
        "admin",
        "dtn:node1/config".parse().unwrap(),
        b"ADD CONTACT dtn:GS2 +0-+3600 1000000 capture:peer".to_vec(),
        core::time::Duration::from_secs(60),
    )
    .await
    .unwrap();

    // Give the command a moment to land, then route a bundle over it
    tokio::time::sleep(core::time::Duration::from_millis(200)).await;
    bpa.send(
        "client",
        "dtn:GS2".parse().unwrap(),
        b"via configured contact".to_vec(),
        core::time::Duration::from_secs(60),
    )
    .await
    .unwrap();

    let (packet, _) = recv(&packets_rx).await;
    let parsed = bundle::parse_bundle_data(&packet).unwrap();
    let bundle::Data::V7(b) = parsed else {
        panic!("expected v7 bundle");
    };
    assert_eq!(b.payload().unwrap(), b"via configured contact");

    bpa.shutdown().await;
}

#[tokio::test]
async fn foreign_config_commands_are_refused() {
    let bpa = Bpa::start(test_config());
    let (packets_tx, packets_rx) = flume::unbounded();
    bpa.register_cla(Arc::new(CaptureCla::new("capture", packets_tx)))
        .unwrap();

    // The same command from a foreign node is dropped by the config agent
    let (_, data) = tern_bpv7::builder::Builder::new(
        "dtn:intruder".parse().unwrap(),
        "dtn:node1/config".parse().unwrap(),
    )
    .with_payload(b"ADD CONTACT dtn:GS2 +0-+3600 1000000 capture:peer".to_vec())
    .build(tern_bpv7::creation_timestamp::CreationTimestamp::now());
    bpa.receive(data.into(), None).await;

    tokio::time::sleep(core::time::Duration::from_millis(200)).await;
    bpa.send(
        "client",
        "dtn:GS2".parse().unwrap(),
        b"should not route".to_vec(),
        core::time::Duration::from_secs(60),
    )
    .await
    .unwrap();

    tokio::time::sleep(core::time::Duration::from_millis(300)).await;
    assert!(packets_rx.try_recv().is_err());

    bpa.shutdown().await;
}

#[tokio::test]
async fn splits_bundle_across_contacts() {
    let bpa = Bpa::start(test_config());
    let (packets_tx, packets_rx) = flume::unbounded();
    bpa.register_cla(Arc::new(CaptureCla::new("capture", packets_tx)))
        .unwrap();

    // Two active contacts with 600 bytes capacity each
    let now = time::OffsetDateTime::now_utc();
    for _ in 0..2 {
        bpa.router_command(RouterCommand::AddContact {
            node: "dtn:GS2".parse().unwrap(),
            from: now - time::Duration::seconds(1),
            to: now + time::Duration::seconds(599),
            bitrate: 1,
            cla_name: "capture".to_string(),
            cla_address: "peer".to_string(),
            endpoints: Vec::new(),
        })
        .await;
    }

    // A payload that cannot travel whole over either contact
    let payload: Vec<u8> = (0..=255u8).cycle().take(900).collect();
    bpa.send(
        "client",
        "dtn:GS2".parse().unwrap(),
        payload.clone(),
        core::time::Duration::from_secs(300),
    )
    .await
    .unwrap();

    let mut fragments = Vec::new();
    for _ in 0..2 {
        let (packet, _) = recv(&packets_rx).await;
        let bundle::Data::V7(b) = bundle::parse_bundle_data(&packet).unwrap() else {
            panic!("expected v7 bundle");
        };
        assert!(b.flags.is_fragment);
        fragments.push(b);
    }

    let reassembled = tern_bpv7::fragment::reassemble(fragments).unwrap();
    assert_eq!(reassembled.payload().unwrap(), payload.as_slice());

    bpa.shutdown().await;
}

#[tokio::test]
async fn failed_transmissions_are_retried_then_reported() {
    let bpa = Bpa::start(test_config());
    let (packets_tx, packets_rx) = flume::unbounded();
    let cla = Arc::new(CaptureCla::new("capture", packets_tx));
    cla.fail_sends
        .store(true, std::sync::atomic::Ordering::Relaxed);
    bpa.register_cla(cla).unwrap();

    let (reports_tx, reports_rx) = flume::unbounded();
    bpa.register_agent(
        "reports",
        Arc::new(TestAgent {
            delivered: reports_tx,
        }),
    )
    .await
    .unwrap();

    bpa.router_command(active_contact("dtn:GS2", 1_000_000))
        .await;
    tokio::time::sleep(core::time::Duration::from_millis(200)).await;

    let (_, data) = tern_bpv7::builder::Builder::new(
        "ipn:99.1".parse().unwrap(),
        "dtn:GS2".parse().unwrap(),
    )
    .with_report_to("dtn:node1/reports".parse().unwrap())
    .with_flags(tern_bpv7::bundle::Flags {
        delete_report_requested: true,
        ..Default::default()
    })
    .with_payload(b"never makes it".to_vec())
    .build(tern_bpv7::creation_timestamp::CreationTimestamp::now());
    bpa.receive(data.into(), None).await;

    // Every transmission attempt fails; the retry budget runs out and a
    // deletion report lands at the report-to endpoint
    let adu = recv(&reports_rx).await;
    let report: tern_bpv7::status_report::StatusReport =
        tern_cbor::decode::parse(&adu.payload).unwrap();
    assert!(report.deleted.asserted);
    assert!(packets_rx.try_recv().is_err());

    bpa.shutdown().await;
}

#[tokio::test]
async fn custody_transfer_round_trip() {
    let node1 = Bpa::start(config::Config {
        node_eid: "dtn:node1".to_string(),
        ..Default::default()
    });
    let node2 = Bpa::start(config::Config {
        node_eid: "dtn:node2".to_string(),
        ..Default::default()
    });

    // Wire the nodes to each other, forward and return path
    let now = time::OffsetDateTime::now_utc();
    for (from, to, to_node) in [
        (&node1, &node2, "dtn:node2"),
        (&node2, &node1, "dtn:node1"),
    ] {
        from.register_cla(Arc::new(crate::cla::loopback::LoopbackCla::new(
            to.ingress(),
        )))
        .unwrap();
        from.router_command(RouterCommand::AddContact {
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

    let (app_tx, app_rx) = flume::unbounded();
    node2
        .register_agent("app", Arc::new(TestAgent { delivered: app_tx }))
        .await
        .unwrap();

    // A v6 bundle requesting custody transfer, injected at node1
    let mut v6 = tern_bpv6::Bundle {
        flags: tern_bpv6::bundle::Flags {
            custody_requested: true,
            singleton_destination: true,
            ..Default::default()
        },
        destination: "dtn:node2/app".parse().unwrap(),
        source: "dtn:origin/app".parse().unwrap(),
        report_to: "dtn:none".parse().unwrap(),
        custodian: "dtn:none".parse().unwrap(),
        creation_timestamp: 0,
        sequence_number: 77,
        lifetime: core::time::Duration::from_secs(600),
        fragment_info: None,
        blocks: vec![tern_bpv6::bundle::Block::new(
            tern_bpv6::bundle::BlockType::Payload,
            b"under custody".to_vec().into(),
        )],
    };
    v6.fix_last_block_flags();
    node1
        .receive(tern_bpv6::serialize::emit_bundle(&v6).into(), None)
        .await;

    // node2 delivers the bundle and has taken custody on the way in
    let adu = recv(&app_rx).await;
    assert_eq!(adu.payload.as_ref(), b"under custody");
    assert_eq!(adu.source.to_string(), "dtn:origin/app");

    // The custody signal travels back to node1 and releases the held
    // bundle; give it a moment to land
    tokio::time::sleep(core::time::Duration::from_millis(300)).await;

    node2.shutdown().await;
    node1.shutdown().await;
}

#[tokio::test]
async fn cancel_removes_deferred_bundle() {
    let bpa = Bpa::start(test_config());
    let (packets_tx, packets_rx) = flume::unbounded();
    bpa.register_cla(Arc::new(CaptureCla::new("capture", packets_tx)))
        .unwrap();

    // A contact 1 second out; the bundle parks in the deferred set
    let now = time::OffsetDateTime::now_utc();
    bpa.router_command(RouterCommand::AddContact {
        node: "dtn:GS2".parse().unwrap(),
        from: now + time::Duration::seconds(1),
        to: now + time::Duration::seconds(3600),
        bitrate: 1_000_000,
        cla_name: "capture".to_string(),
        cla_address: "peer".to_string(),
        endpoints: Vec::new(),
    })
    .await;

    let bundle_id = bpa
        .send(
            "client",
            "dtn:GS2".parse().unwrap(),
            b"cancelled before the window".to_vec(),
            core::time::Duration::from_secs(600),
        )
        .await
        .unwrap();
    bpa.cancel_bundle(bundle_id).await;

    // The contact opens, but the bundle is gone
    tokio::time::sleep(core::time::Duration::from_millis(1500)).await;
    assert!(packets_rx.try_recv().is_err());

    bpa.shutdown().await;
}
