#![cfg(test)]
use super::*;
use hex_literal::hex;

fn roundtrip_str(s: &str) {
    let eid: Eid = s.parse().unwrap();
    assert_eq!(eid.to_string(), s);
}

#[test]
fn str_forms() {
    roundtrip_str("dtn:none");
    roundtrip_str("dtn:GS2");
    roundtrip_str("dtn:node1/sink");
    roundtrip_str("dtn:node1/a/b");
    roundtrip_str("ipn:243.350");
    roundtrip_str("ipn:0.0");

    assert!(matches!(
        "http://example.com".parse::<Eid>(),
        Err(EidError::UnsupportedScheme(_))
    ));
    assert!(matches!(
        "garbage".parse::<Eid>(),
        Err(EidError::MissingScheme(_))
    ));
    assert!(matches!(
        "dtn:".parse::<Eid>(),
        Err(EidError::InvalidDtnSsp(_))
    ));
    assert!(matches!(
        "ipn:1".parse::<Eid>(),
        Err(EidError::InvalidIpnSsp(_))
    ));
    assert!(matches!(
        "ipn:1.x".parse::<Eid>(),
        Err(EidError::InvalidIpnSsp(_))
    ));
}

#[test]
fn cbor_forms() {
    // [1, 0] == dtn:none
    let (eid, len) = <Eid as cbor::decode::FromCbor>::from_cbor(&hex!("820100")).unwrap();
    assert_eq!(eid, Eid::Null);
    assert_eq!(len, 3);

    // [1, "GS2"]
    let eid: Eid = cbor::decode::parse(&hex!("820163475332")).unwrap();
    assert_eq!(
        eid,
        Eid::Dtn {
            node_name: "GS2".to_string(),
            demux: String::new()
        }
    );

    // [2, [243, 350]]
    let eid: Eid = cbor::decode::parse(&hex!("82028218f319015e")).unwrap();
    assert_eq!(
        eid,
        Eid::Ipn {
            node_number: 243,
            service_number: 350
        }
    );

    // Unknown scheme code
    assert!(matches!(
        cbor::decode::parse::<Eid>(&hex!("820300")),
        Err(EidError::UnsupportedSchemeCode(3))
    ));
}

#[test]
fn cbor_roundtrip() {
    for s in ["dtn:none", "dtn:GS2", "dtn:node1/sink", "ipn:243.350"] {
        let eid: Eid = s.parse().unwrap();
        let data = cbor::encode::emit(&eid);
        let back: Eid = cbor::decode::parse(&data).unwrap();
        assert_eq!(eid, back);
    }
}

#[test]
fn node_ids() {
    let eid: Eid = "dtn:node1/sink".parse().unwrap();
    assert_eq!(eid.node_id().to_string(), "dtn:node1");
    assert_eq!(eid.sink().as_deref(), Some("sink"));

    let eid: Eid = "ipn:243.350".parse().unwrap();
    assert_eq!(eid.node_id().to_string(), "ipn:243.0");
    assert_eq!(eid.sink().as_deref(), Some("350"));

    assert!(eid.same_node(&"ipn:243.0".parse().unwrap()));
    assert!(!eid.same_node(&"ipn:244.350".parse().unwrap()));

    let with_sink = Eid::Dtn {
        node_name: "node1".to_string(),
        demux: String::new(),
    }
    .with_sink("config")
    .unwrap();
    assert_eq!(with_sink.to_string(), "dtn:node1/config");
}
