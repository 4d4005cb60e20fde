#![cfg(test)]
use super::*;
use hex_literal::hex;

fn send_bundle(eid: &str, payload: &[u8]) -> Message {
    Message {
        message_type: MessageType::SendBundle,
        eid: Some(eid.to_string()),
        payload: Some(payload.into()),
        bundle_id: None,
    }
}

#[test]
fn wire_layout() {
    // PING is the bare header byte
    assert_eq!(Message::new(MessageType::Ping).emit().unwrap(), hex!("18"));

    // REGISTER "echo": header, u16 length, bytes
    let register = Message {
        message_type: MessageType::Register,
        eid: Some("echo".to_string()),
        payload: None,
        bundle_id: None,
    };
    assert_eq!(register.emit().unwrap(), hex!("12 0004 6563686f"));

    // SENDCONFIRM: header, u64 bundle id
    let confirm = Message {
        message_type: MessageType::SendConfirm,
        eid: None,
        payload: None,
        bundle_id: Some(7),
    };
    assert_eq!(confirm.emit().unwrap(), hex!("15 0000000000000007"));

    // SENDBUNDLE: header, eid, u64 payload length, payload
    let send = send_bundle("dtn:GS2", b"hi");
    assert_eq!(
        send.emit().unwrap(),
        hex!("13 0007 64746e3a475332 0000000000000002 6869")
    );
}

#[test]
fn round_trip_all_types() {
    let messages = [
        Message::new(MessageType::Ack),
        Message::new(MessageType::Nack),
        Message::new(MessageType::Ping),
        Message {
            message_type: MessageType::Register,
            eid: Some("sink".to_string()),
            payload: None,
            bundle_id: None,
        },
        send_bundle("ipn:243.350", b"payload"),
        Message {
            message_type: MessageType::RecvBundle,
            eid: Some("dtn:GS2/inbox".to_string()),
            payload: Some(b"delivered".to_vec().into()),
            bundle_id: None,
        },
        Message {
            message_type: MessageType::SendBibe,
            eid: Some("dtn:GS2".to_string()),
            payload: Some(hex!("830000410a").to_vec().into()),
            bundle_id: None,
        },
        Message {
            message_type: MessageType::Welcome,
            eid: Some("dtn:node1".to_string()),
            payload: None,
            bundle_id: None,
        },
        Message {
            message_type: MessageType::CancelBundle,
            eid: None,
            payload: None,
            bundle_id: Some(99),
        },
    ];

    // Concatenate everything and feed byte by byte
    let mut stream = Vec::new();
    for m in &messages {
        stream.extend(m.emit().unwrap());
    }

    let mut parser = StreamParser::new();
    let mut parsed = Vec::new();
    for byte in stream {
        let byte_buf = [byte];
        let mut data = byte_buf.as_slice();
        while let Some(m) = parser.push(data).unwrap() {
            parsed.push(m);
            data = &[];
        }
    }
    assert_eq!(parsed, messages);
    assert!(parser.is_empty());
}

#[test]
fn field_matrix_enforced() {
    // PING with an EID is invalid
    assert!(
        !Message {
            message_type: MessageType::Ping,
            eid: Some("dtn:GS2".to_string()),
            payload: None,
            bundle_id: None,
        }
        .is_valid()
    );

    // REGISTER without an EID is invalid
    assert!(
        !Message {
            message_type: MessageType::Register,
            eid: None,
            payload: None,
            bundle_id: None,
        }
        .is_valid()
    );

    // SENDBUNDLE without a payload is invalid
    assert!(
        !Message {
            message_type: MessageType::SendBundle,
            eid: Some("dtn:GS2".to_string()),
            payload: None,
            bundle_id: None,
        }
        .is_valid()
    );

    // Bundle id zero is invalid
    assert!(
        !Message {
            message_type: MessageType::CancelBundle,
            eid: None,
            payload: None,
            bundle_id: Some(0),
        }
        .is_valid()
    );

    // A REGISTER sink need not be a full EID
    assert!(
        Message {
            message_type: MessageType::Register,
            eid: Some("just-a-sink".to_string()),
            payload: None,
            bundle_id: None,
        }
        .is_valid()
    );

    // But a SENDBUNDLE destination must be
    assert!(!send_bundle("not-an-eid", b"x").is_valid());
    assert!(send_bundle("dtn:GS2", b"x").is_valid());
}

#[test]
fn parser_rejects_bad_input() {
    // Wrong protocol version
    let mut parser = StreamParser::new();
    assert!(matches!(
        parser.push(&hex!("28")),
        Err(Error::InvalidVersion(2))
    ));
    assert!(matches!(parser.push(&[]), Err(Error::ParserFailed)));

    // Unknown message type
    parser.reset();
    assert!(matches!(
        parser.push(&hex!("1f")),
        Err(Error::InvalidType(0xF))
    ));

    // Invalid UTF-8 in the EID
    parser.reset();
    assert!(matches!(
        parser.push(&hex!("12 0002 fffe")),
        Err(Error::InvalidUtf8)
    ));
}

#[test]
fn absurd_payload_length_rejected() {
    // A SENDBUNDLE claiming a payload near u64::MAX must fail outright,
    // not leave the parser waiting for bytes that will never arrive
    let mut message = hex!("13 0007 64746e3a475332").to_vec();
    message.extend_from_slice(&u64::MAX.to_be_bytes());

    let mut parser = StreamParser::new();
    assert!(matches!(
        parser.push(&message),
        Err(Error::PayloadTooLarge(u64::MAX))
    ));
    assert!(matches!(parser.push(&[]), Err(Error::ParserFailed)));

    // Just over the cap is rejected too, without needing the payload bytes
    let mut message = hex!("13 0007 64746e3a475332").to_vec();
    message.extend_from_slice(&(MAX_PAYLOAD_LENGTH + 1).to_be_bytes());
    parser.reset();
    assert!(matches!(
        parser.push(&message),
        Err(Error::PayloadTooLarge(_))
    ));
}
