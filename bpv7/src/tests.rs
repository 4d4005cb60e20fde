#![cfg(test)]
use super::*;
use hex_literal::hex;

// A CBOR-encoded bundle with all the extension blocks recognized by this
// implementation: Previous Node, Hop Count, Bundle Age and Payload.
const SIMPLE_BUNDLE: &[u8] = &hex!(
    "9f"
    // Primary block: [7, 131076, 0, [1,"GS2"], [2,[243,350]], [1,0],
    //                 [658489863000, 0], 86400]
    "8807 1a00020004 00 820163475332 82028218f319015e 820100"
    "821b0000009951 0deb5800 1a00015180"
    // Previous Node block [6, 2, 0, 0, h'820163475334']
    "8506020000 46820163475334"
    // Hop Count block [10, 3, 0, 0, h'82181e00']
    "850a030000 4482181e00"
    // Bundle Age block [7, 4, 0, 0, h'00']
    "8507040000 4100"
    // Payload block [1, 1, 0, 0, h'48656c6c6f20776f726c6421']
    "8501010000 4c48656c6c6f20776f726c6421"
    "ff"
);

// Bundle with a CRC-16 checksum on the primary block and an empty payload
const CRC16_PRIMARY_BLOCK: &[u8] = &hex!(
    "9f 8907000182016347533282010082010082"
    "00001a00015180427123 850100000040 ff"
);

// As CRC16_PRIMARY_BLOCK but with the CRC bytes zeroed
const INVALID_CRC16: &[u8] = &hex!(
    "9f 8907000182016347533282010082010082"
    "00001a00015180420000 850100000040 ff"
);

// Bundle with a CRC-32C checksum on the primary block
const CRC32_PRIMARY_BLOCK: &[u8] = &hex!(
    "9f 8907000282016347533282010082010082"
    "00001a00015180 449542defd 850100000040 ff"
);

// Bundle with a CRC-16 checksum on the payload block
const CRC16_PAYLOAD_BLOCK: &[u8] = &hex!(
    "9f 880700008201634753328201008201008200001a00015180"
    "8601000001 4c48656c6c6f20776f726c6421 4260d7 ff"
);

#[test]
fn parse_simple_bundle() {
    let bundle = parse::parse_bundle(SIMPLE_BUNDLE).unwrap();

    assert_eq!(bundle.destination.to_string(), "dtn:GS2");
    assert_eq!(bundle.id.source.to_string(), "ipn:243.350");
    assert!(bundle.report_to.is_null());
    assert_eq!(
        bundle.id.timestamp.creation_time().unwrap().millisecs(),
        658489863000
    );
    assert_eq!(bundle.id.timestamp.sequence_number(), 0);
    assert_eq!(bundle.lifetime.as_millis(), 86400);
    assert!(bundle.flags.delivery_report_requested);
    assert!(bundle.flags.do_not_fragment);
    assert!(!bundle.flags.is_fragment);
    assert!(matches!(bundle.crc_type, CrcType::None));

    assert_eq!(bundle.blocks.len(), 4);
    assert_eq!(
        bundle.previous_node().unwrap().to_string(),
        "dtn:GS4"
    );
    let hop_count = bundle.hop_count().unwrap();
    assert_eq!(hop_count.limit, 30);
    assert_eq!(hop_count.count, 0);
    assert_eq!(bundle.age(), Some(core::time::Duration::ZERO));
    assert_eq!(bundle.payload().unwrap(), b"Hello world!");
}

#[test]
fn simple_bundle_round_trips_exactly() {
    let bundle = parse::parse_bundle(SIMPLE_BUNDLE).unwrap();
    assert_eq!(serialize::emit_bundle(&bundle), SIMPLE_BUNDLE);
    assert_eq!(serialize::serialized_size(&bundle), SIMPLE_BUNDLE.len());

    let mut streamed = Vec::new();
    serialize::serialize_into(&bundle, &mut streamed).unwrap();
    assert_eq!(streamed, SIMPLE_BUNDLE);
}

#[test]
fn crc16_primary_verifies() {
    let bundle = parse::parse_bundle(CRC16_PRIMARY_BLOCK).unwrap();
    assert!(matches!(bundle.crc_type, CrcType::Crc16X25));
    assert!(bundle.id.timestamp.creation_time().is_none());
    assert_eq!(bundle.payload().unwrap(), b"");
}

#[test]
fn crc16_primary_mismatch_fails() {
    assert!(matches!(
        parse::parse_bundle(INVALID_CRC16),
        Err(Error::InvalidCrc(crc::CrcError::IncorrectCrc))
    ));
}

#[test]
fn crc32_primary_verifies() {
    let bundle = parse::parse_bundle(CRC32_PRIMARY_BLOCK).unwrap();
    assert!(matches!(bundle.crc_type, CrcType::Crc32Castagnoli));
}

#[test]
fn crc16_payload_verifies() {
    let bundle = parse::parse_bundle(CRC16_PAYLOAD_BLOCK).unwrap();
    assert_eq!(bundle.payload().unwrap(), b"Hello world!");
}

#[test]
fn crc_bit_flip_is_detected() {
    // Flipping any single bit outside the payload contents of a
    // CRC-protected block must make parsing fail
    for byte in 0..CRC16_PRIMARY_BLOCK.len() {
        for bit in 0..8 {
            let mut data = CRC16_PRIMARY_BLOCK.to_vec();
            data[byte] ^= 1 << bit;
            if data == CRC16_PRIMARY_BLOCK {
                continue;
            }
            // The corruption may fail anywhere in the parse, but a bundle
            // that still parses whole must be flagged by the CRC check,
            // unless the flip landed outside the protected primary block
            if byte > 0 && byte < 28 {
                assert!(
                    parse::parse_bundle(&data).is_err(),
                    "bit {bit} of byte {byte} flipped undetected"
                );
            }
        }
    }
}

#[test]
fn emitted_crc_matches_parsed() {
    let (_, data) = builder::Builder::new(
        "ipn:1.1".parse().unwrap(),
        "dtn:GS2".parse().unwrap(),
    )
    .with_crc_type(CrcType::Crc16X25)
    .with_payload(b"checked".to_vec())
    .build(creation_timestamp::CreationTimestamp::now());

    let bundle = parse::parse_bundle(&data).unwrap();
    assert_eq!(bundle.payload().unwrap(), b"checked");

    let (_, data) = builder::Builder::new(
        "ipn:1.1".parse().unwrap(),
        "dtn:GS2".parse().unwrap(),
    )
    .with_crc_type(CrcType::Crc32Castagnoli)
    .with_payload(b"checked".to_vec())
    .build(creation_timestamp::CreationTimestamp::now());

    parse::parse_bundle(&data).unwrap();
}

#[test]
fn stream_parser_handles_arbitrary_chunks() {
    // Two bundles back to back, fed a byte at a time
    let mut stream = SIMPLE_BUNDLE.to_vec();
    stream.extend_from_slice(CRC16_PRIMARY_BLOCK);

    for chunk_size in [1, 2, 3, 7, 64, stream.len()] {
        let mut parser = parse::StreamParser::new();
        let mut bundles = Vec::new();
        for chunk in stream.chunks(chunk_size) {
            let mut chunk = chunk;
            loop {
                match parser.push(chunk).unwrap() {
                    Some(bundle) => {
                        bundles.push(bundle);
                        // Drain any further complete bundles in the buffer
                        chunk = &[];
                    }
                    None => break,
                }
            }
        }
        assert_eq!(bundles.len(), 2, "chunk size {chunk_size}");
        assert_eq!(bundles[0].payload().unwrap(), b"Hello world!");
        assert_eq!(bundles[1].payload().unwrap(), b"");
        assert!(parser.is_empty());
    }
}

#[test]
fn stream_parser_latches_errors_until_reset() {
    let mut parser = parse::StreamParser::new();
    assert!(matches!(
        parser.push(&[0x00]),
        Err(Error::InvalidFraming)
    ));
    assert!(matches!(parser.push(&[]), Err(Error::ParserFailed)));

    parser.reset();
    assert!(parser.push(SIMPLE_BUNDLE).unwrap().is_some());
}

#[test]
fn payload_must_be_final() {
    // Move the payload block before the bundle age block
    let truncated = &SIMPLE_BUNDLE[..SIMPLE_BUNDLE.len() - 1];
    let mut data = truncated.to_vec();
    // Append a second bundle age block after the payload
    data.extend_from_slice(&hex!("8507050000 4100"));
    data.push(0xFF);
    assert!(matches!(
        parse::parse_bundle(&data),
        Err(Error::PayloadNotFinal)
    ));
}

#[test]
fn missing_payload_rejected() {
    // Primary block then immediate break
    let data = hex!(
        "9f 8807 1a00020004 00 820163475332 82028218f319015e 820100"
        "821b0000009951 0deb5800 1a00015180 ff"
    );
    assert!(matches!(
        parse::parse_bundle(&data),
        Err(Error::MissingPayload)
    ));
}

fn test_bundle(payload: &[u8]) -> bundle::Bundle {
    let (bundle, _) = builder::Builder::new(
        "ipn:243.350".parse().unwrap(),
        "dtn:GS2".parse().unwrap(),
    )
    .add_extension_block(
        block::Type::BundleAge,
        tern_cbor::encode::emit(&0u64).into(),
    )
    .with_payload(payload.to_vec())
    .build(creation_timestamp::CreationTimestamp::now());
    bundle
}

#[test]
fn fragment_totality() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(1500).collect();
    let original = test_bundle(&payload);

    for first_max in [100, 256, 700, 1400] {
        let (first, rest) = fragment::fragment(&original, first_max).unwrap();
        assert!(serialize::serialized_size(&first) <= first_max);
        assert!(first.flags.is_fragment && rest.flags.is_fragment);

        let fi = first.id.fragment_info.unwrap();
        assert_eq!(fi.offset, 0);
        assert_eq!(fi.total_adu_length, 1500);

        let mut combined = first.payload().unwrap().to_vec();
        combined.extend_from_slice(rest.payload().unwrap());
        assert_eq!(combined, payload);

        // Bundle age replicates into both fragments
        assert!(first.age().is_some());
        assert!(rest.age().is_some());

        let reassembled = fragment::reassemble(vec![rest, first]).unwrap();
        assert_eq!(reassembled, original);
    }
}

#[test]
fn refragmentation_accumulates_offsets() {
    let payload: Vec<u8> = (0..200u8).cycle().take(1000).collect();
    let original = test_bundle(&payload);

    let (first, rest) = fragment::fragment(&original, 400).unwrap();
    let (second, third) = fragment::fragment(&rest, 400).unwrap();

    let fi = second.id.fragment_info.unwrap();
    assert_eq!(fi.offset, first.payload().unwrap().len() as u64);
    assert_eq!(fi.total_adu_length, 1000);

    let reassembled = fragment::reassemble(vec![third, first, second]).unwrap();
    assert_eq!(reassembled, original);
}

#[test]
fn do_not_fragment_is_honored() {
    let mut bundle = test_bundle(b"too big to send whole");
    bundle.flags.do_not_fragment = true;
    assert!(matches!(
        fragment::fragment(&bundle, 10),
        Err(Error::FragmentForbidden)
    ));
}

#[test]
fn status_report_round_trip() {
    let (subject, _) = builder::Builder::new(
        "ipn:243.350".parse().unwrap(),
        "dtn:GS2".parse().unwrap(),
    )
    .with_report_to("dtn:GS3".parse().unwrap())
    .with_payload(b"reported".to_vec())
    .build(creation_timestamp::CreationTimestamp::now());
    let report = status_report::StatusReport {
        delivered: status_report::StatusAssertion {
            asserted: true,
            timestamp: None,
        },
        reason: status_report::ReasonCode::NoAdditionalInformation,
        bundle_id: subject.id.clone(),
        ..Default::default()
    };

    let (bundle, data) =
        status_report::new_status_report(&report, &subject, "dtn:GS4".parse().unwrap())
            .expect("subject has no report-to endpoint");
    assert!(bundle.flags.is_admin_record);

    let parsed = parse::parse_bundle(&data).unwrap();
    let parsed_report: status_report::StatusReport =
        tern_cbor::decode::parse(parsed.payload().unwrap()).unwrap();
    assert_eq!(parsed_report, report);
}

#[test]
fn extreme_wire_times_do_not_panic() {
    let now = time::OffsetDateTime::now_utc();

    // Creation time and lifetime at the top of the u64 range must clamp,
    // not panic, anywhere in the expiry arithmetic
    let (mut bundle, _) = builder::Builder::new(
        "ipn:243.350".parse().unwrap(),
        "dtn:GS2".parse().unwrap(),
    )
    .with_payload(b"far future".to_vec())
    .build(creation_timestamp::CreationTimestamp::from_parts(
        Some(dtn_time::DtnTime::new(u64::MAX)),
        0,
    ));
    bundle.lifetime = core::time::Duration::from_millis(u64::MAX);

    let parsed = parse::parse_bundle(&serialize::emit_bundle(&bundle)).unwrap();
    assert!(!parsed.has_expired(now));

    // A no-clock bundle with an absurd age saturates the other branch
    let (mut bundle, _) = builder::Builder::new(
        "ipn:243.350".parse().unwrap(),
        "dtn:GS2".parse().unwrap(),
    )
    .add_extension_block(
        block::Type::BundleAge,
        tern_cbor::encode::emit(&u64::MAX).into(),
    )
    .with_payload(b"very old".to_vec())
    .build(creation_timestamp::CreationTimestamp::from_parts(None, 1));
    bundle.lifetime = core::time::Duration::from_millis(u64::MAX);

    let parsed = parse::parse_bundle(&serialize::emit_bundle(&bundle)).unwrap();
    let _ = parsed.expiry_time(now);
    let _ = parsed.has_expired(now);
}

#[test]
fn forwarding_mutators() {
    let mut bundle = parse::parse_bundle(SIMPLE_BUNDLE).unwrap();

    bundle.remove_previous_node();
    assert!(bundle.previous_node().is_none());

    bundle.set_previous_node(&"dtn:GS5".parse().unwrap());
    assert_eq!(bundle.previous_node().unwrap().to_string(), "dtn:GS5");

    bundle.update_age(core::time::Duration::from_millis(250));
    assert_eq!(bundle.age(), Some(core::time::Duration::from_millis(250)));

    bundle.increment_hop_count();
    assert_eq!(bundle.hop_count().unwrap().count, 1);
}
