#![cfg(test)]
use super::*;
use bundle::*;

fn test_bundle() -> Bundle {
    let mut bundle = Bundle {
        flags: Flags {
            singleton_destination: true,
            priority: Priority::Normal,
            ..Default::default()
        },
        destination: "dtn:GS2".parse().unwrap(),
        source: "dtn:GS4/source".parse().unwrap(),
        report_to: "dtn:none".parse().unwrap(),
        custodian: "dtn:none".parse().unwrap(),
        creation_timestamp: 658489863,
        sequence_number: 4,
        lifetime: core::time::Duration::from_secs(86400),
        fragment_info: None,
        blocks: vec![
            {
                let mut data = Vec::new();
                sdnv::encode(0, &mut data);
                Block::new(BlockType::Age, data.into())
            },
            Block::new(BlockType::Payload, b"Hello world!".to_vec().into()),
        ],
    };
    bundle.fix_last_block_flags();
    bundle
}

fn ipn_bundle() -> Bundle {
    let mut bundle = test_bundle();
    bundle.destination = "ipn:243.350".parse().unwrap();
    bundle.source = "ipn:1.1".parse().unwrap();
    bundle
}

#[test]
fn round_trip_with_dictionary() {
    let bundle = test_bundle();
    let data = serialize::emit_bundle(&bundle);
    let parsed = parse::parse_bundle(&data).unwrap();
    assert_eq!(parsed, bundle);
    assert_eq!(serialize::serialized_size(&bundle), data.len());
}

#[test]
fn round_trip_with_cbhe() {
    let bundle = ipn_bundle();
    let data = serialize::emit_bundle(&bundle);

    // CBHE compression leaves the dictionary empty: the serialized form
    // must not contain the EID text anywhere
    assert!(!data.windows(3).any(|w| w == b"ipn"));

    let parsed = parse::parse_bundle(&data).unwrap();
    assert_eq!(parsed, bundle);
    assert_eq!(parsed.destination.to_string(), "ipn:243.350");
    assert!(parsed.report_to.is_null());
}

#[test]
fn version_checked() {
    let mut data = serialize::emit_bundle(&test_bundle());
    data[0] = 7;
    assert!(matches!(
        parse::parse_bundle(&data),
        Err(Error::InvalidVersion(7))
    ));
}

#[test]
fn stream_parser_handles_arbitrary_chunks() {
    let mut stream = serialize::emit_bundle(&test_bundle());
    stream.extend(serialize::emit_bundle(&ipn_bundle()));

    for chunk_size in [1, 3, 10, stream.len()] {
        let mut parser = parse::StreamParser::new();
        let mut bundles = Vec::new();
        for chunk in stream.chunks(chunk_size) {
            let mut chunk = chunk;
            while let Some(bundle) = parser.push(chunk).unwrap() {
                bundles.push(bundle);
                chunk = &[];
            }
        }
        assert_eq!(bundles.len(), 2, "chunk size {chunk_size}");
        assert_eq!(bundles[0], test_bundle());
        assert_eq!(bundles[1], ipn_bundle());
        assert!(parser.is_empty());
    }
}

#[test]
fn parser_latches_until_reset() {
    let mut parser = parse::StreamParser::new();
    assert!(matches!(
        parser.push(&[9]),
        Err(Error::InvalidVersion(9))
    ));
    assert!(matches!(parser.push(&[6]), Err(Error::ParserFailed)));
    parser.reset();
    assert!(
        parser
            .push(&serialize::emit_bundle(&test_bundle()))
            .unwrap()
            .is_some()
    );
}

#[test]
fn previous_hop_block() {
    let mut bundle = test_bundle();
    bundle.set_previous_hop(&"dtn:GS4".parse().unwrap());
    assert_eq!(bundle.previous_hop().unwrap().to_string(), "dtn:GS4");

    // The payload block keeps the last-block flag
    assert!(bundle.blocks.last().unwrap().flags.last_block);
    assert_eq!(
        bundle
            .blocks
            .iter()
            .filter(|b| b.flags.last_block)
            .count(),
        1
    );

    let parsed = parse::parse_bundle(&serialize::emit_bundle(&bundle)).unwrap();
    assert_eq!(parsed.previous_hop().unwrap().to_string(), "dtn:GS4");

    bundle.remove_previous_hop();
    assert!(bundle.previous_hop().is_none());
}

#[test]
fn age_update() {
    let mut bundle = test_bundle();
    assert_eq!(bundle.age(), Some(core::time::Duration::ZERO));
    bundle.update_age(core::time::Duration::from_millis(1500));
    assert_eq!(bundle.age(), Some(core::time::Duration::from_millis(1500)));
}

#[test]
fn fragment_totality() {
    let mut bundle = test_bundle();
    let payload: Vec<u8> = (0..250u8).cycle().take(1200).collect();
    if let Some(b) = bundle
        .blocks
        .iter_mut()
        .find(|b| b.block_type == BlockType::Payload)
    {
        b.data = payload.clone().into();
    }

    for first_max in [200, 500, 1100] {
        let (first, rest) = fragment::fragment(&bundle, first_max).unwrap();
        assert!(serialize::serialized_size(&first) <= first_max);
        assert!(first.flags.is_fragment && rest.flags.is_fragment);

        // The Age block replicates into both fragments
        assert!(first.age().is_some());
        assert!(rest.age().is_some());

        let mut combined = first.payload().unwrap().to_vec();
        combined.extend_from_slice(rest.payload().unwrap());
        assert_eq!(combined, payload);

        let reassembled = fragment::reassemble(vec![rest, first]).unwrap();
        assert_eq!(reassembled, bundle);
    }
}

#[test]
fn do_not_fragment_is_honored() {
    let mut bundle = test_bundle();
    bundle.flags.do_not_fragment = true;
    assert!(matches!(
        fragment::fragment(&bundle, 10),
        Err(Error::FragmentForbidden)
    ));
}

#[test]
fn extreme_wire_times_do_not_panic() {
    let now = time::OffsetDateTime::now_utc();

    let mut bundle = test_bundle();
    bundle.creation_timestamp = u64::MAX;
    bundle.lifetime = core::time::Duration::from_secs(u64::MAX);
    let parsed = parse::parse_bundle(&serialize::emit_bundle(&bundle)).unwrap();
    assert!(!parsed.has_expired(now));

    // No clock and an absurd age saturate the other branch
    let mut bundle = test_bundle();
    bundle.creation_timestamp = 0;
    bundle.update_age(core::time::Duration::from_micros(u64::MAX));
    let parsed = parse::parse_bundle(&serialize::emit_bundle(&bundle)).unwrap();
    let _ = parsed.expiry_time(now);
    let _ = parsed.has_expired(now);
}

#[test]
fn truncated_input_needs_more_data() {
    let data = serialize::emit_bundle(&test_bundle());
    for cut in [1, 5, data.len() / 2, data.len() - 1] {
        assert!(matches!(
            parse::parse_bundle(&data[..cut]),
            Err(Error::NeedMoreData(_))
        ));
    }
}
