/*!
Bundle fragmentation and reassembly (RFC 9171 §5.8).

A bundle is split into a first fragment no larger than a caller-supplied
byte budget and a remainder carrying the rest of the payload.  The remainder
may be fragmented again, so a bundle can be spread over any number of
contacts.
*/

use super::*;

/// Returns `true` if a block must appear in every fragment.
///
/// Bundle Age and Hop Count blocks are always carried: each fragment expires
/// and hops on its own.  Other blocks replicate only when flagged.
fn replicate_in_fragments(block: &block::Block) -> bool {
    matches!(
        block.block_type,
        block::Type::BundleAge | block::Type::HopCount
    ) || block.flags.must_replicate
}

/// The serialized size of `bundle` if its payload block held `payload_len` bytes.
fn size_with_payload(bundle: &bundle::Bundle, payload_len: usize) -> usize {
    let mut probe = bundle.clone();
    if let Some(b) = probe
        .blocks
        .iter_mut()
        .find(|b| b.block_type == block::Type::Payload)
    {
        b.data = vec![0; payload_len].into_boxed_slice();
    }
    serialize::serialized_size(&probe)
}

/// Splits `bundle` into a first fragment whose serialized size does not
/// exceed `first_max_bytes`, and a remainder bundle.
///
/// Extension blocks flagged replicate-in-fragments (plus Bundle Age and Hop
/// Count) appear in both halves; all others travel only in the first.  Fails
/// with [`Error::FragmentForbidden`] if the bundle forbids fragmentation, or
/// [`Error::FragmentTooSmall`] if not even one payload byte fits.
pub fn fragment(
    bundle: &bundle::Bundle,
    first_max_bytes: usize,
) -> Result<(bundle::Bundle, bundle::Bundle), Error> {
    if bundle.flags.do_not_fragment {
        return Err(Error::FragmentForbidden);
    }
    let payload = bundle.payload().ok_or(Error::MissingPayload)?;

    // Offset and total ADU length accumulate across re-fragmentation
    let (base_offset, total_adu_length) = match &bundle.id.fragment_info {
        Some(fi) => (fi.offset, fi.total_adu_length),
        None => (0, payload.len() as u64),
    };

    let mut first = bundle.clone();
    first.flags.is_fragment = true;

    if payload.len() < 2 {
        return Err(Error::FragmentTooSmall(first_max_bytes));
    }

    // The CBOR length prefix grows with the payload, so probe for the
    // largest split the budget allows rather than assuming a fixed overhead
    let mut split = (payload.len() - 1).min(first_max_bytes);
    while split > 0 && size_with_payload(&first, split) > first_max_bytes {
        let overhead = size_with_payload(&first, split) - split;
        split = first_max_bytes.saturating_sub(overhead).min(split - 1);
    }
    if split == 0 {
        return Err(Error::FragmentTooSmall(first_max_bytes));
    }

    let mut rest = bundle::Bundle {
        id: bundle::Id {
            source: bundle.id.source.clone(),
            timestamp: bundle.id.timestamp.clone(),
            fragment_info: Some(bundle::FragmentInfo {
                offset: base_offset + split as u64,
                total_adu_length,
            }),
        },
        flags: bundle.flags.clone(),
        crc_type: bundle.crc_type,
        destination: bundle.destination.clone(),
        report_to: bundle.report_to.clone(),
        lifetime: bundle.lifetime,
        blocks: bundle
            .blocks
            .iter()
            .filter(|b| b.block_type == block::Type::Payload || replicate_in_fragments(b))
            .cloned()
            .collect(),
    };
    rest.flags.is_fragment = true;

    first.id.fragment_info = Some(bundle::FragmentInfo {
        offset: base_offset,
        total_adu_length,
    });

    let (first_payload, rest_payload) = payload.split_at(split);
    let (first_payload, rest_payload) = (Box::from(first_payload), Box::from(rest_payload));
    if let Some(b) = first
        .blocks
        .iter_mut()
        .find(|b| b.block_type == block::Type::Payload)
    {
        b.data = first_payload;
    }
    if let Some(b) = rest
        .blocks
        .iter_mut()
        .find(|b| b.block_type == block::Type::Payload)
    {
        b.data = rest_payload;
    }

    Ok((first, rest))
}

/// Reassembles a complete bundle from a set of fragments.
///
/// The fragments must share a source and creation timestamp and cover the
/// whole ADU without gaps; overlap is tolerated.  The result equals the
/// original bundle except that the fragment flag and fragment information
/// are cleared.
pub fn reassemble(mut fragments: Vec<bundle::Bundle>) -> Result<bundle::Bundle, Error> {
    fragments.sort_by_key(|b| {
        b.id.fragment_info
            .as_ref()
            .map(|fi| fi.offset)
            .unwrap_or(0)
    });

    let first = fragments.first().ok_or(Error::IncompleteFragments)?;
    let Some(fi) = &first.id.fragment_info else {
        return Err(Error::IncompleteFragments);
    };
    if fi.offset != 0 {
        return Err(Error::IncompleteFragments);
    }
    let total = fi.total_adu_length;

    let mut adu = Vec::with_capacity(total as usize);
    for fragment in &fragments {
        let Some(fi) = &fragment.id.fragment_info else {
            return Err(Error::IncompleteFragments);
        };
        if !fragment.id.source.eq(&first.id.source)
            || fragment.id.timestamp != first.id.timestamp
            || fi.total_adu_length != total
        {
            return Err(Error::IncompleteFragments);
        }
        let payload = fragment.payload().ok_or(Error::MissingPayload)?;
        let offset = fi.offset as usize;
        if offset > adu.len() {
            // Gap in coverage
            return Err(Error::IncompleteFragments);
        }
        if offset + payload.len() > adu.len() {
            adu.extend_from_slice(&payload[adu.len() - offset..]);
        }
    }
    if adu.len() as u64 != total {
        return Err(Error::IncompleteFragments);
    }

    let mut bundle = fragments.swap_remove(0);
    bundle.flags.is_fragment = false;
    bundle.id.fragment_info = None;
    if let Some(b) = bundle
        .blocks
        .iter_mut()
        .find(|b| b.block_type == block::Type::Payload)
    {
        b.data = adu.into_boxed_slice();
    }
    Ok(bundle)
}
