/*!
Bundle fragmentation and reassembly for v6 bundles (RFC 5050 §5.8).

Extension blocks placed before the payload travel with the first fragment,
blocks after the payload with the last; blocks flagged
replicate-in-every-fragment (and the Age block) travel with both.
*/

use super::*;
use bundle::*;

fn replicate_in_fragments(block: &Block) -> bool {
    matches!(block.block_type, BlockType::Age) || block.flags.must_replicate
}

fn size_with_payload(bundle: &Bundle, payload_len: usize) -> usize {
    let mut probe = bundle.clone();
    if let Some(b) = probe
        .blocks
        .iter_mut()
        .find(|b| b.block_type == BlockType::Payload)
    {
        b.data = vec![0; payload_len].into_boxed_slice();
    }
    serialize::serialized_size(&probe)
}

/// Splits `bundle` into a first fragment whose serialized size does not
/// exceed `first_max_bytes`, and a remainder bundle.
pub fn fragment(bundle: &Bundle, first_max_bytes: usize) -> Result<(Bundle, Bundle), Error> {
    if bundle.flags.do_not_fragment {
        return Err(Error::FragmentForbidden);
    }
    let payload_index = bundle
        .blocks
        .iter()
        .position(|b| b.block_type == BlockType::Payload)
        .ok_or(Error::MissingPayload)?;
    let payload = &bundle.blocks[payload_index].data;

    let (base_offset, total_adu_length) = match &bundle.fragment_info {
        Some(fi) => (fi.offset, fi.total_adu_length),
        None => (0, payload.len() as u64),
    };

    if payload.len() < 2 {
        return Err(Error::FragmentTooSmall(first_max_bytes));
    }

    // First fragment: payload plus every block at or before it, and any
    // replicated block after it
    let mut first = bundle.clone();
    first.flags.is_fragment = true;
    first.blocks = bundle
        .blocks
        .iter()
        .enumerate()
        .filter(|(i, b)| *i <= payload_index || replicate_in_fragments(b))
        .map(|(_, b)| b.clone())
        .collect();
    first.fragment_info = Some(FragmentInfo {
        offset: base_offset,
        total_adu_length,
    });
    first.fix_last_block_flags();

    let mut split = (payload.len() - 1).min(first_max_bytes);
    while split > 0 && size_with_payload(&first, split) > first_max_bytes {
        let overhead = size_with_payload(&first, split) - split;
        split = first_max_bytes.saturating_sub(overhead).min(split - 1);
    }
    if split == 0 {
        return Err(Error::FragmentTooSmall(first_max_bytes));
    }

    // Remainder: payload plus every block at or after it, and any
    // replicated block before it
    let mut rest = bundle.clone();
    rest.flags.is_fragment = true;
    rest.blocks = bundle
        .blocks
        .iter()
        .enumerate()
        .filter(|(i, b)| *i >= payload_index || replicate_in_fragments(b))
        .map(|(_, b)| b.clone())
        .collect();
    rest.fragment_info = Some(FragmentInfo {
        offset: base_offset + split as u64,
        total_adu_length,
    });
    rest.fix_last_block_flags();

    let (first_payload, rest_payload) = payload.split_at(split);
    let (first_payload, rest_payload) = (Box::from(first_payload), Box::from(rest_payload));
    if let Some(b) = first
        .blocks
        .iter_mut()
        .find(|b| b.block_type == BlockType::Payload)
    {
        b.data = first_payload;
    }
    if let Some(b) = rest
        .blocks
        .iter_mut()
        .find(|b| b.block_type == BlockType::Payload)
    {
        b.data = rest_payload;
    }

    Ok((first, rest))
}

/// Reassembles a complete bundle from a set of fragments.
pub fn reassemble(mut fragments: Vec<Bundle>) -> Result<Bundle, Error> {
    fragments.sort_by_key(|b| b.fragment_info.as_ref().map(|fi| fi.offset).unwrap_or(0));

    let first = fragments.first().ok_or(Error::MissingPayload)?;
    let Some(fi) = &first.fragment_info else {
        return Err(Error::InvalidFragmentInfo(0, 0));
    };
    if fi.offset != 0 {
        return Err(Error::InvalidFragmentInfo(fi.offset, fi.total_adu_length));
    }
    let total = fi.total_adu_length;

    let mut adu = Vec::with_capacity(total as usize);
    for fragment in &fragments {
        let Some(fi) = &fragment.fragment_info else {
            return Err(Error::InvalidFragmentInfo(0, total));
        };
        if fragment.source != first.source
            || fragment.creation_timestamp != first.creation_timestamp
            || fragment.sequence_number != first.sequence_number
            || fi.total_adu_length != total
        {
            return Err(Error::InvalidFragmentInfo(fi.offset, fi.total_adu_length));
        }
        let payload = fragment.payload().ok_or(Error::MissingPayload)?;
        let offset = fi.offset as usize;
        if offset > adu.len() {
            return Err(Error::InvalidFragmentInfo(fi.offset, total));
        }
        if offset + payload.len() > adu.len() {
            adu.extend_from_slice(&payload[adu.len() - offset..]);
        }
    }
    if adu.len() as u64 != total {
        return Err(Error::InvalidFragmentInfo(adu.len() as u64, total));
    }

    // Blocks before the payload come from the first fragment, blocks after
    // it from the last
    let Some(last) = fragments.last() else {
        return Err(Error::MissingPayload);
    };
    let first = &fragments[0];
    let mut blocks: Vec<Block> = Vec::new();
    for b in &first.blocks {
        blocks.push(b.clone());
        if b.block_type == BlockType::Payload {
            break;
        }
    }
    let last_payload_index = last
        .blocks
        .iter()
        .position(|b| b.block_type == BlockType::Payload)
        .ok_or(Error::MissingPayload)?;
    blocks.extend(last.blocks[last_payload_index + 1..].iter().cloned());

    let mut bundle = fragments[0].clone();
    bundle.flags.is_fragment = false;
    bundle.fragment_info = None;
    bundle.blocks = blocks;
    if let Some(b) = bundle
        .blocks
        .iter_mut()
        .find(|b| b.block_type == BlockType::Payload)
    {
        b.data = adu.into_boxed_slice();
    }
    bundle.fix_last_block_flags();
    Ok(bundle)
}
