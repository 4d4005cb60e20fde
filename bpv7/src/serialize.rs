/*!
Serialization of BPv7 bundles to their wire encoding.

Serialization is deterministic: the bytes produced for a bundle are
byte-identical across invocations, modulo an explicit age update between
them.  The streaming form buffers at most one block at a time, so arbitrarily
large payloads can be fed to a slow link without a full copy of the encoded
bundle in memory.
*/

use super::*;
use tern_cbor as cbor;

fn emit_primary_block(bundle: &bundle::Bundle) -> Vec<u8> {
    let count = match (&bundle.id.fragment_info, bundle.crc_type) {
        (None, crc::CrcType::None) => 8,
        (None, _) => 9,
        (Some(_), crc::CrcType::None) => 10,
        (Some(_), _) => 11,
    };
    crc::append_crc_value(
        bundle.crc_type,
        cbor::encode::emit_array(Some(count), |a| {
            a.emit(&7u64);
            a.emit(&bundle.flags);
            a.emit(&bundle.crc_type);
            a.emit(&bundle.destination);
            a.emit(&bundle.id.source);
            a.emit(&bundle.report_to);
            a.emit(&bundle.id.timestamp);
            a.emit(&(bundle.lifetime.as_millis() as u64));
            if let Some(fi) = &bundle.id.fragment_info {
                a.emit(&fi.offset);
                a.emit(&fi.total_adu_length);
            }
            if !matches!(bundle.crc_type, crc::CrcType::None) {
                a.skip_value();
            }
        }),
    )
}

/// Serializes a bundle into a new byte vector.
pub fn emit_bundle(bundle: &bundle::Bundle) -> Vec<u8> {
    let mut data = vec![0x9F];
    data.extend(emit_primary_block(bundle));
    for block in &bundle.blocks {
        data.extend(block.emit());
    }
    data.push(0xFF);
    data
}

/// The serialized size of a bundle in bytes.
pub fn serialized_size(bundle: &bundle::Bundle) -> usize {
    // Framing byte, primary, blocks, break byte
    2 + emit_primary_block(bundle).len()
        + bundle.blocks.iter().map(block::Block::emitted_size).sum::<usize>()
}

/// Serializes a bundle into a writer, one block at a time.
pub fn serialize_into<W>(bundle: &bundle::Bundle, writer: &mut W) -> std::io::Result<()>
where
    W: std::io::Write + ?Sized,
{
    for segment in serialize_segments(bundle) {
        writer.write_all(&segment)?;
    }
    Ok(())
}

/// Yields the encoded segments of a bundle lazily: framing, primary block,
/// each canonical block, terminator.  At most one block's encoding is
/// materialized at a time, so huge payloads can be streamed to a slow link.
pub fn serialize_segments(
    bundle: &bundle::Bundle,
) -> impl Iterator<Item = Vec<u8>> + '_ {
    core::iter::once_with(|| vec![0x9F])
        .chain(core::iter::once_with(|| emit_primary_block(bundle)))
        .chain(bundle.blocks.iter().map(block::Block::emit))
        .chain(core::iter::once_with(|| vec![0xFF]))
}
