/*!
Serialization of RFC 5050 bundles to their wire encoding.

When every endpoint reference in the bundle is an `ipn:` EID (or the null
endpoint), the primary block is emitted with CBHE compression (RFC 6260)
and an empty dictionary; otherwise a deduplicated dictionary of
NUL-terminated scheme and SSP strings is built.
*/

use super::*;
use bundle::*;
use tern_bpv7::eid::Eid;

/// Accumulates dictionary strings and hands out (scheme, SSP) offsets.
struct Dictionary {
    data: Vec<u8>,
    cbhe: bool,
}

impl Dictionary {
    /// Builds the dictionary for a bundle, visiting every EID it references.
    fn build(bundle: &Bundle) -> Self {
        let eids = Self::all_eids(bundle);
        let cbhe = eids
            .iter()
            .all(|eid| matches!(eid, Eid::Null | Eid::Ipn { .. }));
        let mut dict = Self {
            data: Vec::new(),
            cbhe,
        };
        if !cbhe {
            for eid in eids {
                let (scheme, ssp) = scheme_of(eid);
                dict.intern(&scheme);
                dict.intern(&ssp);
            }
        }
        dict
    }

    fn all_eids(bundle: &Bundle) -> Vec<&Eid> {
        let mut eids = vec![
            &bundle.destination,
            &bundle.source,
            &bundle.report_to,
            &bundle.custodian,
        ];
        for block in &bundle.blocks {
            eids.extend(block.eid_references.iter());
        }
        eids
    }

    /// Adds a NUL-terminated string if not already present, returning its offset.
    fn intern(&mut self, s: &str) -> u64 {
        let needle = s.as_bytes();
        let mut offset = 0;
        while offset < self.data.len() {
            let end = self.data[offset..]
                .iter()
                .position(|b| *b == 0)
                .map(|p| offset + p)
                .unwrap_or(self.data.len());
            if &self.data[offset..end] == needle {
                return offset as u64;
            }
            offset = end + 1;
        }
        let at = self.data.len() as u64;
        self.data.extend_from_slice(needle);
        self.data.push(0);
        at
    }

    /// The (scheme offset, SSP offset) pair for an EID.
    fn reference(&mut self, eid: &Eid) -> (u64, u64) {
        if self.cbhe {
            return match eid {
                Eid::Null => (0, 0),
                Eid::Ipn {
                    node_number,
                    service_number,
                } => (*node_number, *service_number),
                Eid::Dtn { .. } => unreachable!("dtn EID in CBHE dictionary"),
            };
        }
        let (scheme, ssp) = scheme_of(eid);
        (self.intern(&scheme), self.intern(&ssp))
    }
}

fn scheme_of(eid: &Eid) -> (String, String) {
    let text = eid.to_string();
    match text.split_once(':') {
        Some((scheme, ssp)) => (scheme.to_string(), ssp.to_string()),
        None => ("dtn".to_string(), text),
    }
}

fn emit_eid_ref(out: &mut Vec<u8>, (scheme, ssp): (u64, u64)) {
    sdnv::encode(scheme, out);
    sdnv::encode(ssp, out);
}

fn emit_primary_block(bundle: &Bundle, out: &mut Vec<u8>) {
    let mut dict = Dictionary::build(bundle);

    // Dictionary::build interned every referenced string, so these are lookups
    let dest_ref = dict.reference(&bundle.destination);
    let src_ref = dict.reference(&bundle.source);
    let report_ref = dict.reference(&bundle.report_to);
    let custodian_ref = dict.reference(&bundle.custodian);

    let mut body = Vec::new();
    emit_eid_ref(&mut body, dest_ref);
    emit_eid_ref(&mut body, src_ref);
    emit_eid_ref(&mut body, report_ref);
    emit_eid_ref(&mut body, custodian_ref);
    sdnv::encode(bundle.creation_timestamp, &mut body);
    sdnv::encode(bundle.sequence_number, &mut body);
    sdnv::encode(bundle.lifetime.as_secs(), &mut body);
    sdnv::encode(dict.data.len() as u64, &mut body);
    body.extend_from_slice(&dict.data);
    if let Some(fi) = &bundle.fragment_info {
        sdnv::encode(fi.offset, &mut body);
        sdnv::encode(fi.total_adu_length, &mut body);
    }

    out.push(6);
    sdnv::encode(u64::from(&bundle.flags), out);
    sdnv::encode(body.len() as u64, out);
    out.extend_from_slice(&body);
}

fn emit_block(bundle: &Bundle, block: &Block, out: &mut Vec<u8>) {
    out.push(u64::from(block.block_type) as u8);

    let mut flags = block.flags.clone();
    flags.has_eid_references = !block.eid_references.is_empty();
    sdnv::encode(u64::from(&flags), out);

    if !block.eid_references.is_empty() {
        let mut dict = Dictionary::build(bundle);
        sdnv::encode(block.eid_references.len() as u64, out);
        for eid in &block.eid_references {
            let r = dict.reference(eid);
            emit_eid_ref(out, r);
        }
    }

    sdnv::encode(block.data.len() as u64, out);
    out.extend_from_slice(&block.data);
}

/// Serializes a bundle into a new byte vector.
///
/// The last-block flag is taken from the block list as it stands; call
/// [`Bundle::fix_last_block_flags`] after editing the block list.
pub fn emit_bundle(bundle: &Bundle) -> Vec<u8> {
    let mut out = Vec::new();
    emit_primary_block(bundle, &mut out);
    for block in &bundle.blocks {
        emit_block(bundle, block, &mut out);
    }
    out
}

/// The serialized size of a bundle in bytes.
pub fn serialized_size(bundle: &Bundle) -> usize {
    emit_bundle(bundle).len()
}

/// Serializes a bundle into a writer, one block at a time.
pub fn serialize_into<W>(bundle: &Bundle, writer: &mut W) -> std::io::Result<()>
where
    W: std::io::Write + ?Sized,
{
    for segment in serialize_segments(bundle) {
        writer.write_all(&segment)?;
    }
    Ok(())
}

/// Yields the encoded segments of a bundle lazily: primary block, then each
/// canonical block.  At most one block's encoding is materialized at a time.
pub fn serialize_segments(bundle: &Bundle) -> impl Iterator<Item = Vec<u8>> + '_ {
    core::iter::once_with(|| {
        let mut out = Vec::new();
        emit_primary_block(bundle, &mut out);
        out
    })
    .chain(bundle.blocks.iter().map(|block| {
        let mut out = Vec::new();
        emit_block(bundle, block, &mut out);
        out
    }))
}
