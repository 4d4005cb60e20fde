/*!
Parsing of RFC 5050 bundles from their wire encoding.

[`parse_bundle`] decodes a bundle from a complete byte slice; [`StreamParser`]
consumes byte buffers of arbitrary size as they arrive from a convergence
layer, emitting one bundle at a time.
*/

use super::*;
use bundle::*;
use tern_bpv7::eid::Eid;

/// A cursor over a byte slice with SDNV-aware reads.
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        let Some(b) = self.data.get(self.offset) else {
            return Err(Error::NeedMoreData(1));
        };
        self.offset += 1;
        Ok(*b)
    }

    fn read_sdnv(&mut self) -> Result<u64, Error> {
        let (value, len) = sdnv::decode(&self.data[self.offset..])?;
        self.offset += len;
        Ok(value)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.data.len() - self.offset < len {
            return Err(Error::NeedMoreData(len - (self.data.len() - self.offset)));
        }
        let r = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(r)
    }
}

/// A (scheme offset, SSP offset) pair referencing the dictionary.
type EidRef = (u64, u64);

/// Resolves a dictionary reference to an EID.
///
/// An empty dictionary signals CBHE compression (RFC 6260): the offsets are
/// the ipn node and service numbers, with node zero denoting the null
/// endpoint.
fn resolve_eid(dictionary: &[u8], (scheme_offset, ssp_offset): EidRef) -> Result<Eid, Error> {
    if dictionary.is_empty() {
        if scheme_offset == 0 && ssp_offset == 0 {
            return Ok(Eid::Null);
        }
        return Ok(Eid::Ipn {
            node_number: scheme_offset,
            service_number: ssp_offset,
        });
    }

    let read_cstr = |offset: u64| -> Result<&str, Error> {
        let start = offset as usize;
        if start >= dictionary.len() {
            return Err(Error::InvalidDictionaryReference(offset));
        }
        let end = dictionary[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or(Error::MalformedDictionary)?;
        core::str::from_utf8(&dictionary[start..start + end])
            .map_err(|_| Error::MalformedDictionary)
    };

    let scheme = read_cstr(scheme_offset)?;
    let ssp = read_cstr(ssp_offset)?;
    format!("{scheme}:{ssp}").parse().map_err(Error::InvalidEid)
}

fn parse_primary(reader: &mut Reader) -> Result<Bundle, Error> {
    let flags = Flags::from(reader.read_sdnv()?);
    let block_length = reader.read_sdnv()? as usize;

    let mut body = Reader::new(reader.read_bytes(block_length)?);

    let dest_ref = (body.read_sdnv()?, body.read_sdnv()?);
    let src_ref = (body.read_sdnv()?, body.read_sdnv()?);
    let report_ref = (body.read_sdnv()?, body.read_sdnv()?);
    let custodian_ref = (body.read_sdnv()?, body.read_sdnv()?);

    let creation_timestamp = body.read_sdnv()?;
    let sequence_number = body.read_sdnv()?;
    let lifetime = core::time::Duration::from_secs(body.read_sdnv()?);

    let dict_len = body.read_sdnv()? as usize;
    let dictionary = body.read_bytes(dict_len)?;

    let fragment_info = if flags.is_fragment {
        let offset = body.read_sdnv()?;
        let total_adu_length = body.read_sdnv()?;
        if offset >= total_adu_length {
            return Err(Error::InvalidFragmentInfo(offset, total_adu_length));
        }
        Some(FragmentInfo {
            offset,
            total_adu_length,
        })
    } else {
        None
    };

    // Errors within a length-delimited body are corruption, not truncation
    if body.offset != body.data.len() {
        return Err(Error::PrimaryLengthMismatch);
    }

    Ok(Bundle {
        flags,
        destination: resolve_eid(dictionary, dest_ref)?,
        source: resolve_eid(dictionary, src_ref)?,
        report_to: resolve_eid(dictionary, report_ref)?,
        custodian: resolve_eid(dictionary, custodian_ref)?,
        creation_timestamp,
        sequence_number,
        lifetime,
        fragment_info,
        blocks: Vec::new(),
    })
}

/// Parses one canonical block; the dictionary is needed for EID references.
fn parse_block(reader: &mut Reader, dictionary: &[u8]) -> Result<Block, Error> {
    let block_type = BlockType::from(reader.read_u8()? as u64);
    let flags = BlockFlags::from(reader.read_sdnv()?);

    let mut eid_references = Vec::new();
    if flags.has_eid_references {
        let count = reader.read_sdnv()?;
        for _ in 0..count {
            let eid_ref = (reader.read_sdnv()?, reader.read_sdnv()?);
            eid_references.push(resolve_eid(dictionary, eid_ref)?);
        }
    }

    let data_len = reader.read_sdnv()? as usize;
    let data = reader.read_bytes(data_len)?.into();

    Ok(Block {
        block_type,
        flags,
        eid_references,
        data,
    })
}

fn complete_bundle(bundle: Bundle) -> Result<Bundle, Error> {
    if bundle.payload().is_none() {
        return Err(Error::MissingPayload);
    }
    if let Some(fi) = &bundle.fragment_info {
        let payload_len = bundle.payload().map(<[u8]>::len).unwrap_or(0) as u64;
        if fi.offset + payload_len > fi.total_adu_length {
            return Err(Error::InvalidFragmentInfo(fi.offset, fi.total_adu_length));
        }
    }
    Ok(bundle)
}

/// Parses a single v6 bundle from a complete byte slice.
///
/// The entire slice must be consumed; trailing data is an error.
pub fn parse_bundle(data: &[u8]) -> Result<Bundle, Error> {
    let mut parser = StreamParser::new();
    let Some(bundle) = parser.push(data)? else {
        return Err(Error::NeedMoreData(1));
    };
    if !parser.is_empty() {
        return Err(Error::AdditionalData);
    }
    Ok(bundle)
}

enum State {
    /// Waiting for the version byte.
    Start,
    /// Waiting for the complete primary block.  The dictionary is retained
    /// for resolving block EID references.
    Primary,
    /// Waiting for the next canonical block.
    Blocks {
        bundle: Bundle,
        dictionary: Box<[u8]>,
    },
    /// A parse error has been latched; only [`StreamParser::reset`] exits.
    Error,
}

/// An incremental parser for a stream of v6 bundles.
///
/// Mirrors the v7 [`StreamParser`](tern_bpv7::parse::StreamParser): callers
/// push byte buffers of arbitrary size, the parser emits one bundle at a
/// time and latches on error until [`reset`](StreamParser::reset).
pub struct StreamParser {
    state: State,
    buffer: Vec<u8>,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    /// Creates a new parser at the start of a bundle stream.
    pub fn new() -> Self {
        Self {
            state: State::Start,
            buffer: Vec::new(),
        }
    }

    /// Discards all state and buffered data, ready for a fresh stream.
    pub fn reset(&mut self) {
        self.state = State::Start;
        self.buffer.clear();
    }

    /// Returns `true` if no unconsumed bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends `data` to the parse buffer and attempts to extract a bundle.
    pub fn push(&mut self, data: &[u8]) -> Result<Option<Bundle>, Error> {
        if let State::Error = self.state {
            return Err(Error::ParserFailed);
        }
        self.buffer.extend_from_slice(data);

        match self.advance() {
            Ok(r) => Ok(r),
            Err(e) => {
                self.state = State::Error;
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<Option<Bundle>, Error> {
        let mut read = 0;
        loop {
            match &mut self.state {
                State::Start => {
                    let Some(version) = self.buffer.get(read) else {
                        break;
                    };
                    if *version != 6 {
                        return Err(Error::InvalidVersion(*version as u64));
                    }
                    read += 1;
                    self.state = State::Primary;
                }
                State::Primary => {
                    let mut reader = Reader::new(&self.buffer[read..]);
                    let bundle = match parse_primary(&mut reader) {
                        Ok(bundle) => bundle,
                        Err(Error::NeedMoreData(_)) => break,
                        Err(e) => return Err(e),
                    };
                    // Re-extract the dictionary for block EID references
                    let dictionary = extract_dictionary(&self.buffer[read..])?;
                    read += reader.offset;
                    self.state = State::Blocks { bundle, dictionary };
                }
                State::Blocks { bundle, dictionary } => {
                    let mut reader = Reader::new(&self.buffer[read..]);
                    let block = match parse_block(&mut reader, dictionary) {
                        Ok(block) => block,
                        Err(Error::NeedMoreData(_)) => break,
                        Err(e) => return Err(e),
                    };
                    read += reader.offset;
                    let last = block.flags.last_block;
                    bundle.blocks.push(block);
                    if last {
                        let State::Blocks { bundle, .. } =
                            core::mem::replace(&mut self.state, State::Start)
                        else {
                            unreachable!()
                        };
                        self.buffer.drain(..read);
                        return complete_bundle(bundle).map(Some);
                    }
                }
                State::Error => unreachable!(),
            }
        }

        self.buffer.drain(..read);
        Ok(None)
    }
}

/// Re-reads the dictionary bytes out of a complete primary block.
fn extract_dictionary(data: &[u8]) -> Result<Box<[u8]>, Error> {
    let mut reader = Reader::new(data);
    reader.read_sdnv()?; // processing flags
    let block_length = reader.read_sdnv()? as usize;
    let mut body = Reader::new(reader.read_bytes(block_length)?);
    for _ in 0..8 {
        body.read_sdnv()?; // EID references
    }
    body.read_sdnv()?; // creation timestamp
    body.read_sdnv()?; // sequence number
    body.read_sdnv()?; // lifetime
    let dict_len = body.read_sdnv()? as usize;
    Ok(body.read_bytes(dict_len)?.into())
}
