/*!
Parsing of BPv7 bundles from their wire encoding.

Two entry points are provided: [`parse_bundle`] decodes a bundle from a
complete byte slice, and [`StreamParser`] consumes byte buffers of arbitrary
size as they arrive from a convergence layer, emitting one bundle at a time.
*/

use super::*;
use error::CaptureFieldErr;
use tern_cbor as cbor;

const MAX_SKIP_RECURSION: usize = 16;

/// The decoded fields of a primary block.
pub(crate) struct PrimaryBlock {
    pub flags: bundle::Flags,
    pub crc_type: crc::CrcType,
    pub destination: eid::Eid,
    pub source: eid::Eid,
    pub report_to: eid::Eid,
    pub timestamp: creation_timestamp::CreationTimestamp,
    pub lifetime: core::time::Duration,
    pub fragment_info: Option<bundle::FragmentInfo>,
}

impl cbor::decode::FromCbor for PrimaryBlock {
    type Error = Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        cbor::decode::parse_array(data, |block, _| {
            let version = block.parse::<u64>().map_field_err("protocol version")?;
            if version != 7 {
                return Err(Error::InvalidVersion(version));
            }

            let flags: bundle::Flags = block
                .parse()
                .map_field_err("bundle processing control flags")?;

            let crc_type = block.parse().map_field_err("CRC type")?;

            let destination = block.parse().map_field_err("destination EID")?;
            let source = block.parse().map_field_err("source EID")?;
            let report_to = block.parse().map_field_err("report-to EID")?;

            let timestamp = block.parse().map_field_err("creation timestamp")?;

            let lifetime = block
                .parse::<u64>()
                .map_field_err("lifetime")
                .map(core::time::Duration::from_millis)?;

            let fragment_info = if flags.is_fragment {
                let offset = block.parse().map_field_err("fragment offset")?;
                let total_adu_length = block
                    .parse()
                    .map_field_err("total application data unit length")?;
                if offset >= total_adu_length {
                    return Err(Error::InvalidFragmentInfo(offset, total_adu_length));
                }
                Some(bundle::FragmentInfo {
                    offset,
                    total_adu_length,
                })
            } else {
                None
            };

            crc::parse_crc_value(data, block, crc_type)?;

            Ok::<_, Error>(PrimaryBlock {
                flags,
                crc_type,
                destination,
                source,
                report_to,
                timestamp,
                lifetime,
                fragment_info,
            })
        })
    }
}

fn add_block(bundle: &mut bundle::Bundle, block: block::Block) -> Result<(), Error> {
    if bundle
        .blocks
        .iter()
        .any(|b| b.block_type == block::Type::Payload)
    {
        // Nothing may follow the payload block
        return Err(Error::PayloadNotFinal);
    }
    if bundle.blocks.iter().any(|b| b.number == block.number) {
        return Err(Error::DuplicateBlockNumber(block.number));
    }
    if !matches!(block.block_type, block::Type::Unrecognised(_))
        && bundle
            .blocks
            .iter()
            .any(|b| b.block_type == block.block_type)
    {
        return Err(Error::DuplicateBlocks(block.block_type));
    }
    bundle.blocks.push(block);
    Ok(())
}

fn complete_bundle(mut bundle: bundle::Bundle) -> Result<bundle::Bundle, Error> {
    match bundle.blocks.last() {
        Some(b) if b.block_type == block::Type::Payload => {}
        Some(_) | None => return Err(Error::MissingPayload),
    }

    if let Some(fi) = &bundle.id.fragment_info {
        let payload_len = bundle.payload().map(<[u8]>::len).unwrap_or(0) as u64;
        if fi.offset + payload_len > fi.total_adu_length {
            return Err(Error::InvalidFragmentInfo(fi.offset, fi.total_adu_length));
        }
    }

    bundle.blocks.shrink_to_fit();
    Ok(bundle)
}

fn bundle_from_primary(primary: PrimaryBlock) -> bundle::Bundle {
    bundle::Bundle {
        id: bundle::Id {
            source: primary.source,
            timestamp: primary.timestamp,
            fragment_info: primary.fragment_info,
        },
        flags: primary.flags,
        crc_type: primary.crc_type,
        destination: primary.destination,
        report_to: primary.report_to,
        lifetime: primary.lifetime,
        blocks: Vec::new(),
    }
}

/// Parses a single bundle from a complete byte slice.
///
/// The entire slice must be consumed; trailing data is an error.
pub fn parse_bundle(data: &[u8]) -> Result<bundle::Bundle, Error> {
    let mut parser = StreamParser::new();
    let Some(bundle) = parser.push(data)? else {
        return Err(cbor::decode::Error::NeedMoreData(1).into());
    };
    if !parser.is_empty() {
        return Err(Error::AdditionalData);
    }
    Ok(bundle)
}

enum State {
    /// Waiting for the indefinite-length array marker.
    Start,
    /// Waiting for the complete primary block.
    Primary,
    /// Waiting for the next canonical block or the terminal break byte.
    Blocks(bundle::Bundle),
    /// A parse error has been latched; only [`StreamParser::reset`] exits.
    Error,
}

/// An incremental parser for a stream of BPv7 bundles.
///
/// Callers push byte buffers of arbitrary size as they arrive; the parser
/// emits one bundle at a time and is restartable after each.  Any violation
/// of the bundle grammar latches the error state until [`reset`] is called.
///
/// [`reset`]: StreamParser::reset
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
    ///
    /// Returns `Ok(Some(bundle))` as soon as a complete bundle has been
    /// parsed; any bytes beyond it remain buffered for the next bundle, and
    /// can be drained by further calls with an empty slice.  Returns
    /// `Ok(None)` if more data is needed.  On error the parser latches and
    /// all subsequent calls fail with [`Error::ParserFailed`] until
    /// [`reset`](StreamParser::reset).
    pub fn push(&mut self, data: &[u8]) -> Result<Option<bundle::Bundle>, Error> {
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

    fn advance(&mut self) -> Result<Option<bundle::Bundle>, Error> {
        let mut read = 0;
        loop {
            match &mut self.state {
                State::Start => {
                    let Some(marker) = self.buffer.get(read) else {
                        break;
                    };
                    if *marker != 0x9F {
                        return Err(Error::InvalidFraming);
                    }
                    read += 1;
                    self.state = State::Primary;
                }
                State::Primary => {
                    let Some(len) = try_complete_item(&self.buffer[read..])? else {
                        break;
                    };
                    let primary =
                        cbor::decode::parse::<PrimaryBlock>(&self.buffer[read..read + len])?;
                    read += len;
                    self.state = State::Blocks(bundle_from_primary(primary));
                }
                State::Blocks(bundle) => {
                    let Some(marker) = self.buffer.get(read) else {
                        break;
                    };
                    if *marker == 0xFF {
                        read += 1;
                        let State::Blocks(bundle) =
                            core::mem::replace(&mut self.state, State::Start)
                        else {
                            unreachable!()
                        };
                        self.buffer.drain(..read);
                        return complete_bundle(bundle).map(Some);
                    }

                    let Some(len) = try_complete_item(&self.buffer[read..])? else {
                        break;
                    };
                    let block =
                        cbor::decode::parse::<block::Block>(&self.buffer[read..read + len])?;
                    read += len;
                    add_block(bundle, block)?;
                }
                State::Error => unreachable!(),
            }
        }

        self.buffer.drain(..read);
        Ok(None)
    }
}

/// Checks whether the buffer starts with a complete CBOR item, returning its
/// length if so, or `None` if more data is needed.
fn try_complete_item(data: &[u8]) -> Result<Option<usize>, Error> {
    if data.is_empty() {
        return Ok(None);
    }
    match cbor::decode::parse_value(data, |mut value, _| value.skip(MAX_SKIP_RECURSION)) {
        Ok(((), len)) => Ok(Some(len)),
        Err(cbor::decode::Error::NeedMoreData(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
