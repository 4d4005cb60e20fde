/*!
The canonical block: the typed unit from which bundles are assembled.
Defines block type codes, block processing control flags and the owned
in-memory `Block` representation.
*/

use super::*;
use error::CaptureFieldErr;
use tern_cbor as cbor;

/// The processing control flags of a canonical block (RFC 9171 §4.2.4).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    /// The block must be replicated in every fragment of the bundle.
    pub must_replicate: bool,
    /// A status report should be generated if block processing fails.
    pub report_on_failure: bool,
    /// The entire bundle should be deleted if block processing fails.
    pub delete_bundle_on_failure: bool,
    /// This block should be discarded if its processing fails.
    pub delete_block_on_failure: bool,
    /// A bitmask of any unrecognized flags encountered during parsing.
    pub unrecognised: Option<u64>,
}

impl From<&Flags> for u64 {
    fn from(value: &Flags) -> Self {
        let mut flags = value.unrecognised.unwrap_or_default();
        if value.must_replicate {
            flags |= 1 << 0;
        }
        if value.report_on_failure {
            flags |= 1 << 1;
        }
        if value.delete_bundle_on_failure {
            flags |= 1 << 2;
        }
        if value.delete_block_on_failure {
            flags |= 1 << 4;
        }
        flags
    }
}

impl From<u64> for Flags {
    fn from(value: u64) -> Self {
        let mut flags = Self {
            must_replicate: value & (1 << 0) != 0,
            report_on_failure: value & (1 << 1) != 0,
            delete_bundle_on_failure: value & (1 << 2) != 0,
            delete_block_on_failure: value & (1 << 4) != 0,
            unrecognised: None,
        };
        let unrecognised = value & !0b10111;
        if unrecognised != 0 {
            flags.unrecognised = Some(unrecognised);
        }
        flags
    }
}

impl cbor::encode::ToCbor for Flags {
    type Result = ();

    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) -> Self::Result {
        encoder.emit(&u64::from(self))
    }
}

impl cbor::decode::FromCbor for Flags {
    type Error = cbor::decode::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        u64::from_cbor(data).map(|(value, len)| (value.into(), len))
    }
}

/// The type of a BPv7 block (RFC 9171 §4.3).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Payload Block (type code 1).
    Payload,
    /// Previous Node Block (type code 6).
    PreviousNode,
    /// Bundle Age Block (type code 7).
    BundleAge,
    /// Hop Count Block (type code 10).
    HopCount,
    /// An unrecognized block type.
    Unrecognised(u64),
}

impl From<Type> for u64 {
    fn from(value: Type) -> Self {
        match value {
            Type::Payload => 1,
            Type::PreviousNode => 6,
            Type::BundleAge => 7,
            Type::HopCount => 10,
            Type::Unrecognised(v) => v,
        }
    }
}

impl From<u64> for Type {
    fn from(value: u64) -> Self {
        match value {
            1 => Type::Payload,
            6 => Type::PreviousNode,
            7 => Type::BundleAge,
            10 => Type::HopCount,
            value => Type::Unrecognised(value),
        }
    }
}

impl cbor::encode::ToCbor for Type {
    type Result = ();

    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) -> Self::Result {
        encoder.emit(&u64::from(*self))
    }
}

impl cbor::decode::FromCbor for Type {
    type Error = cbor::decode::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        u64::from_cbor(data).map(|(value, len)| (value.into(), len))
    }
}

/// A canonical block of a bundle.
///
/// The block-type-specific data is owned by the block; it is moved into the
/// bundle at parse time and moved out again at fragmentation or delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The type of the block.
    pub block_type: Type,
    /// The block number.  The payload block is always number 1.
    pub number: u64,
    /// The block-specific processing control flags.
    pub flags: Flags,
    /// The type of CRC protecting this block.
    pub crc_type: crc::CrcType,
    /// The block-type-specific data bytes.
    pub data: Box<[u8]>,
}

impl Block {
    /// Constructs a new block with no flags and no CRC.
    pub fn new(block_type: Type, number: u64, data: Box<[u8]>) -> Self {
        Self {
            block_type,
            number,
            flags: Flags::default(),
            crc_type: crc::CrcType::None,
            data,
        }
    }

    /// The canonical serialized encoding of the block, CRC included.
    pub fn emit(&self) -> Vec<u8> {
        crc::append_crc_value(
            self.crc_type,
            cbor::encode::emit_array(
                Some(if let crc::CrcType::None = self.crc_type {
                    5
                } else {
                    6
                }),
                |a| {
                    a.emit(&self.block_type);
                    a.emit(&self.number);
                    a.emit(&self.flags);
                    a.emit(&self.crc_type);
                    a.emit(&cbor::encode::Bytes(&self.data));
                    if !matches!(self.crc_type, crc::CrcType::None) {
                        a.skip_value();
                    }
                },
            ),
        )
    }

    /// The serialized size of the block in bytes.
    pub fn emitted_size(&self) -> usize {
        self.emit().len()
    }
}

impl cbor::decode::FromCbor for Block {
    type Error = Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        cbor::decode::parse_array(data, |arr, _| {
            let block_type: Type = arr.parse().map_field_err("block type code")?;

            let number = arr.parse::<u64>().map_field_err("block number")?;
            match (number, block_type) {
                // Some senders still number the payload block 0, tolerate it
                (0 | 1, Type::Payload) => {}
                (0 | 1, _) | (_, Type::Payload) => {
                    return Err(Error::InvalidBlockNumber(number, block_type));
                }
                _ => {}
            }

            let flags = arr
                .parse()
                .map_field_err("block processing control flags")?;

            let crc_type = arr.parse().map_field_err("CRC type")?;

            let payload_start = arr.offset();
            let block_data = arr
                .parse_value(|value, tags| match value {
                    // Appendix B of RFC 9171 permits a single tag 24
                    cbor::decode::Value::Bytes(r) if tags.is_empty() || matches!(tags, [24]) => {
                        Ok(data[payload_start + r.start..payload_start + r.end].into())
                    }
                    cbor::decode::Value::ByteStream(ranges) => Ok(ranges
                        .into_iter()
                        .fold(Vec::new(), |mut acc, r| {
                            acc.extend_from_slice(
                                &data[payload_start + r.start..payload_start + r.end],
                            );
                            acc
                        })
                        .into_boxed_slice()),
                    value => Err(Error::InvalidCbor(cbor::decode::Error::IncorrectType(
                        "Byte String".to_string(),
                        value.type_name(!tags.is_empty()),
                    ))),
                })?
                .0;

            crc::parse_crc_value(data, arr, crc_type)?;

            Ok::<_, Error>(Block {
                block_type,
                number,
                flags,
                crc_type,
                data: block_data,
            })
        })
    }
}
