/*!
CRC handling for bundle blocks, as specified in RFC 9171.  Supports CRC-16
(X.25) and CRC-32C (Castagnoli), computed over a block's canonical encoding
with the CRC field zeroed.
*/

use super::*;
use tern_cbor as cbor;
use thiserror::Error;

const X25: ::crc::Crc<u16> = ::crc::Crc::<u16>::new(&::crc::CRC_16_IBM_SDLC);
const CASTAGNOLI: ::crc::Crc<u32> = ::crc::Crc::<u32>::new(&::crc::CRC_32_ISCSI);

/// Errors that can occur during CRC processing.
#[derive(Error, Debug)]
pub enum CrcError {
    /// An invalid or unsupported CRC type was specified.
    #[error("Invalid CRC Type {0}")]
    InvalidType(u64),

    /// The CRC value in a block has an unexpected length.
    #[error("Block has unexpected CRC value length {0}")]
    InvalidLength(usize),

    /// A block has a CRC value but declares no CRC type.
    #[error("Block has a CRC value with no CRC type specified")]
    UnexpectedCrcValue,

    /// The calculated CRC value does not match the one in the block.
    #[error("Incorrect CRC value")]
    IncorrectCrc,

    /// A CRC value was expected but not found.
    #[error("Missing CRC value")]
    MissingCrc,

    /// An error occurred during CBOR decoding.
    #[error(transparent)]
    InvalidCbor(#[from] cbor::decode::Error),
}

/// The type of CRC protecting a bundle block.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum CrcType {
    /// No CRC is used.
    #[default]
    None,
    /// CRC-16/X-25, seeded 0xFFFF, no final XOR.
    Crc16X25,
    /// CRC-32/Castagnoli, seeded and final-XORed 0xFFFFFFFF, reflected.
    Crc32Castagnoli,
}

impl TryFrom<u64> for CrcType {
    type Error = CrcError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Crc16X25),
            2 => Ok(Self::Crc32Castagnoli),
            v => Err(CrcError::InvalidType(v)),
        }
    }
}

impl From<CrcType> for u64 {
    fn from(value: CrcType) -> Self {
        match value {
            CrcType::None => 0,
            CrcType::Crc16X25 => 1,
            CrcType::Crc32Castagnoli => 2,
        }
    }
}

impl cbor::encode::ToCbor for CrcType {
    type Result = ();

    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) -> Self::Result {
        encoder.emit(&u64::from(*self))
    }
}

impl cbor::decode::FromCbor for CrcType {
    type Error = CrcError;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        let (v, len) = u64::from_cbor(data)?;
        Ok((v.try_into()?, len))
    }
}

/// Parses and validates the trailing CRC value of a block.
///
/// `data` must be the raw byte slice of the entire block (the CBOR array),
/// and `block` the array decoder positioned at the CRC field.  The CRC is
/// computed over the block bytes with the CRC value itself zeroed.
pub(super) fn parse_crc_value(
    data: &[u8],
    block: &mut cbor::decode::Array,
    crc_type: CrcType,
) -> Result<(), CrcError> {
    let crc_value = if block.at_end()? {
        None
    } else {
        let crc_start = block.offset();
        Some(
            block
                .parse_value(|value, tags| match value {
                    cbor::decode::Value::Bytes(crc) if tags.is_empty() => {
                        Ok(crc.start + crc_start..crc.end + crc_start)
                    }
                    value => Err(CrcError::InvalidCbor(cbor::decode::Error::IncorrectType(
                        "Untagged Definite-length Byte String".to_string(),
                        value.type_name(!tags.is_empty()),
                    ))),
                })?
                .0,
        )
    };
    if !block.at_end()? {
        return Err(cbor::decode::Error::AdditionalItems.into());
    }
    let crc_end = block.offset();

    match (crc_type, crc_value) {
        (CrcType::None, None) => Ok(()),
        (CrcType::None, Some(_)) => Err(CrcError::UnexpectedCrcValue),
        (CrcType::Crc16X25, Some(crc)) => {
            let crc_value = u16::from_be_bytes(
                data[crc.start..crc.end]
                    .try_into()
                    .map_err(|_| CrcError::InvalidLength(crc.len()))?,
            );
            let mut digest = X25.digest();
            digest.update(&data[0..crc.start]);
            digest.update(&[0u8; 2]);
            digest.update(&data[crc.end..crc_end]);
            if crc_value != digest.finalize() {
                Err(CrcError::IncorrectCrc)
            } else {
                Ok(())
            }
        }
        (CrcType::Crc32Castagnoli, Some(crc)) => {
            let crc_value = u32::from_be_bytes(
                data[crc.start..crc.end]
                    .try_into()
                    .map_err(|_| CrcError::InvalidLength(crc.len()))?,
            );
            let mut digest = CASTAGNOLI.digest();
            digest.update(&data[0..crc.start]);
            digest.update(&[0u8; 4]);
            digest.update(&data[crc.end..crc_end]);
            if crc_value != digest.finalize() {
                Err(CrcError::IncorrectCrc)
            } else {
                Ok(())
            }
        }
        (_, None) => Err(CrcError::MissingCrc),
    }
}

/// Appends a CRC value to a block's canonical encoding.
///
/// Calculates the CRC over `data` plus a zero placeholder, then appends the
/// CBOR byte string holding the final value.
pub(super) fn append_crc_value(crc_type: CrcType, mut data: Vec<u8>) -> Vec<u8> {
    match crc_type {
        CrcType::None => {}
        CrcType::Crc16X25 => {
            // CBOR byte string header for a 2-byte string
            data.push(0x42);
            let mut digest = X25.digest();
            digest.update(&data);
            digest.update(&[0; 2]);
            data.extend_from_slice(&digest.finalize().to_be_bytes());
        }
        CrcType::Crc32Castagnoli => {
            // CBOR byte string header for a 4-byte string
            data.push(0x44);
            let mut digest = CASTAGNOLI.digest();
            digest.update(&data);
            digest.update(&[0; 4]);
            data.extend_from_slice(&digest.finalize().to_be_bytes());
        }
    }
    data
}
