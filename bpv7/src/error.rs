/*!
This module defines the primary error type for the `bpv7` crate.
*/

use super::*;
use thiserror::Error;

/// The primary error type for the `bpv7` crate.
#[derive(Error, Debug)]
pub enum Error {
    /// There is additional data after the end of the outer CBOR array.
    #[error("Bundle has additional data after end of CBOR array")]
    AdditionalData,

    /// The bundle protocol version is unsupported.
    #[error("Unsupported bundle protocol version {0}")]
    InvalidVersion(u64),

    /// The bundle does not start with an indefinite-length CBOR array.
    #[error("Bundle is not framed by an indefinite-length CBOR array")]
    InvalidFraming,

    /// The bundle is missing the required payload block.
    #[error("Bundle has no payload block")]
    MissingPayload,

    /// The final block of the bundle is not the payload block.
    #[error("Final block of bundle is not a payload block")]
    PayloadNotFinal,

    /// More than one block shares the same block number.
    #[error("Bundle has more than one block with block number {0}")]
    DuplicateBlockNumber(u64),

    /// A block has an invalid block number for its type.
    #[error("{1:?} block cannot be block number {0}")]
    InvalidBlockNumber(u64, block::Type),

    /// The fragment information is inconsistent.
    #[error("Invalid fragment information: offset {0}, total length {1}")]
    InvalidFragmentInfo(u64, u64),

    /// Multiple blocks of a type that must be unique.
    #[error("Bundle has multiple {0:?} blocks")]
    DuplicateBlocks(block::Type),

    /// The bundle forbids fragmentation.
    #[error("Bundle must not be fragmented")]
    FragmentForbidden,

    /// The requested fragment size cannot hold even a single payload byte.
    #[error("Fragment size {0} too small for first fragment")]
    FragmentTooSmall(usize),

    /// Fragments passed to reassembly do not form a contiguous ADU.
    #[error("Fragments do not reassemble into a complete bundle")]
    IncompleteFragments,

    /// The parser has latched an error and must be reset.
    #[error("Parser has failed and must be reset")]
    ParserFailed,

    /// An error related to CRC processing.
    #[error(transparent)]
    InvalidCrc(#[from] crc::CrcError),

    /// An error related to Endpoint ID processing.
    #[error(transparent)]
    InvalidEid(#[from] eid::EidError),

    /// An error related to CBOR decoding.
    #[error(transparent)]
    InvalidCbor(#[from] tern_cbor::decode::Error),

    /// A generic error for when parsing a specific field fails.
    #[error("Failed to parse {field}: {source}")]
    InvalidField {
        /// The name of the field that failed to parse.
        field: &'static str,
        /// The underlying error that caused the failure.
        source: Box<dyn core::error::Error + Send + Sync>,
    },
}

/// Extension trait for `Result` that maps errors to an [`Error::InvalidField`].
pub trait CaptureFieldErr<T> {
    /// Maps the error to an `InvalidField` error with the given field name.
    fn map_field_err(self, field: &'static str) -> Result<T, Error>;
}

impl<T, E: Into<Box<dyn core::error::Error + Send + Sync>>> CaptureFieldErr<T>
    for core::result::Result<T, E>
{
    fn map_field_err(self, field: &'static str) -> Result<T, Error> {
        self.map_err(|e| Error::InvalidField {
            field,
            source: e.into(),
        })
    }
}
