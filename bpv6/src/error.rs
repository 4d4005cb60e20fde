use super::*;
use thiserror::Error;

/// The primary error type for the `bpv6` crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The input data is incomplete and more bytes are needed.
    #[error("Need at least {0} more bytes to decode value")]
    NeedMoreData(usize),

    /// An SDNV exceeds the 64-bit value range.
    #[error("SDNV exceeds 64 bits")]
    SdnvTooLong,

    /// The bundle protocol version is not 6.
    #[error("Unsupported bundle protocol version {0}")]
    InvalidVersion(u64),

    /// A dictionary offset points outside the dictionary byte array.
    #[error("Dictionary reference {0} out of range")]
    InvalidDictionaryReference(u64),

    /// A dictionary entry is not a NUL-terminated string.
    #[error("Malformed dictionary")]
    MalformedDictionary,

    /// The bundle has no payload block.
    #[error("Bundle has no payload block")]
    MissingPayload,

    /// The primary block length does not match its contents.
    #[error("Primary block length mismatch")]
    PrimaryLengthMismatch,

    /// The fragment information is inconsistent.
    #[error("Invalid fragment information: offset {0}, total length {1}")]
    InvalidFragmentInfo(u64, u64),

    /// The bundle forbids fragmentation.
    #[error("Bundle must not be fragmented")]
    FragmentForbidden,

    /// The requested fragment size cannot hold even a single payload byte.
    #[error("Fragment size {0} too small for first fragment")]
    FragmentTooSmall(usize),

    /// The parser has latched an error and must be reset.
    #[error("Parser has failed and must be reset")]
    ParserFailed,

    /// There is data after the end of the bundle.
    #[error("Bundle has additional trailing data")]
    AdditionalData,

    /// An error related to Endpoint ID processing.
    #[error(transparent)]
    InvalidEid(#[from] tern_bpv7::eid::EidError),

    /// A generic error for when parsing a specific field fails.
    #[error("Failed to parse {field}: {source}")]
    InvalidField {
        /// The name of the field that failed to parse.
        field: &'static str,
        /// The underlying error that caused the failure.
        source: Box<dyn core::error::Error + Send + Sync>,
    },
}
