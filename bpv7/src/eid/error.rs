use thiserror::Error;

/// Errors that can occur when parsing an Endpoint ID.
#[derive(Error, Debug)]
pub enum EidError {
    /// The EID scheme is not `dtn` or `ipn`.
    #[error("Unsupported EID scheme {0}")]
    UnsupportedScheme(String),

    /// The CBOR scheme code is not 1 (dtn) or 2 (ipn).
    #[error("Unsupported EID scheme code {0}")]
    UnsupportedSchemeCode(u64),

    /// The dtn scheme-specific part is empty or malformed.
    #[error("Invalid dtn scheme-specific part \"{0}\"")]
    InvalidDtnSsp(String),

    /// The ipn scheme-specific part is not `<node>.<service>`.
    #[error("Invalid ipn scheme-specific part \"{0}\"")]
    InvalidIpnSsp(String),

    /// The EID has no scheme separator.
    #[error("EID \"{0}\" has no scheme separator")]
    MissingScheme(String),

    /// The dtn SSP `none` must not carry a demux part.
    #[error("dtn:none cannot have a demux part")]
    NullWithDemux,

    /// An error occurred during CBOR decoding.
    #[error(transparent)]
    InvalidCbor(#[from] tern_cbor::decode::Error),

    /// A field within the EID failed to parse.
    #[error("Failed to parse {field}: {source}")]
    InvalidField {
        field: &'static str,
        source: Box<dyn core::error::Error + Send + Sync>,
    },
}
