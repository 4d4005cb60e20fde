/*!
Bundle-in-Bundle Encapsulation (BIBE) tunnel endpoints.

A BIBE tunnel carries a fully serialized bundle as the payload of another
bundle.  The encapsulating side is a convergence layer adapter: forwarding
a bundle over a BIBE contact wraps it in a BIBE protocol data unit and
re-injects the outer bundle into the node for ordinary routing.  The
decapsulating side is an application agent: bundles delivered to the BIBE
sink have their inner bundle extracted and pushed back through ingress.
*/

use tracing::{debug, warn};

mod bpdu;
mod cla;
mod decap;

pub use bpdu::Bpdu;
pub use cla::BibeCla;
pub use decap::DecapAgent;

/// The sink the decapsulation agent registers under.
pub const BIBE_SINK: &str = "bibe";

/// Errors from BIBE operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The BPDU array does not have exactly three elements.
    #[error("BIBE PDU must be a 3-element array")]
    InvalidArrayLength,

    /// The encapsulated bundle field is not a byte string.
    #[error(transparent)]
    InvalidCbor(#[from] tern_cbor::decode::Error),

    /// The tunnel destination EID is malformed.
    #[error(transparent)]
    InvalidEid(#[from] tern_bpv7::eid::EidError),
}
