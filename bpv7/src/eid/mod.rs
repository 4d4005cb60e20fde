use super::*;
use tern_cbor as cbor;

mod error;
mod parse;

#[cfg(test)]
mod tests;

pub use error::EidError;

/// An Endpoint Identifier, naming a source, destination or administrative
/// endpoint.
///
/// Two URI schemes are supported: the text scheme `dtn:<node>[/<demux>]` and
/// the numeric scheme `ipn:<node>.<service>`.  The distinguished value
/// `dtn:none` ([`Eid::Null`]) denotes "no endpoint" and is encoded as the
/// 2-element pair `[1, 0]`.
#[derive(Default, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Eid {
    /// The null endpoint `dtn:none`.
    #[default]
    Null,
    /// A `dtn:` scheme endpoint.  An empty `demux` names the node itself.
    Dtn { node_name: String, demux: String },
    /// An `ipn:` scheme endpoint.
    Ipn { node_number: u64, service_number: u64 },
}

impl Eid {
    /// Returns `true` if this is the null endpoint `dtn:none`.
    pub fn is_null(&self) -> bool {
        matches!(self, Eid::Null)
    }

    /// Returns the node ID: the EID with the demux/service part stripped.
    pub fn node_id(&self) -> Eid {
        match self {
            Eid::Null => Eid::Null,
            Eid::Dtn { node_name, .. } => Eid::Dtn {
                node_name: node_name.clone(),
                demux: String::new(),
            },
            Eid::Ipn { node_number, .. } => Eid::Ipn {
                node_number: *node_number,
                service_number: 0,
            },
        }
    }

    /// Returns `true` if `self` and `other` name endpoints on the same node.
    pub fn same_node(&self, other: &Eid) -> bool {
        match (self, other) {
            (Eid::Dtn { node_name: a, .. }, Eid::Dtn { node_name: b, .. }) => a == b,
            (Eid::Ipn { node_number: a, .. }, Eid::Ipn { node_number: b, .. }) => a == b,
            _ => false,
        }
    }

    /// Returns the demux or service part as an agent sink identifier, if any.
    pub fn sink(&self) -> Option<String> {
        match self {
            Eid::Null => None,
            Eid::Dtn { demux, .. } => (!demux.is_empty()).then(|| demux.clone()),
            Eid::Ipn { service_number, .. } => Some(service_number.to_string()),
        }
    }

    /// Builds the endpoint formed by appending `sink` to this node's EID.
    pub fn with_sink(&self, sink: &str) -> Result<Eid, EidError> {
        match self.node_id() {
            Eid::Dtn { node_name, .. } => Ok(Eid::Dtn {
                node_name,
                demux: sink.to_string(),
            }),
            Eid::Ipn { node_number, .. } => Ok(Eid::Ipn {
                node_number,
                service_number: sink
                    .parse()
                    .map_err(|e: core::num::ParseIntError| EidError::InvalidField {
                        field: "ipn service number",
                        source: e.into(),
                    })?,
            }),
            Eid::Null => Err(EidError::NullWithDemux),
        }
    }
}

impl cbor::encode::ToCbor for Eid {
    type Result = ();

    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) -> Self::Result {
        encoder.emit_array(Some(2), |a| match self {
            Eid::Null => {
                a.emit(&1u64);
                a.emit(&0u64)
            }
            Eid::Dtn { node_name, demux } => {
                a.emit(&1u64);
                if demux.is_empty() {
                    a.emit(node_name.as_str());
                } else {
                    a.emit(&format!("{node_name}/{demux}"));
                }
            }
            Eid::Ipn {
                node_number,
                service_number,
            } => {
                a.emit(&2u64);
                a.emit_array(Some(2), |a| {
                    a.emit(node_number);
                    a.emit(service_number);
                })
            }
        })
    }
}

impl cbor::decode::FromCbor for Eid {
    type Error = EidError;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        parse::eid_from_cbor(data)
    }
}

impl core::str::FromStr for Eid {
    type Err = EidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::eid_from_str(s)
    }
}

impl core::fmt::Debug for Eid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        <Self as core::fmt::Display>::fmt(self, f)
    }
}

impl core::fmt::Display for Eid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Eid::Null => f.write_str("dtn:none"),
            Eid::Dtn { node_name, demux } if demux.is_empty() => {
                write!(f, "dtn:{node_name}")
            }
            Eid::Dtn { node_name, demux } => write!(f, "dtn:{node_name}/{demux}"),
            Eid::Ipn {
                node_number,
                service_number,
            } => write!(f, "ipn:{node_number}.{service_number}"),
        }
    }
}
