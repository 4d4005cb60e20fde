/*!
The Application Agent Protocol (AAP) wire message codec.

AAP is the socket surface through which local applications register sinks,
send and receive bundles, and manage them.  Each message starts with a
single header byte (protocol version in the high nibble, message type in
the low nibble), followed by the fields the type requires, big-endian:

| Type | EID | Payload | Bundle ID |
|---|---|---|---|
| `Ack`, `Nack`, `Ping` | — | — | — |
| `Register` | u16 length + bytes | — | — |
| `SendBundle`, `RecvBundle`, `SendBibe`, `RecvBibe` | u16 length + bytes | u64 length + bytes | — |
| `Welcome` | u16 length + bytes | — | — |
| `SendConfirm`, `CancelBundle` | — | — | u64 (non-zero) |
*/

use tern_bpv7::eid::Eid;
use thiserror::Error;

mod parse;
mod serialize;

#[cfg(test)]
mod tests;

pub use parse::StreamParser;

/// The AAP protocol version carried in the high nibble of the header byte.
const PROTOCOL_VERSION: u8 = 0x1;

/// The largest payload a single AAP message may carry.
///
/// The EID field is bounded for free by its u16 length; the payload length
/// is a u64 straight off the wire and needs an explicit cap so a client
/// cannot demand absurd allocations or stall the parser forever.
pub const MAX_PAYLOAD_LENGTH: u64 = 16 * 1024 * 1024;

/// Errors that can occur when parsing or validating an AAP message.
#[derive(Error, Debug)]
pub enum Error {
    /// The input data is incomplete and more bytes are needed.
    #[error("Need at least {0} more bytes to decode message")]
    NeedMoreData(usize),

    /// The header byte carries an unsupported protocol version.
    #[error("Unsupported AAP protocol version {0}")]
    InvalidVersion(u8),

    /// The header byte carries an unknown message type.
    #[error("Unknown AAP message type {0}")]
    InvalidType(u8),

    /// The message fields do not satisfy the per-type field matrix.
    #[error("AAP message fields invalid for its type")]
    InvalidFields,

    /// The payload length field exceeds [`MAX_PAYLOAD_LENGTH`].
    #[error("AAP message payload of {0} bytes exceeds the maximum")]
    PayloadTooLarge(u64),

    /// The EID field is not valid UTF-8.
    #[error("AAP message EID is not valid UTF-8")]
    InvalidUtf8,

    /// The EID field does not hold a well-formed EID.
    #[error(transparent)]
    InvalidEid(#[from] tern_bpv7::eid::EidError),

    /// The parser has latched an error and must be reset.
    #[error("Parser has failed and must be reset")]
    ParserFailed,
}

/// The type of an AAP message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageType {
    /// Positive acknowledgement.
    Ack,
    /// Negative acknowledgement.
    Nack,
    /// Register an agent under a sink identifier.
    Register,
    /// Send a bundle to the given EID.
    SendBundle,
    /// A bundle delivered to a registered agent.
    RecvBundle,
    /// Confirms a send, carrying the assigned bundle id.
    SendConfirm,
    /// Cancel a previously sent bundle by id.
    CancelBundle,
    /// Greets a newly connected client with the node's EID.
    Welcome,
    /// Keep-alive probe.
    Ping,
    /// Send a BIBE protocol data unit to the given EID.
    SendBibe,
    /// A BIBE protocol data unit delivered to a registered agent.
    RecvBibe,
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(MessageType::Ack),
            0x1 => Ok(MessageType::Nack),
            0x2 => Ok(MessageType::Register),
            0x3 => Ok(MessageType::SendBundle),
            0x4 => Ok(MessageType::RecvBundle),
            0x5 => Ok(MessageType::SendConfirm),
            0x6 => Ok(MessageType::CancelBundle),
            0x7 => Ok(MessageType::Welcome),
            0x8 => Ok(MessageType::Ping),
            0x9 => Ok(MessageType::SendBibe),
            0xA => Ok(MessageType::RecvBibe),
            value => Err(Error::InvalidType(value)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Ack => 0x0,
            MessageType::Nack => 0x1,
            MessageType::Register => 0x2,
            MessageType::SendBundle => 0x3,
            MessageType::RecvBundle => 0x4,
            MessageType::SendConfirm => 0x5,
            MessageType::CancelBundle => 0x6,
            MessageType::Welcome => 0x7,
            MessageType::Ping => 0x8,
            MessageType::SendBibe => 0x9,
            MessageType::RecvBibe => 0xA,
        }
    }
}

impl MessageType {
    /// Returns `true` if messages of this type carry an EID field.
    fn has_eid(&self) -> bool {
        matches!(
            self,
            MessageType::Register
                | MessageType::SendBundle
                | MessageType::RecvBundle
                | MessageType::SendBibe
                | MessageType::RecvBibe
                | MessageType::Welcome
        )
    }

    /// Returns `true` if messages of this type carry a payload field.
    fn has_payload(&self) -> bool {
        matches!(
            self,
            MessageType::SendBundle
                | MessageType::RecvBundle
                | MessageType::SendBibe
                | MessageType::RecvBibe
        )
    }

    /// Returns `true` if messages of this type carry a bundle id field.
    fn has_bundle_id(&self) -> bool {
        matches!(self, MessageType::SendConfirm | MessageType::CancelBundle)
    }
}

/// A single AAP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The message type.
    pub message_type: MessageType,
    /// The EID field, for types that carry one.
    pub eid: Option<String>,
    /// The payload field, for types that carry one.
    pub payload: Option<Box<[u8]>>,
    /// The bundle id field, for types that carry one.
    pub bundle_id: Option<u64>,
}

impl Message {
    /// Constructs a field-free message (`Ack`, `Nack`, `Ping`).
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            eid: None,
            payload: None,
            bundle_id: None,
        }
    }

    /// Validates the message against the per-type field matrix.
    ///
    /// For every EID-bearing type except `Register` the EID must also be a
    /// well-formed `dtn:` or `ipn:` EID; a registration carries only the
    /// demux part, which cannot be checked without knowing the scheme.
    pub fn validate(&self) -> Result<(), Error> {
        if self.message_type.has_eid() {
            let Some(eid) = &self.eid else {
                return Err(Error::InvalidFields);
            };
            if eid.len() > u16::MAX as usize {
                return Err(Error::InvalidFields);
            }
            if !matches!(self.message_type, MessageType::Register) {
                eid.parse::<Eid>()?;
            }
        } else if self.eid.is_some() {
            return Err(Error::InvalidFields);
        }

        if !self.message_type.has_payload() && self.payload.is_some() {
            return Err(Error::InvalidFields);
        }
        if self.message_type.has_payload() {
            match &self.payload {
                None => return Err(Error::InvalidFields),
                Some(payload) if payload.len() as u64 > MAX_PAYLOAD_LENGTH => {
                    return Err(Error::PayloadTooLarge(payload.len() as u64));
                }
                Some(_) => {}
            }
        }

        if self.message_type.has_bundle_id() {
            if !matches!(self.bundle_id, Some(id) if id != 0) {
                return Err(Error::InvalidFields);
            }
        } else if self.bundle_id.is_some() {
            return Err(Error::InvalidFields);
        }

        Ok(())
    }

    /// Returns `true` if the message satisfies the field matrix.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
