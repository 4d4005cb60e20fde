use super::*;

/// An incremental parser for a stream of AAP messages.
///
/// Callers push byte buffers of arbitrary size; the parser emits one
/// message at a time and latches on error until [`reset`](StreamParser::reset).
pub struct StreamParser {
    buffer: Vec<u8>,
    failed: bool,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    /// Creates a new parser at the start of a message stream.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            failed: false,
        }
    }

    /// Discards all state and buffered data.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.failed = false;
    }

    /// Returns `true` if no unconsumed bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends `data` to the parse buffer and attempts to extract a message.
    ///
    /// The extracted message has been validated against the field matrix.
    pub fn push(&mut self, data: &[u8]) -> Result<Option<Message>, Error> {
        if self.failed {
            return Err(Error::ParserFailed);
        }
        self.buffer.extend_from_slice(data);

        match parse_message(&self.buffer) {
            Ok(Some((message, len))) => {
                self.buffer.drain(..len);
                Ok(Some(message))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn read<const N: usize>(&mut self) -> Option<[u8; N]> {
        let r = self.data.get(self.offset..self.offset + N)?;
        self.offset += N;
        Some(r.try_into().unwrap())
    }

    fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(len)?;
        let r = self.data.get(self.offset..end)?;
        self.offset = end;
        Some(r)
    }
}

/// Parses one message from the front of `data`, returning `None` if the
/// buffer does not yet hold a complete message.
fn parse_message(data: &[u8]) -> Result<Option<(Message, usize)>, Error> {
    let mut reader = Reader { data, offset: 0 };

    let Some([header]) = reader.read::<1>() else {
        return Ok(None);
    };
    if header >> 4 != PROTOCOL_VERSION {
        return Err(Error::InvalidVersion(header >> 4));
    }
    let message_type = MessageType::try_from(header & 0x0F)?;

    let eid = if message_type.has_eid() {
        let Some(len) = reader.read::<2>().map(u16::from_be_bytes) else {
            return Ok(None);
        };
        let Some(bytes) = reader.read_bytes(len as usize) else {
            return Ok(None);
        };
        Some(
            core::str::from_utf8(bytes)
                .map_err(|_| Error::InvalidUtf8)?
                .to_string(),
        )
    } else {
        None
    };

    let payload = if message_type.has_payload() {
        let Some(len) = reader.read::<8>().map(u64::from_be_bytes) else {
            return Ok(None);
        };
        // The length is attacker controlled; reject it before it can size
        // a buffer or wedge the parser waiting for data that never comes
        if len > MAX_PAYLOAD_LENGTH {
            return Err(Error::PayloadTooLarge(len));
        }
        let Some(bytes) = reader.read_bytes(len as usize) else {
            return Ok(None);
        };
        Some(bytes.into())
    } else {
        None
    };

    let bundle_id = if message_type.has_bundle_id() {
        let Some(id) = reader.read::<8>().map(u64::from_be_bytes) else {
            return Ok(None);
        };
        Some(id)
    } else {
        None
    };

    let message = Message {
        message_type,
        eid,
        payload,
        bundle_id,
    };
    message.validate()?;
    Ok(Some((message, reader.offset)))
}
