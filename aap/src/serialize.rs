use super::*;

impl Message {
    /// Serializes the message into a new byte vector.
    ///
    /// Fails with [`Error::InvalidFields`] if the message does not satisfy
    /// the field matrix for its type.
    pub fn emit(&self) -> Result<Vec<u8>, Error> {
        self.validate()?;

        let mut out = Vec::with_capacity(self.serialized_size());
        out.push((PROTOCOL_VERSION << 4) | u8::from(self.message_type));
        if let Some(eid) = &self.eid {
            out.extend_from_slice(&(eid.len() as u16).to_be_bytes());
            out.extend_from_slice(eid.as_bytes());
        }
        if let Some(payload) = &self.payload {
            out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
            out.extend_from_slice(payload);
        }
        if let Some(bundle_id) = &self.bundle_id {
            out.extend_from_slice(&bundle_id.to_be_bytes());
        }
        Ok(out)
    }

    /// The serialized size of the message in bytes.
    pub fn serialized_size(&self) -> usize {
        1 + self.eid.as_ref().map(|e| 2 + e.len()).unwrap_or(0)
            + self.payload.as_ref().map(|p| 8 + p.len()).unwrap_or(0)
            + self.bundle_id.map(|_| 8).unwrap_or(0)
    }
}
