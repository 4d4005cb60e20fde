/*!
A builder for constructing new bundles, used by application agents,
status-report generation and BIBE encapsulation.
*/

use super::*;

/// Builds a [`Bundle`] and its wire encoding.
pub struct Builder {
    bundle: bundle::Bundle,
    payload: Vec<u8>,
}

impl Builder {
    /// Starts a new bundle from `source` to `destination`.
    ///
    /// Defaults: 24 hour lifetime, no CRC, no status reports.
    pub fn new(source: eid::Eid, destination: eid::Eid) -> Self {
        Self {
            bundle: bundle::Bundle {
                id: bundle::Id {
                    source,
                    ..Default::default()
                },
                destination,
                lifetime: core::time::Duration::from_secs(24 * 60 * 60),
                ..Default::default()
            },
            payload: Vec::new(),
        }
    }

    /// Sets the bundle processing control flags.
    pub fn with_flags(mut self, flags: bundle::Flags) -> Self {
        self.bundle.flags = flags;
        self
    }

    /// Sets the report-to EID.
    pub fn with_report_to(mut self, report_to: eid::Eid) -> Self {
        self.bundle.report_to = report_to;
        self
    }

    /// Sets the bundle lifetime.
    pub fn with_lifetime(mut self, lifetime: core::time::Duration) -> Self {
        self.bundle.lifetime = lifetime;
        self
    }

    /// Sets the CRC type used for the primary block.
    pub fn with_crc_type(mut self, crc_type: crc::CrcType) -> Self {
        self.bundle.crc_type = crc_type;
        self
    }

    /// Marks the payload as an administrative record.
    pub fn is_admin_record(mut self) -> Self {
        self.bundle.flags.is_admin_record = true;
        self
    }

    /// Adds an extension block with the given type and data.
    pub fn add_extension_block(mut self, block_type: block::Type, data: Box<[u8]>) -> Self {
        self.bundle.insert_extension_block(block_type, data);
        self
    }

    /// Sets the payload bytes.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Builds the bundle, stamping it with `timestamp`.
    ///
    /// Returns the in-memory bundle and its serialized encoding.
    pub fn build(
        mut self,
        timestamp: creation_timestamp::CreationTimestamp,
    ) -> (bundle::Bundle, Vec<u8>) {
        self.bundle.id.timestamp = timestamp;
        self.bundle.blocks.push(block::Block {
            block_type: block::Type::Payload,
            number: 1,
            flags: block::Flags::default(),
            crc_type: self.bundle.crc_type,
            data: self.payload.into_boxed_slice(),
        });
        let data = serialize::emit_bundle(&self.bundle);
        (self.bundle, data)
    }
}
