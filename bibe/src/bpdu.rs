use super::*;
use tern_cbor as cbor;

/// A BIBE protocol data unit: a CBOR array of exactly three elements,
/// `[transmission_id, retransmission_time, encapsulated_bundle]`.
///
/// A transmission id of zero means no BIBE custody transfer is requested;
/// the retransmission time is zero when unused.  The header size is
/// whatever the encoder produces for the actual values, never a fixed
/// offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bpdu {
    /// The BIBE custody transmission id, zero when custody is not used.
    pub transmission_id: u64,
    /// The retransmission time in seconds, zero when unused.
    pub retransmission_time: u64,
    /// The fully serialized inner bundle.
    pub encapsulated_bundle: Box<[u8]>,
}

impl Bpdu {
    /// Wraps serialized bundle bytes with no custody transfer.
    pub fn new(encapsulated_bundle: Box<[u8]>) -> Self {
        Self {
            transmission_id: 0,
            retransmission_time: 0,
            encapsulated_bundle,
        }
    }
}

impl cbor::encode::ToCbor for Bpdu {
    type Result = ();

    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) -> Self::Result {
        encoder.emit_array(Some(3), |a| {
            a.emit(&self.transmission_id);
            a.emit(&self.retransmission_time);
            a.emit(&cbor::encode::Bytes(&self.encapsulated_bundle));
        })
    }
}

impl cbor::decode::FromCbor for Bpdu {
    type Error = Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, usize), Self::Error> {
        cbor::decode::parse_array(data, |a, _| {
            if a.count() != Some(3) {
                return Err(Error::InvalidArrayLength);
            }
            let transmission_id = a.parse().map_err(Error::InvalidCbor)?;
            let retransmission_time = a.parse().map_err(Error::InvalidCbor)?;
            let encapsulated_bundle = a.parse().map_err(Error::InvalidCbor)?;
            Ok(Bpdu {
                transmission_id,
                retransmission_time,
                encapsulated_bundle,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn parses_bpdu() {
        // [0, 0, h'9f88ff'] -- the inner bytes are opaque to the PDU
        let data = hex!("8300 0043 9f88ff");
        let bpdu: Bpdu = tern_cbor::decode::parse(&data).unwrap();
        assert_eq!(bpdu.transmission_id, 0);
        assert_eq!(bpdu.retransmission_time, 0);
        assert_eq!(bpdu.encapsulated_bundle.as_ref(), hex!("9f88ff"));
    }

    #[test]
    fn round_trip() {
        let bpdu = Bpdu {
            transmission_id: 42,
            retransmission_time: 600,
            encapsulated_bundle: hex!("9f88ff").to_vec().into(),
        };
        let data = tern_cbor::encode::emit(&bpdu);
        assert_eq!(tern_cbor::decode::parse::<Bpdu>(&data).unwrap(), bpdu);
    }

    #[test]
    fn wrong_arity_rejected() {
        // [0, 0]
        assert!(matches!(
            tern_cbor::decode::parse::<Bpdu>(&hex!("820000")),
            Err(Error::InvalidArrayLength)
        ));
        // [0, 0, h'', 0]
        assert!(matches!(
            tern_cbor::decode::parse::<Bpdu>(&hex!("8400004000")),
            Err(Error::InvalidArrayLength)
        ));
        // Indefinite-length arrays are not allowed either
        assert!(matches!(
            tern_cbor::decode::parse::<Bpdu>(&hex!("9f000040ff")),
            Err(Error::InvalidArrayLength)
        ));
    }
}
