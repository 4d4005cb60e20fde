/*!
The convergence layer abstraction.

A CLA carries bundles over one link type.  The node core treats it as an
opaque transport: [`Cla::open`] turns a contact into a [`Link`], and a link
accepts packets through the begin/write/end protocol the per-contact TX
engine drives.  Receive paths are owned by the CLA itself, which pushes
parsed byte sequences into the processor's ingress.
*/

use super::*;
use contact_manager::ContactInfo;

/// A specialized `Result` type for CLA operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur during CLA operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A CLA with the same name is already registered.
    #[error("Attempt to register duplicate CLA name {0}")]
    AlreadyExists(String),

    /// No CLA is registered under the requested name.
    #[error("No CLA registered as {0}")]
    NotFound(String),

    /// The link was closed by the peer or the contact ended.
    #[error("Link closed")]
    LinkClosed,

    /// An internal transport error.
    #[error(transparent)]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A convergence layer adapter: one transport type, many links.
#[async_trait::async_trait]
pub trait Cla: Send + Sync {
    /// The CLA's registered name, referenced by contacts.
    fn name(&self) -> &str;

    /// Opens a link for the duration of a contact.
    async fn open(&self, contact: &ContactInfo) -> Result<Box<dyn Link>>;
}

/// An open unidirectional link to a neighbor.
///
/// The TX engine is the only driver of a link, so the methods take
/// `&mut self` and implementations need no internal locking.
#[async_trait::async_trait]
pub trait Link: Send {
    /// Announces a packet of `size` bytes addressed to `cla_address`.
    async fn begin_packet(&mut self, size: usize, cla_address: &str) -> Result<()>;

    /// Writes a chunk of packet data.  Called repeatedly between
    /// [`begin_packet`](Link::begin_packet) and [`end_packet`](Link::end_packet).
    async fn send_packet_data(&mut self, data: &[u8]) -> Result<()>;

    /// Marks the end of the current packet.
    async fn end_packet(&mut self) -> Result<()>;

    /// Closes the link.
    async fn close(&mut self) -> Result<()>;
}

/// The set of registered CLAs, keyed by name.
#[derive(Default)]
pub struct Registry {
    clas: std::collections::HashMap<String, std::sync::Arc<dyn Cla>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a CLA under its own name.
    pub fn register(&mut self, cla: std::sync::Arc<dyn Cla>) -> Result<()> {
        let name = cla.name().to_string();
        if self.clas.contains_key(&name) {
            return Err(Error::AlreadyExists(name));
        }
        self.clas.insert(name, cla);
        Ok(())
    }

    /// Removes a CLA by name.
    pub fn unregister(&mut self, name: &str) -> Option<std::sync::Arc<dyn Cla>> {
        self.clas.remove(name)
    }

    /// Looks up a CLA by name.
    pub fn find(&self, name: &str) -> Result<std::sync::Arc<dyn Cla>> {
        self.clas
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }
}

pub mod loopback {
    /*!
    A loopback CLA: every packet written to a link is reassembled and
    handed straight back to the bundle processor's ingress queue, tagged
    with the link's CLA address.  Used by tests and as the template for
    real transport adapters.
    */

    use super::*;
    use processor::Signal;

    pub struct LoopbackCla {
        ingress: flume::Sender<Signal>,
    }

    impl LoopbackCla {
        /// Creates a loopback CLA feeding the given signal queue.
        pub fn new(ingress: flume::Sender<Signal>) -> Self {
            Self { ingress }
        }
    }

    #[async_trait::async_trait]
    impl Cla for LoopbackCla {
        fn name(&self) -> &str {
            "loopback"
        }

        async fn open(&self, _contact: &ContactInfo) -> Result<Box<dyn Link>> {
            Ok(Box::new(LoopbackLink {
                ingress: self.ingress.clone(),
                packet: None,
            }))
        }
    }

    struct LoopbackLink {
        ingress: flume::Sender<Signal>,
        packet: Option<(Vec<u8>, String)>,
    }

    #[async_trait::async_trait]
    impl Link for LoopbackLink {
        async fn begin_packet(&mut self, size: usize, cla_address: &str) -> Result<()> {
            self.packet = Some((Vec::with_capacity(size), cla_address.to_string()));
            Ok(())
        }

        async fn send_packet_data(&mut self, data: &[u8]) -> Result<()> {
            let Some((packet, _)) = &mut self.packet else {
                return Err(Error::LinkClosed);
            };
            packet.extend_from_slice(data);
            Ok(())
        }

        async fn end_packet(&mut self) -> Result<()> {
            let Some((packet, address)) = self.packet.take() else {
                return Err(Error::LinkClosed);
            };
            self.ingress
                .send_async(Signal::ReceiveBundle {
                    data: packet.into(),
                    source_cla_address: Some(address),
                })
                .await
                .map_err(|_| Error::LinkClosed)
        }

        async fn close(&mut self) -> Result<()> {
            self.packet = None;
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) mod capture {
    //! A CLA that captures transmitted packets for assertions.

    use super::*;

    pub struct CaptureCla {
        name: String,
        pub packets: flume::Sender<(Vec<u8>, String)>,
        pub fail_sends: std::sync::atomic::AtomicBool,
    }

    impl CaptureCla {
        pub fn new(name: &str, packets: flume::Sender<(Vec<u8>, String)>) -> Self {
            Self {
                name: name.to_string(),
                packets,
                fail_sends: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl Cla for CaptureCla {
        fn name(&self) -> &str {
            &self.name
        }

        async fn open(&self, _contact: &ContactInfo) -> Result<Box<dyn Link>> {
            Ok(Box::new(CaptureLink {
                packets: self.packets.clone(),
                fail: self
                    .fail_sends
                    .load(std::sync::atomic::Ordering::Relaxed),
                packet: None,
            }))
        }
    }

    struct CaptureLink {
        packets: flume::Sender<(Vec<u8>, String)>,
        fail: bool,
        packet: Option<(Vec<u8>, String)>,
    }

    #[async_trait::async_trait]
    impl Link for CaptureLink {
        async fn begin_packet(&mut self, size: usize, cla_address: &str) -> Result<()> {
            if self.fail {
                return Err(Error::LinkClosed);
            }
            self.packet = Some((Vec::with_capacity(size), cla_address.to_string()));
            Ok(())
        }

        async fn send_packet_data(&mut self, data: &[u8]) -> Result<()> {
            let Some((packet, _)) = &mut self.packet else {
                return Err(Error::LinkClosed);
            };
            packet.extend_from_slice(data);
            Ok(())
        }

        async fn end_packet(&mut self) -> Result<()> {
            let Some(packet) = self.packet.take() else {
                return Err(Error::LinkClosed);
            };
            self.packets
                .send_async(packet)
                .await
                .map_err(|_| Error::LinkClosed)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }
}
