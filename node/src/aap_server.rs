/*!
The Application Agent Protocol socket server.

One TCP listener; each connection is greeted with `WELCOME` and may then
register a sink, send bundles and BIBE PDUs, and cancel bundles.  Bundles
delivered to a registered sink are written back as `RECVBUNDLE` messages.
*/

use std::sync::Arc;
use tern_aap::{Message, MessageType};
use tern_bpa::agents::{Adu, Agent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use trace_err::*;
use tracing::{debug, info, warn};

/// An agent that forwards delivered ADUs to an AAP connection.
struct SocketAgent {
    delivered: flume::Sender<Adu>,
}

impl Agent for SocketAgent {
    fn deliver(&self, adu: Adu) {
        if self.delivered.try_send(adu).is_err() {
            warn!("AAP client too slow, delivered bundle dropped");
        }
    }
}

pub async fn run(
    listen: String,
    bpa: Arc<tern_bpa::Bpa>,
    cancel_token: tokio_util::sync::CancellationToken,
) {
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .trace_expect("Failed to bind AAP listener");
    info!("AAP server listening on {listen}");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            accepted = listener.accept() => {
                let Ok((stream, peer)) = accepted else { continue };
                debug!("AAP connection from {peer}");
                let bpa = bpa.clone();
                let cancel_token = cancel_token.clone();
                tokio::spawn(async move {
                    if let Err(e) = connection(stream, bpa, cancel_token).await {
                        debug!("AAP connection from {peer} closed: {e}");
                    }
                });
            }
        }
    }
}

async fn connection(
    stream: tokio::net::TcpStream,
    bpa: Arc<tern_bpa::Bpa>,
    cancel_token: tokio_util::sync::CancellationToken,
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    let welcome = Message {
        message_type: MessageType::Welcome,
        eid: Some(bpa.node_eid().to_string()),
        payload: None,
        bundle_id: None,
    };
    writer.write_all(&emit(&welcome)).await?;

    let (delivered_tx, delivered_rx) = flume::bounded::<Adu>(16);
    let mut registered_sink: Option<String> = None;
    let mut parser = tern_aap::StreamParser::new();
    let mut buffer = [0u8; 4096];

    let result = 'outer: loop {
        let chunk = tokio::select! {
            _ = cancel_token.cancelled() => break Ok(()),
            adu = delivered_rx.recv_async() => {
                let Ok(adu) = adu else { break Ok(()) };
                writer.write_all(&emit(&Message {
                    message_type: MessageType::RecvBundle,
                    eid: Some(adu.source.to_string()),
                    payload: Some(adu.payload),
                    bundle_id: None,
                })).await?;
                continue;
            }
            read = reader.read(&mut buffer) => {
                let n = read?;
                if n == 0 {
                    break Ok(());
                }
                n
            }
        };

        // Handle every complete message in the freshly read chunk
        let mut data = &buffer[..chunk];
        loop {
            match parser.push(data) {
                Ok(Some(message)) => {
                    data = &[];
                    let reply = handle(message, &bpa, &mut registered_sink, &delivered_tx).await;
                    writer.write_all(&emit(&reply)).await?;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Malformed AAP message: {e}");
                    writer
                        .write_all(&emit(&Message::new(MessageType::Nack)))
                        .await?;
                    break 'outer Ok(());
                }
            }
        }
    };

    if let Some(sink) = registered_sink {
        let _ = bpa.deregister_agent(&sink).await;
    }
    result
}

async fn handle(
    message: Message,
    bpa: &tern_bpa::Bpa,
    registered_sink: &mut Option<String>,
    delivered: &flume::Sender<Adu>,
) -> Message {
    match message.message_type {
        MessageType::Ping => Message::new(MessageType::Ack),
        MessageType::Register => {
            let Some(sink) = message.eid else {
                return Message::new(MessageType::Nack);
            };
            let agent = Arc::new(SocketAgent {
                delivered: delivered.clone(),
            });
            match bpa.register_agent(&sink, agent).await {
                Ok(()) => {
                    if let Some(previous) = registered_sink.replace(sink) {
                        let _ = bpa.deregister_agent(&previous).await;
                    }
                    Message::new(MessageType::Ack)
                }
                Err(e) => {
                    warn!("AAP registration failed: {e}");
                    Message::new(MessageType::Nack)
                }
            }
        }
        MessageType::SendBundle | MessageType::SendBibe => {
            let (Some(eid), Some(payload)) = (message.eid, message.payload) else {
                return Message::new(MessageType::Nack);
            };
            let Ok(destination) = eid.parse() else {
                return Message::new(MessageType::Nack);
            };
            let sink = registered_sink.as_deref().unwrap_or("anonymous");
            match bpa
                .send(
                    sink,
                    destination,
                    payload.into_vec(),
                    core::time::Duration::from_secs(24 * 60 * 60),
                )
                .await
            {
                Ok(bundle_id) => Message {
                    message_type: MessageType::SendConfirm,
                    eid: None,
                    payload: None,
                    bundle_id: Some(bundle_id),
                },
                Err(e) => {
                    warn!("AAP send failed: {e}");
                    Message::new(MessageType::Nack)
                }
            }
        }
        MessageType::CancelBundle => {
            let Some(bundle_id) = message.bundle_id else {
                return Message::new(MessageType::Nack);
            };
            bpa.cancel_bundle(bundle_id).await;
            Message::new(MessageType::Ack)
        }
        _ => Message::new(MessageType::Nack),
    }
}

fn emit(message: &Message) -> Vec<u8> {
    message.emit().unwrap_or_else(|_| {
        // A reply we built ourselves always validates
        Vec::new()
    })
}
