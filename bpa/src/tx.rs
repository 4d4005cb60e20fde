/*!
The per-contact transmit engine.

One engine runs per active link, owning the link and a bounded FIFO queue
of commands.  Within one queue, the order of `Send` commands equals the
order of transmissions and the order of reported results; across queues no
ordering is promised.
*/

use super::*;
use processor::Signal;
use routing::ContactId;

static TX_TASK_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

/// A command on a TX queue.
pub enum Command {
    /// Transmit a bundle to the given CLA address.  Ownership of the
    /// bundle transfers with the command.
    Send(bundle::Bundle, String),
    /// Drain the queue, reporting every remaining bundle as failed, then
    /// exit.
    Finalize,
}

/// The handle the contact manager keeps for a running TX engine.
pub struct TxEngine {
    /// The engine's command queue.
    pub queue: flume::Sender<Command>,
    handle: tokio::task::JoinHandle<()>,
}

impl TxEngine {
    /// Spawns a TX engine for an open link.
    pub fn spawn(
        contact: ContactId,
        neighbor: String,
        link: Box<dyn cla::Link>,
        signals: flume::Sender<Signal>,
        queue_depth: usize,
    ) -> Self {
        let (tx, rx) = flume::bounded(queue_depth);
        // The counter makes the task name unique across the node lifetime
        let task = format!(
            "tx{}-{neighbor}",
            TX_TASK_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        );
        let handle = tokio::spawn(async move {
            tx_task(contact, link, rx, signals).await;
            debug!("TX task {task} complete");
        });
        Self { queue: tx, handle }
    }

    /// Requests drain-then-exit and waits for the engine to finish.
    pub async fn finalize(self) {
        // The queue may be full of Send commands; the engine always drains
        // it, so an async send cannot deadlock
        let _ = self.queue.send_async(Command::Finalize).await;
        let _ = self.handle.await;
    }
}

async fn tx_task(
    contact: ContactId,
    mut link: Box<dyn cla::Link>,
    queue: flume::Receiver<Command>,
    signals: flume::Sender<Signal>,
) {
    while let Ok(command) = queue.recv_async().await {
        let Command::Send(mut bundle, cla_address) = command else {
            break;
        };

        trace!("TX: sending bundle {} to {cla_address}", bundle.id);
        bundle.prepare_for_forwarding();

        let result = send_bundle(link.as_mut(), &bundle, &cla_address).await;
        let signal = match result {
            Ok(()) => Signal::TransmissionSuccess { contact, bundle },
            Err(e) => {
                warn!("TX: transmission failed: {e}");
                Signal::TransmissionFailure { contact, bundle }
            }
        };
        if signals.send_async(signal).await.is_err() {
            // Processor gone, the node is shutting down
            return;
        }
    }

    // Drain anything still queued, reporting each bundle as failed so the
    // processor can reschedule or drop it
    while let Ok(command) = queue.try_recv() {
        if let Command::Send(bundle, _) = command {
            let _ = signals
                .send_async(Signal::TransmissionFailure { contact, bundle })
                .await;
        }
    }

    if let Err(e) = link.close().await {
        warn!("TX: link close failed: {e}");
    }
}

async fn send_bundle(
    link: &mut dyn cla::Link,
    bundle: &bundle::Bundle,
    cla_address: &str,
) -> cla::Result<()> {
    link.begin_packet(bundle.serialized_size(), cla_address)
        .await?;
    for segment in bundle.serialize_segments() {
        link.send_packet_data(&segment).await?;
    }
    link.end_packet().await
}
