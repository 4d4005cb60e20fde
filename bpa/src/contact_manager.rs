/*!
The contact manager: a single task that wakes on the next contact boundary
(start or end), opens and closes links as contact windows begin and end,
and runs one TX engine per active link.

The manager never touches the routing table; the bundle processor
publishes a snapshot of the contact plan through a watch channel whenever
the table changes, and moving bundles in and out of TX queues happens on
the processor's task in response to `ContactStarted` / `ContactEnded`
signals.
*/

use super::*;
use processor::Signal;
use routing::ContactId;
use tern_bpv7::eid::Eid;

/// What the contact manager needs to know about a contact.
#[derive(Debug, Clone)]
pub struct ContactInfo {
    pub id: ContactId,
    pub node: Eid,
    pub cla_name: String,
    pub cla_address: String,
    pub from: time::OffsetDateTime,
    pub to: time::OffsetDateTime,
}

/// The contact plan snapshot published by the processor.
pub type Plan = std::sync::Arc<Vec<ContactInfo>>;

pub(crate) async fn run(
    mut plan: tokio::sync::watch::Receiver<Plan>,
    clas: std::sync::Arc<std::sync::RwLock<cla::Registry>>,
    signals: flume::Sender<Signal>,
    tx_queue_depth: usize,
    cancel_token: tokio_util::sync::CancellationToken,
) {
    let mut engines: std::collections::HashMap<ContactId, tx::TxEngine> = Default::default();

    loop {
        let snapshot = plan.borrow_and_update().clone();
        let now = time::OffsetDateTime::now_utc();

        // Close engines whose contact ended or vanished from the plan
        let ended: Vec<ContactId> = engines
            .keys()
            .filter(|id| {
                !snapshot
                    .iter()
                    .any(|c| c.id == **id && c.from <= now && now < c.to)
            })
            .copied()
            .collect();
        for id in ended {
            if let Some(engine) = engines.remove(&id) {
                debug!("Contact {id:?} ended");
                let _ = signals
                    .send_async(Signal::ContactEnded { contact: id })
                    .await;
                // Drain-then-finalize: queued bundles are reported as
                // transmission failures, never dropped silently
                engine.finalize().await;
            }
        }

        // Open links for contacts whose window has begun
        let starting: Vec<_> = snapshot
            .iter()
            .filter(|c| c.from <= now && now < c.to && !engines.contains_key(&c.id))
            .collect();
        for contact in starting {
            let cla = {
                let registry = clas.read().trace_expect("CLA registry lock poisoned");
                registry.find(&contact.cla_name)
            };
            let cla = match cla {
                Ok(cla) => cla,
                Err(e) => {
                    warn!("Cannot start contact with {}: {e}", contact.node);
                    continue;
                }
            };
            match cla.open(contact).await {
                Ok(link) => {
                    info!("Contact with {} started", contact.node);
                    let engine = tx::TxEngine::spawn(
                        contact.id,
                        contact.node.to_string(),
                        link,
                        signals.clone(),
                        tx_queue_depth,
                    );
                    let _ = signals
                        .send_async(Signal::ContactStarted {
                            contact: contact.id,
                            queue: engine.queue.clone(),
                        })
                        .await;
                    engines.insert(contact.id, engine);
                }
                Err(e) => {
                    warn!("CLA failed to open link to {}: {e}", contact.node);
                }
            }
        }

        // Sleep until the next boundary, a plan change, or shutdown
        let next_boundary = snapshot
            .iter()
            .flat_map(|c| [c.from, c.to])
            .filter(|t| *t > now)
            .min();
        let sleep = async {
            match next_boundary {
                Some(at) => {
                    let wait = at - time::OffsetDateTime::now_utc();
                    if wait > time::Duration::ZERO {
                        tokio::time::sleep(wait.unsigned_abs()).await;
                    }
                }
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            changed = plan.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = sleep => {}
        }
    }

    // Finalize every engine on the way out
    for (id, engine) in engines {
        let _ = signals
            .send_async(Signal::ContactEnded { contact: id })
            .await;
        engine.finalize().await;
    }
    debug!("Contact manager task complete");
}
