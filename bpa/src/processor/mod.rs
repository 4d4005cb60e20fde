/*!
The bundle processor: a single-task actor that owns every bundle resident
in the node, classifies it (local delivery, forwarding, custody) and
drives it through its lifecycle.

All mutation of bundles and of routing-table capacity reservations happens
on this task, which gives a trivial serializability guarantee.  A live
bundle is referenced from exactly one of: the processor's in-flight
handling, a contact TX queue, the deferred map, or the custody map —
ownership moves between them, it is never shared.
*/

mod forward;
mod local;
mod report;

#[cfg(test)]
mod tests;

use super::*;
use agents::RouterCommand;
use router::{RouterConfig, RouterResult};
use routing::{ContactId, RoutingTable};
use std::sync::Arc;
use tern_bpv7::eid::Eid;

/// A signal on the bundle processor's queue.
pub enum Signal {
    /// A byte sequence arrived from a convergence layer.
    ReceiveBundle {
        data: Bytes,
        source_cla_address: Option<String>,
    },
    /// A bundle originated locally (by an agent) enters processing.
    DispatchBundle(bundle::Bundle),
    /// A TX engine transmitted the bundle; ownership returns with the signal.
    TransmissionSuccess {
        contact: ContactId,
        bundle: bundle::Bundle,
    },
    /// A TX engine failed to transmit the bundle; ownership returns with
    /// the signal.
    TransmissionFailure {
        contact: ContactId,
        bundle: bundle::Bundle,
    },
    /// Register an agent at a sink.
    RegisterAgent {
        sink: String,
        agent: Arc<dyn agents::Agent>,
        reply: Option<tokio::sync::oneshot::Sender<Result<(), agents::AgentError>>>,
    },
    /// Remove the agent at a sink.
    DeregisterAgent {
        sink: String,
        reply: Option<tokio::sync::oneshot::Sender<Result<(), agents::AgentError>>>,
    },
    /// Apply a router command issued by the config agent.
    ProcessRouterCommand(RouterCommand),
    /// A bundle's lifetime ran out.
    BundleExpired(u64),
    /// Cancel a bundle wherever it is resident, best effort.
    CancelBundle(u64),
    /// A contact window opened; scheduled bundles move onto its TX queue.
    ContactStarted {
        contact: ContactId,
        queue: flume::Sender<tx::Command>,
    },
    /// A contact window closed.
    ContactEnded { contact: ContactId },
}

/// A bundle parked until its scheduled contact starts.
struct Deferred {
    bundle: bundle::Bundle,
    contact: ContactId,
}

pub struct Processor {
    config: config::Config,
    node_eid: Eid,
    router_config: RouterConfig,
    signals: flume::Sender<Signal>,
    table: RoutingTable,
    agents: agents::Registry,
    deferred: std::collections::HashMap<u64, Deferred>,
    custody: std::collections::HashMap<u64, bundle::Bundle>,
    seen: std::collections::HashSet<bundle::ExternalId>,
    routes: std::collections::HashMap<u64, RouterResult>,
    tx_queues: std::collections::HashMap<ContactId, flume::Sender<tx::Command>>,
    reassembly: std::collections::HashMap<bundle::ExternalId, Vec<bundle::Data>>,
    /// Publishes the contact plan to the contact manager.
    plan: tokio::sync::watch::Sender<contact_manager::Plan>,
}

impl Processor {
    pub(crate) fn new(
        config: config::Config,
        signals: flume::Sender<Signal>,
        plan: tokio::sync::watch::Sender<contact_manager::Plan>,
    ) -> Self {
        let node_eid = config.node_id();

        // The predefined sinks are always registered at boot
        let mut registry = agents::Registry::new();
        registry
            .register(
                agents::CONFIG_SINK,
                Arc::new(agents::ConfigAgent::new(
                    node_eid.clone(),
                    config.allow_remote_configuration,
                    signals.clone(),
                )),
            )
            .trace_expect("Config agent registration cannot fail on an empty registry");
        if config.echo_agent {
            registry
                .register(
                    agents::ECHO_SINK,
                    Arc::new(agents::EchoAgent::new(node_eid.clone(), signals.clone())),
                )
                .trace_expect("Echo agent registration cannot fail");
        }

        Self {
            router_config: RouterConfig::from(&config),
            table: RoutingTable::new(config.global_mbs),
            node_eid,
            signals,
            plan,
            config,
            agents: registry,
            deferred: Default::default(),
            custody: Default::default(),
            seen: Default::default(),
            routes: Default::default(),
            tx_queues: Default::default(),
            reassembly: Default::default(),
        }
    }

    /// The processor's event loop: blocks only on its signal queue.
    pub(crate) async fn run(
        mut self,
        signals: flume::Receiver<Signal>,
        cancel_token: tokio_util::sync::CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                signal = signals.recv_async() => {
                    let Ok(signal) = signal else { break };
                    self.handle(signal);
                }
            }
        }
        debug!("Bundle processor task complete");
    }

    fn handle(&mut self, signal: Signal) {
        match signal {
            Signal::ReceiveBundle {
                data,
                source_cla_address,
            } => match bundle::parse_bundle_data(&data) {
                Ok(parsed) => {
                    let bundle = bundle::Bundle::new(parsed);
                    trace!(
                        "Received bundle {} from {:?}",
                        bundle.id, source_cla_address
                    );
                    self.dispatch(bundle);
                }
                Err(e) => {
                    // Wire-level errors are recovered locally: drop, log,
                    // keep reading the stream
                    warn!("Dropped malformed bundle from {source_cla_address:?}: {e}");
                }
            },
            Signal::DispatchBundle(bundle) => self.dispatch(bundle),
            Signal::TransmissionSuccess { contact, bundle } => {
                self.transmission_success(contact, bundle)
            }
            Signal::TransmissionFailure { contact, bundle } => {
                self.transmission_failure(contact, bundle)
            }
            Signal::RegisterAgent { sink, agent, reply } => {
                let result = self.agents.register(&sink, agent);
                if let Err(e) = &result {
                    warn!("Agent registration at \"{sink}\" failed: {e}");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Signal::DeregisterAgent { sink, reply } => {
                let result = self.agents.deregister(&sink);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Signal::ProcessRouterCommand(command) => self.process_router_command(command),
            Signal::BundleExpired(bundle_id) => self.bundle_expired(bundle_id),
            Signal::CancelBundle(bundle_id) => self.cancel_bundle(bundle_id),
            Signal::ContactStarted { contact, queue } => self.contact_started(contact, queue),
            Signal::ContactEnded { contact } => self.contact_ended(contact),
        }
    }

    fn contact_ended(&mut self, contact: ContactId) {
        self.tx_queues.remove(&contact);

        // A contact whose window has passed is never routable again; purge
        // it.  Bundles still draining from its TX queue come back through
        // TransmissionFailure; anything left in the deferred set is put
        // back through routing.
        let over = self
            .table
            .contact(contact)
            .map(|c| c.to <= time::OffsetDateTime::now_utc())
            .unwrap_or(false);
        if over {
            for bundle_id in self.table.remove_contact(contact) {
                if let Some(deferred) = self.deferred.remove(&bundle_id) {
                    self.routes.remove(&bundle_id);
                    self.forward(deferred.bundle);
                }
            }
        }
    }

    /// Classifies a bundle: validation, duplicate suppression, then local
    /// delivery or forwarding.
    fn dispatch(&mut self, mut bundle: bundle::Bundle) {
        if bundle.has_expired() {
            return self.destroy(
                bundle,
                Some(tern_bpv7::status_report::ReasonCode::LifetimeExpired),
            );
        }

        let external_id = bundle.external_id();
        if self.seen.contains(&external_id) && !bundle.custody_requested() {
            trace!("Dropping duplicate bundle {}", bundle.id);
            return;
        }
        self.seen.insert(external_id);

        let hop_count = match &bundle.data {
            bundle::Data::V7(b) => b.hop_count(),
            bundle::Data::V6(_) => None,
        };
        if let Some(hop_count) = hop_count
            && hop_count.count >= hop_count.limit
        {
            return self.destroy(
                bundle,
                Some(tern_bpv7::status_report::ReasonCode::HopLimitExceeded),
            );
        }

        self.report_reception(&bundle);
        if bundle.custody_requested() {
            self.accept_custody(&mut bundle);
        }

        if bundle.destination().same_node(&self.node_eid) {
            self.deliver_local(bundle)
        } else {
            self.forward(bundle)
        }
    }

    fn transmission_success(&mut self, contact: ContactId, bundle: bundle::Bundle) {
        trace!("Bundle {} transmitted on contact {contact:?}", bundle.id);
        self.table.mark_transmitted(contact, bundle.id);
        self.routes.remove(&bundle.id);
        self.report_forwarded(&bundle);

        if bundle.custody_requested() {
            // Hold until the custody signal arrives from the next hop
            self.watch_expiry(&bundle);
            self.custody.insert(bundle.id, bundle);
        } else {
            // Destroyed without a report: forwarding succeeded
            drop(bundle);
        }
    }

    fn transmission_failure(&mut self, contact: ContactId, mut bundle: bundle::Bundle) {
        debug!("Bundle {} failed on contact {contact:?}", bundle.id);
        // Re-credit the reserved capacity
        self.table.unschedule(contact, bundle.id);
        bundle.retries += 1;

        if bundle.has_expired() {
            return self.destroy(
                bundle,
                Some(tern_bpv7::status_report::ReasonCode::LifetimeExpired),
            );
        }
        if bundle.retries > self.config.max_forwarding_retries {
            return self.destroy(
                bundle,
                Some(tern_bpv7::status_report::ReasonCode::NoTimelyContactWithNextNodeOnRoute),
            );
        }
        self.retry(bundle);
    }

    fn bundle_expired(&mut self, bundle_id: u64) {
        let bundle = if let Some(deferred) = self.deferred.remove(&bundle_id) {
            self.table.unschedule(deferred.contact, bundle_id);
            deferred.bundle
        } else if let Some(bundle) = self.custody.remove(&bundle_id) {
            bundle
        } else {
            return;
        };
        if !bundle.has_expired() {
            // A stale timer fired; put the bundle back through routing
            self.routes.remove(&bundle_id);
            return self.forward(bundle);
        }
        self.routes.remove(&bundle_id);
        self.destroy(
            bundle,
            Some(tern_bpv7::status_report::ReasonCode::LifetimeExpired),
        );
    }

    fn cancel_bundle(&mut self, bundle_id: u64) {
        if let Some(deferred) = self.deferred.remove(&bundle_id) {
            self.table.unschedule(deferred.contact, bundle_id);
            self.routes.remove(&bundle_id);
            self.destroy(deferred.bundle, None);
        } else if let Some(bundle) = self.custody.remove(&bundle_id) {
            self.destroy(bundle, None);
        } else {
            // Best effort: the bundle is in transit or already gone
            debug!("Cannot cancel bundle {bundle_id}: not resident");
        }
    }

    fn contact_started(&mut self, contact: ContactId, queue: flume::Sender<tx::Command>) {
        let Some(cla_address) = self.table.contact(contact).map(|c| c.cla_address.clone()) else {
            return;
        };
        self.tx_queues.insert(contact, queue.clone());

        // Move every bundle already scheduled on this contact out of the
        // deferred set and onto the TX queue.  The contact's reservation
        // list is in scheduling order, which keeps the TX FIFO promise.
        let ready: Vec<u64> = self
            .table
            .contact(contact)
            .map(|c| c.scheduled.iter().map(|s| s.bundle_id).collect())
            .unwrap_or_default();
        for bundle_id in ready {
            let Some(deferred) = self.deferred.remove(&bundle_id) else {
                continue;
            };
            match queue.try_send(tx::Command::Send(deferred.bundle, cla_address.clone())) {
                Ok(()) => {}
                Err(
                    flume::TrySendError::Full(tx::Command::Send(bundle, _))
                    | flume::TrySendError::Disconnected(tx::Command::Send(bundle, _)),
                ) => {
                    warn!("TX queue unavailable at contact start, bundle {bundle_id} stays deferred");
                    self.deferred.insert(bundle_id, Deferred { bundle, contact });
                }
                Err(_) => {}
            }
        }
    }

    fn process_router_command(&mut self, command: RouterCommand) {
        let orphans = match command {
            RouterCommand::AddContact {
                node,
                from,
                to,
                bitrate,
                cla_name,
                cla_address,
                endpoints,
            } => {
                info!("Adding contact with {node}: {from} - {to} at {bitrate} B/s");
                self.table
                    .add_contact(node.clone(), cla_name, cla_address, from, to, bitrate);
                if !endpoints.is_empty() {
                    self.table.add_node(node, endpoints);
                }
                Vec::new()
            }
            RouterCommand::RemoveContact { node, from } => {
                match self.table.find_contact(&node, from) {
                    Some(id) => {
                        info!("Removing contact with {node} at {from}");
                        self.tx_queues.remove(&id);
                        self.table.remove_contact(id)
                    }
                    None => {
                        warn!("No contact with {node} at {from} to remove");
                        Vec::new()
                    }
                }
            }
            RouterCommand::AddNode { node, endpoints } => {
                info!("Adding node {node}");
                self.table.add_node(node, endpoints);
                Vec::new()
            }
            RouterCommand::RemoveNode { node } => {
                info!("Removing node {node}");
                self.table.remove_node(&node)
            }
            RouterCommand::Reset => {
                info!("Resetting routing table");
                self.tx_queues.clear();
                self.table.reset()
            }
        };

        self.publish_plan();

        // Bundles whose contacts vanished return to routing
        for bundle_id in orphans {
            if let Some(deferred) = self.deferred.remove(&bundle_id) {
                self.routes.remove(&bundle_id);
                self.forward(deferred.bundle);
            }
        }
    }

    /// Publishes the contact plan snapshot the contact manager acts on.
    fn publish_plan(&self) {
        let now = time::OffsetDateTime::now_utc();
        let plan = self
            .table
            .contacts()
            .filter(|c| c.to > now)
            .map(|c| contact_manager::ContactInfo {
                id: c.id,
                node: c.node.clone(),
                cla_name: c.cla_name.clone(),
                cla_address: c.cla_address.clone(),
                from: c.from,
                to: c.to,
            })
            .collect();
        let _ = self.plan.send(std::sync::Arc::new(plan));
    }

    /// Arms a timer that fires a `BundleExpired` signal at the bundle's
    /// expiry time.  Stale timers are ignored by the handler.
    fn watch_expiry(&self, bundle: &bundle::Bundle) {
        let bundle_id = bundle.id;
        let expiry = bundle.expiry_time();
        let signals = self.signals.clone();
        tokio::spawn(async move {
            let wait = expiry - time::OffsetDateTime::now_utc();
            if wait > time::Duration::ZERO {
                tokio::time::sleep(wait.unsigned_abs()).await;
            }
            let _ = signals.send_async(Signal::BundleExpired(bundle_id)).await;
        });
    }

    /// Destroys a bundle, emitting a deletion status report when requested.
    fn destroy(
        &mut self,
        bundle: bundle::Bundle,
        reason: Option<tern_bpv7::status_report::ReasonCode>,
    ) {
        self.routes.remove(&bundle.id);
        if let Some(reason) = reason {
            debug!("Destroying bundle {}: {reason:?}", bundle.id);
            self.report_deletion(&bundle, reason);
        }
        drop(bundle);
    }
}
