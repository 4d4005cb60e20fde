/*!
Assembly of the node core: wires the bundle processor, contact manager and
CLA registry together and exposes the handles through which convergence
layers and applications interact with the node.
*/

use super::*;
use processor::Signal;
use std::sync::Arc;
use tern_bpv7::eid::Eid;

/// A running node core.
pub struct Bpa {
    node_eid: Eid,
    signals: flume::Sender<Signal>,
    clas: Arc<std::sync::RwLock<cla::Registry>>,
    task_tracker: tokio_util::task::TaskTracker,
    cancel_token: tokio_util::sync::CancellationToken,
}

impl Bpa {
    /// Starts the node core: the bundle processor and contact manager
    /// tasks, with the predefined agents registered.
    pub fn start(config: config::Config) -> Self {
        let node_eid = config.node_id();
        let (signals_tx, signals_rx) = flume::bounded(config.signal_queue_depth);
        let (plan_tx, plan_rx) = tokio::sync::watch::channel(Arc::new(Vec::new()));
        let clas = Arc::new(std::sync::RwLock::new(cla::Registry::new()));

        let cancel_token = tokio_util::sync::CancellationToken::new();
        let task_tracker = tokio_util::task::TaskTracker::new();

        let processor = processor::Processor::new(config.clone(), signals_tx.clone(), plan_tx);
        task_tracker.spawn(processor.run(signals_rx, cancel_token.clone()));

        task_tracker.spawn(contact_manager::run(
            plan_rx,
            clas.clone(),
            signals_tx.clone(),
            config.tx_queue_depth,
            cancel_token.clone(),
        ));

        info!("Node {node_eid} started");
        Self {
            node_eid,
            signals: signals_tx,
            clas,
            task_tracker,
            cancel_token,
        }
    }

    /// The node's own EID.
    pub fn node_eid(&self) -> &Eid {
        &self.node_eid
    }

    /// The signal queue convergence layers feed received bytes into.
    pub fn ingress(&self) -> flume::Sender<Signal> {
        self.signals.clone()
    }

    /// Hands a received byte sequence to the bundle processor.
    pub async fn receive(&self, data: Bytes, source_cla_address: Option<String>) {
        let _ = self
            .signals
            .send_async(Signal::ReceiveBundle {
                data,
                source_cla_address,
            })
            .await;
    }

    /// Sends an application data unit from a local sink.
    ///
    /// Returns the internal id of the created bundle.
    pub async fn send(
        &self,
        source_sink: &str,
        destination: Eid,
        payload: Vec<u8>,
        lifetime: core::time::Duration,
    ) -> Result<u64, tern_bpv7::eid::EidError> {
        let source = self.node_eid.with_sink(source_sink)?;
        let (b, _) = tern_bpv7::builder::Builder::new(source, destination)
            .with_lifetime(lifetime)
            .with_payload(payload)
            .build(tern_bpv7::creation_timestamp::CreationTimestamp::now());
        let bundle = bundle::Bundle::new(bundle::Data::V7(b));
        let bundle_id = bundle.id;
        let _ = self
            .signals
            .send_async(Signal::DispatchBundle(bundle))
            .await;
        Ok(bundle_id)
    }

    /// Registers an application agent at a sink.
    pub async fn register_agent(
        &self,
        sink: &str,
        agent: Arc<dyn agents::Agent>,
    ) -> Result<(), agents::AgentError> {
        let (reply, result) = tokio::sync::oneshot::channel();
        let _ = self
            .signals
            .send_async(Signal::RegisterAgent {
                sink: sink.to_string(),
                agent,
                reply: Some(reply),
            })
            .await;
        result
            .await
            .unwrap_or(Err(agents::AgentError::NoSuchSink(sink.to_string())))
    }

    /// Removes the agent at a sink.
    pub async fn deregister_agent(&self, sink: &str) -> Result<(), agents::AgentError> {
        let (reply, result) = tokio::sync::oneshot::channel();
        let _ = self
            .signals
            .send_async(Signal::DeregisterAgent {
                sink: sink.to_string(),
                reply: Some(reply),
            })
            .await;
        result
            .await
            .unwrap_or(Err(agents::AgentError::NoSuchSink(sink.to_string())))
    }

    /// Registers a convergence layer adapter.
    pub fn register_cla(&self, cla: Arc<dyn cla::Cla>) -> cla::Result<()> {
        self.clas
            .write()
            .trace_expect("CLA registry lock poisoned")
            .register(cla)
    }

    /// Applies a router command, as if issued through the config agent.
    pub async fn router_command(&self, command: agents::RouterCommand) {
        let _ = self
            .signals
            .send_async(Signal::ProcessRouterCommand(command))
            .await;
    }

    /// Cancels a bundle wherever it is resident, best effort.
    pub async fn cancel_bundle(&self, bundle_id: u64) {
        let _ = self
            .signals
            .send_async(Signal::CancelBundle(bundle_id))
            .await;
    }

    /// Stops every task and waits for them to finish.
    pub async fn shutdown(self) {
        info!("Node {} stopping", self.node_eid);
        self.cancel_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}
