use super::*;
use processor::Signal;

/// The config agent: consumes bundles carrying router command payloads
/// and forwards the parsed commands to the bundle processor.
///
/// Unless remote configuration is allowed, commands are accepted only
/// from endpoints on the local node; this is the boundary for remote
/// configuration policy.
pub struct ConfigAgent {
    local_node: Eid,
    allow_remote_configuration: bool,
    signals: flume::Sender<Signal>,
}

impl ConfigAgent {
    pub fn new(
        local_node: Eid,
        allow_remote_configuration: bool,
        signals: flume::Sender<Signal>,
    ) -> Self {
        Self {
            local_node,
            allow_remote_configuration,
            signals,
        }
    }
}

impl Agent for ConfigAgent {
    fn deliver(&self, adu: Adu) {
        if !self.allow_remote_configuration && !adu.source.same_node(&self.local_node) {
            warn!(
                "ConfigAgent: dropped config message from foreign endpoint \"{}\"",
                adu.source
            );
            return;
        }

        let commands = match router_command::parse(&adu.payload) {
            Ok(commands) => commands,
            Err(e) => {
                warn!("ConfigAgent: rejected command payload: {e}");
                return;
            }
        };

        for command in commands {
            // The delivery callback runs on the processor's own task, so a
            // blocking send could deadlock on a full queue
            if let Err(e) = self.signals.try_send(Signal::ProcessRouterCommand(command)) {
                warn!("ConfigAgent: dropped router command: {e}");
            }
        }
    }
}
