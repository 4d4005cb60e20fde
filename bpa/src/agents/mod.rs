/*!
Application agents: in-process subscribers identified by a sink — the
demux suffix of a `dtn:` EID or the service number of an `ipn:` EID —
that consume locally delivered bundles.

Two predefined agents exist: the config agent, which accepts router
command payloads, and the optional echo agent.
*/

use super::*;
use tern_bpv7::eid::Eid;

mod config_agent;
mod echo_agent;
pub mod router_command;

pub use config_agent::ConfigAgent;
pub use echo_agent::EchoAgent;
pub use router_command::RouterCommand;

/// The sink the config agent registers under.
pub const CONFIG_SINK: &str = "config";
/// The sink the echo agent registers under.
pub const ECHO_SINK: &str = "echo";

/// A locally delivered application data unit.
#[derive(Debug, Clone)]
pub struct Adu {
    /// The source EID of the delivering bundle.
    pub source: Eid,
    /// The destination EID the bundle was addressed to.
    pub destination: Eid,
    /// The payload bytes, ownership transferred to the agent.
    pub payload: Box<[u8]>,
}

/// An in-process application agent.
///
/// The delivery callback runs on the bundle processor's task; agents that
/// need to do real work should hand the ADU off to their own task.
pub trait Agent: Send + Sync {
    /// Delivers an ADU addressed to the agent's sink.
    fn deliver(&self, adu: Adu);
}

/// Errors from agent registration.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The sink is already taken by another agent.
    #[error("An agent is already registered at sink \"{0}\"")]
    DuplicateSink(String),

    /// The sink is not registered.
    #[error("No agent registered at sink \"{0}\"")]
    NoSuchSink(String),
}

/// The agent registry, keyed by sink within the node's namespace.
///
/// Owned by the bundle processor; all access happens on its task.
#[derive(Default)]
pub struct Registry {
    agents: std::collections::HashMap<String, std::sync::Arc<dyn Agent>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent at a sink, rejecting duplicates.
    pub fn register(
        &mut self,
        sink: &str,
        agent: std::sync::Arc<dyn Agent>,
    ) -> Result<(), AgentError> {
        if self.agents.contains_key(sink) {
            return Err(AgentError::DuplicateSink(sink.to_string()));
        }
        self.agents.insert(sink.to_string(), agent);
        Ok(())
    }

    /// Removes the agent at a sink.
    pub fn deregister(&mut self, sink: &str) -> Result<(), AgentError> {
        self.agents
            .remove(sink)
            .map(|_| ())
            .ok_or_else(|| AgentError::NoSuchSink(sink.to_string()))
    }

    /// Finds the agent registered at a sink.
    pub fn find(&self, sink: &str) -> Option<std::sync::Arc<dyn Agent>> {
        self.agents.get(sink).cloned()
    }
}
