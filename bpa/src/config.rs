/*!
Configuration for the node core.  Deserialized from the server's
configuration file; every field has a sensible default so a bare
`[bpa]` section (or none at all) yields a working node.
*/

use super::*;
use serde::Deserialize;

fn default_node_eid() -> String {
    "dtn:tern".to_string()
}

fn default_global_mbs() -> u64 {
    1024
}

fn default_fragment_min_payload() -> usize {
    8
}

fn default_max_fragments() -> usize {
    3
}

fn default_signal_queue_depth() -> usize {
    64
}

fn default_tx_queue_depth() -> usize {
    16
}

fn default_max_forwarding_retries() -> u32 {
    2
}

/// Node core configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The node's own EID; agents register sinks beneath it.
    #[serde(default = "default_node_eid")]
    pub node_eid: String,

    /// Soft cap, in megabytes, on the total bytes scheduled across all
    /// future contacts.
    #[serde(default = "default_global_mbs")]
    pub global_mbs: u64,

    /// The smallest fragment payload the router will schedule, except for
    /// the final fragment of a bundle.
    #[serde(default = "default_fragment_min_payload")]
    pub fragment_min_payload: usize,

    /// The maximum number of fragments a single routing decision may
    /// produce.
    #[serde(default = "default_max_fragments")]
    pub max_fragments: usize,

    /// Depth of the bundle processor's signal queue.
    #[serde(default = "default_signal_queue_depth")]
    pub signal_queue_depth: usize,

    /// Depth of each per-contact transmit queue.
    #[serde(default = "default_tx_queue_depth")]
    pub tx_queue_depth: usize,

    /// How many times a bundle is re-routed after transmission failure
    /// before it is destroyed.
    #[serde(default = "default_max_forwarding_retries")]
    pub max_forwarding_retries: u32,

    /// Whether the config agent accepts router commands from bundles whose
    /// source is not the local node.
    #[serde(default)]
    pub allow_remote_configuration: bool,

    /// Whether the echo agent is registered at boot.
    #[serde(default)]
    pub echo_agent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_eid: default_node_eid(),
            global_mbs: default_global_mbs(),
            fragment_min_payload: default_fragment_min_payload(),
            max_fragments: default_max_fragments(),
            signal_queue_depth: default_signal_queue_depth(),
            tx_queue_depth: default_tx_queue_depth(),
            max_forwarding_retries: default_max_forwarding_retries(),
            allow_remote_configuration: false,
            echo_agent: false,
        }
    }
}

impl Config {
    /// The node EID parsed into its typed form.
    pub fn node_id(&self) -> tern_bpv7::eid::Eid {
        self.node_eid
            .parse()
            .trace_expect("Invalid node_eid in configuration")
    }
}
