pub mod agents;
pub mod bpa;
pub mod bundle;
pub mod cla;
pub mod config;
pub mod contact_manager;
pub mod processor;
pub mod router;
pub mod routing;
pub mod tx;

use trace_err::*;
use tracing::{debug, info, trace, warn};

pub use bpa::Bpa;
pub use bytes::Bytes;
