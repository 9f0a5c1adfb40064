//! Distributed Engine Fleet
//!
//! Configures, starts, stops and tears down a set of remote execution engines
//! that cooperatively run one workload:
//! - Engine collaborator traits (factory and per-address handle)
//! - Registry of configured engines
//! - Coordinator with bounded retries and isolated lifecycle broadcasts
//! - Structured reporting channel

pub mod coordinator;
pub mod engine;
pub mod options;
pub mod registry;
pub mod report;

pub use coordinator::FleetCoordinator;
pub use engine::{EngineFactory, EngineHandle, Workload};
pub use options::{FleetOptions, Properties};
pub use registry::FleetRegistry;
pub use report::{
    ChannelReporter, FleetEvent, FleetReporter, MemoryReporter, NullReporter, Outcome, Phase,
    TracingReporter,
};
