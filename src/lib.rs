pub mod cli;
pub mod config;
pub mod error;
pub mod fleet;
pub mod transport;

pub use config::AppConfig;
pub use error::{EngineError, FleetError, Result};
pub use fleet::{
    ChannelReporter, EngineFactory, EngineHandle, FleetCoordinator, FleetEvent, FleetOptions,
    FleetRegistry, FleetReporter, MemoryReporter, NullReporter, Outcome, Phase, Properties,
    TracingReporter, Workload,
};
pub use transport::{HttpEngine, HttpEngineFactory};
