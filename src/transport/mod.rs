//! Engine transports
//!
//! Adapters that back the fleet's engine traits with a concrete wire
//! mechanism, plus a stub engine server speaking the same protocol.

pub mod http;
pub mod stub;

pub use http::{HttpEngine, HttpEngineFactory};
pub use stub::{StubEngine, StubState, StubStatus};
