//! Reporting channel for fleet lifecycle events
//!
//! The coordinator emits structured [`FleetEvent`]s and leaves all formatting
//! to the injected [`FleetReporter`].

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Step of the coordinator that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Connect,
    Configure,
    SetProperties,
    Retry,
    Init,
    Start,
    Stop,
    Shutdown,
    Exit,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Connect => write!(f, "connect"),
            Phase::Configure => write!(f, "configure"),
            Phase::SetProperties => write!(f, "set_properties"),
            Phase::Retry => write!(f, "retry"),
            Phase::Init => write!(f, "init"),
            Phase::Start => write!(f, "start"),
            Phase::Stop => write!(f, "stop"),
            Phase::Shutdown => write!(f, "shutdown"),
            Phase::Exit => write!(f, "exit"),
        }
    }
}

/// What happened in that step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    /// A new configuration round is about to run
    Retrying,
    /// Broadcast target has no configured engine
    NotRegistered,
    /// Address stayed unconfigured after every round
    Unconfigured,
    /// Fleet continues with a subset of engines
    Degraded,
    /// Initialization gave up and tore the fleet down
    Aborted,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed | Outcome::Unconfigured | Outcome::Aborted)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::Retrying => write!(f, "retrying"),
            Outcome::NotRegistered => write!(f, "not_registered"),
            Outcome::Unconfigured => write!(f, "unconfigured"),
            Outcome::Degraded => write!(f, "degraded"),
            Outcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// One structured report from the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetEvent {
    /// Engine the event concerns; `None` for fleet-wide events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub phase: Phase,
    pub outcome: Outcome,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl FleetEvent {
    pub fn engine(address: &str, phase: Phase, outcome: Outcome, detail: impl Into<String>) -> Self {
        Self {
            address: Some(address.to_string()),
            phase,
            outcome,
            detail: detail.into(),
            at: Utc::now(),
        }
    }

    pub fn fleet(phase: Phase, outcome: Outcome, detail: impl Into<String>) -> Self {
        Self {
            address: None,
            phase,
            outcome,
            detail: detail.into(),
            at: Utc::now(),
        }
    }
}

/// Sink for coordinator events
pub trait FleetReporter: Send + Sync {
    fn report(&self, event: FleetEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl FleetReporter for NullReporter {
    fn report(&self, _event: FleetEvent) {}
}

/// Emits events as structured tracing records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl FleetReporter for TracingReporter {
    fn report(&self, event: FleetEvent) {
        let address = event.address.as_deref().unwrap_or("*");
        if event.outcome.is_failure() {
            error!(address, phase = %event.phase, outcome = %event.outcome, "{}", event.detail);
        } else if matches!(event.outcome, Outcome::NotRegistered | Outcome::Degraded) {
            warn!(address, phase = %event.phase, outcome = %event.outcome, "{}", event.detail);
        } else {
            info!(address, phase = %event.phase, outcome = %event.outcome, "{}", event.detail);
        }
    }
}

/// Forwards events to an async consumer
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<FleetEvent>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::UnboundedSender<FleetEvent>) -> Self {
        Self { tx }
    }

    /// Create a reporter together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FleetEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FleetReporter for ChannelReporter {
    fn report(&self, event: FleetEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<FleetEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FleetEvent> {
        self.lock().clone()
    }

    /// A panicking holder leaves the recorded events intact
    fn lock(&self) -> MutexGuard<'_, Vec<FleetEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Events concerning one address, in emission order
    pub fn events_for(&self, address: &str) -> Vec<FleetEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.address.as_deref() == Some(address))
            .collect()
    }

    pub fn with_outcome(&self, outcome: Outcome) -> Vec<FleetEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.outcome == outcome)
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl FleetReporter for MemoryReporter {
    fn report(&self, event: FleetEvent) {
        self.lock().push(event);
    }
}
