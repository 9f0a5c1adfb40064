//! Engine collaborator traits
//!
//! The coordinator only ever talks to remote engines through these traits, so
//! any transport (HTTP, RPC, in-process fakes) can back a fleet.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::options::Properties;
use crate::error::{EngineError, FleetError, Result};

/// Opaque workload specification handed to every engine during configure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workload(serde_json::Value);

impl Workload {
    pub fn new(plan: serde_json::Value) -> Self {
        Self(plan)
    }

    pub fn plan(&self) -> &serde_json::Value {
        &self.0
    }

    /// Load a workload from a `.json` or `.toml` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let plan = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str::<serde_json::Value>(&raw)?,
            Some("json") | None => serde_json::from_str(&raw)?,
            Some(other) => {
                return Err(FleetError::Validation(format!(
                    "unsupported workload format '.{}' (expected .json or .toml)",
                    other
                )))
            }
        };
        Ok(Self(plan))
    }
}

impl From<serde_json::Value> for Workload {
    fn from(plan: serde_json::Value) -> Self {
        Self(plan)
    }
}

/// Local proxy for one remote engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Load the workload into the engine
    async fn configure(&self, workload: &Workload) -> std::result::Result<(), EngineError>;

    /// Push the shared properties bag
    async fn set_properties(&self, properties: &Properties)
        -> std::result::Result<(), EngineError>;

    /// Begin executing the configured workload
    async fn run_test(&self) -> std::result::Result<(), EngineError>;

    /// Stop the running workload, letting in-flight work finish when `graceful`
    async fn stop_test(&self, graceful: bool) -> std::result::Result<(), EngineError>;

    /// Ask the remote engine process to terminate
    async fn exit(&self) -> std::result::Result<(), EngineError>;
}

/// Creates engine handles for addresses
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self, address: &str)
        -> std::result::Result<Box<dyn EngineHandle>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("fleetctl-{}-{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_workload_from_json() {
        let path = temp_file("plan.json", r#"{"threads": 10, "duration_secs": 60}"#);
        let workload = Workload::from_file(&path).unwrap();
        assert_eq!(workload.plan()["threads"], 10);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_workload_from_toml() {
        let path = temp_file("plan.toml", "name = \"checkout\"\nthreads = 25\n");
        let workload = Workload::from_file(&path).unwrap();
        assert_eq!(workload.plan()["name"], "checkout");
        assert_eq!(workload.plan()["threads"], 25);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_workload_unknown_extension() {
        let path = temp_file("plan.yaml", "threads: 1");
        let err = Workload::from_file(&path).unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_workload_serializes_transparently() {
        let workload = Workload::new(serde_json::json!({"threads": 2}));
        assert_eq!(serde_json::to_string(&workload).unwrap(), r#"{"threads":2}"#);
    }
}
