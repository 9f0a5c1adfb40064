//! Fleet Coordinator
//!
//! Configures a set of remote engines with bounded, fixed-delay retries and
//! broadcasts lifecycle operations to every configured engine. Each remote
//! call is awaited in turn, so report order follows address order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::engine::{EngineFactory, EngineHandle, Workload};
use super::options::{FleetOptions, Properties};
use super::registry::FleetRegistry;
use super::report::{FleetEvent, FleetReporter, Outcome, Phase};
use crate::error::{EngineError, FleetError, Result};

/// Lifecycle operation sent to every registered engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Broadcast {
    Start,
    Stop,
    Shutdown,
    Exit,
}

impl Broadcast {
    fn phase(self) -> Phase {
        match self {
            Broadcast::Start => Phase::Start,
            Broadcast::Stop => Phase::Stop,
            Broadcast::Shutdown => Phase::Shutdown,
            Broadcast::Exit => Phase::Exit,
        }
    }

    fn operation(self) -> &'static str {
        match self {
            Broadcast::Start => "run_test",
            Broadcast::Stop | Broadcast::Shutdown => "stop_test",
            Broadcast::Exit => "exit",
        }
    }
}

/// Orchestrates configuration and lifecycle of a distributed engine fleet
pub struct FleetCoordinator {
    factory: Arc<dyn EngineFactory>,
    reporter: Arc<dyn FleetReporter>,
    registry: FleetRegistry,
    /// Addresses the latest init could not configure
    unconfigured: Vec<String>,
    initialized: bool,
    call_timeout: Option<Duration>,
}

impl FleetCoordinator {
    pub fn new(factory: Arc<dyn EngineFactory>, reporter: Arc<dyn FleetReporter>) -> Self {
        Self {
            factory,
            reporter,
            registry: FleetRegistry::new(),
            unconfigured: Vec::new(),
            initialized: false,
            call_timeout: None,
        }
    }

    /// Configure every address, retrying the unconfigured ones for up to
    /// `retry_count` rounds.
    ///
    /// Returns `FatalInit` (after stopping the engines that did configure) when
    /// some address never configures and either `continue_on_fail` is off or
    /// no engine configured at all. Otherwise the fleet runs degraded.
    pub async fn init(
        &mut self,
        addresses: &[String],
        workload: &Workload,
        options: &FleetOptions,
    ) -> Result<()> {
        options.validate()?;
        if addresses.is_empty() {
            return Err(FleetError::Validation(
                "at least one engine address is required".to_string(),
            ));
        }

        self.call_timeout = options.call_timeout;
        self.unconfigured.clear();
        self.initialized = true;

        info!(
            engines = addresses.len(),
            retry_count = options.retry_count,
            "Configuring engine fleet"
        );

        let mut working: Vec<String> = addresses.to_vec();
        for round in 0..options.retry_count {
            if round > 0 {
                if !options.retry_delay.is_zero() {
                    tokio::time::sleep(options.retry_delay).await;
                }
                self.reporter.report(FleetEvent::fleet(
                    Phase::Retry,
                    Outcome::Retrying,
                    format!("retrying: {}", working.join(", ")),
                ));
                debug!(round = round + 1, remaining = working.len(), "Starting retry round");
            }

            working = self
                .configure_round(&working, workload, &options.properties)
                .await;
            if working.is_empty() {
                break;
            }
        }

        if working.is_empty() {
            self.reporter.report(FleetEvent::fleet(
                Phase::Init,
                Outcome::Succeeded,
                format!("{} engine(s) configured", self.registry.len()),
            ));
            info!(engines = self.registry.len(), "Engine fleet configured");
            return Ok(());
        }

        let mut unconfigured: Vec<String> = Vec::with_capacity(working.len());
        for address in working {
            if !unconfigured.contains(&address) {
                unconfigured.push(address);
            }
        }
        for address in &unconfigured {
            self.reporter.report(FleetEvent::engine(
                address,
                Phase::Init,
                Outcome::Unconfigured,
                format!(
                    "not configured after {} attempt(s)",
                    options.retry_count
                ),
            ));
        }
        self.unconfigured = unconfigured.clone();

        if !options.continue_on_fail || self.registry.is_empty() {
            let reason = if self.registry.is_empty() {
                "no engine could be configured"
            } else {
                "continue_on_fail is disabled"
            };
            self.reporter.report(FleetEvent::fleet(
                Phase::Init,
                Outcome::Aborted,
                format!(
                    "{}; stopping {} configured engine(s)",
                    reason,
                    self.registry.len()
                ),
            ));
            debug!(
                unconfigured = ?unconfigured,
                configured = self.registry.len(),
                "Fleet initialization aborted: {}",
                reason
            );
            self.stop().await;
            return Err(FleetError::FatalInit { unconfigured });
        }

        self.reporter.report(FleetEvent::fleet(
            Phase::Init,
            Outcome::Degraded,
            format!(
                "continuing with {} engine(s); excluded: {}",
                self.registry.len(),
                unconfigured.join(", ")
            ),
        ));
        debug!(
            excluded = ?unconfigured,
            engines = self.registry.len(),
            "Engine fleet running degraded"
        );
        Ok(())
    }

    /// Attempt every address of one round and return the ones to retry
    async fn configure_round(
        &mut self,
        snapshot: &[String],
        workload: &Workload,
        properties: &Properties,
    ) -> Vec<String> {
        let mut failed = Vec::new();

        for address in snapshot {
            match self.configure_engine(address, workload, properties).await {
                Ok(handle) => {
                    // A duplicate address replaces its earlier handle; both
                    // point at the same engine, so nothing is torn down.
                    if self.registry.insert(address.clone(), handle).is_some() {
                        debug!(address = %address, "Replaced earlier handle for duplicate address");
                    }
                    self.reporter.report(FleetEvent::engine(
                        address,
                        Phase::Configure,
                        Outcome::Succeeded,
                        "engine configured",
                    ));
                    debug!(address = %address, "Engine configured");
                }
                Err((phase, err)) => {
                    if self.registry.remove(address).is_some() {
                        debug!(address = %address, "Dropped earlier handle after failed attempt");
                    }
                    self.reporter.report(FleetEvent::engine(
                        address,
                        phase,
                        Outcome::Failed,
                        err.to_string(),
                    ));
                    debug!(
                        address = %address,
                        phase = %phase,
                        error = %err,
                        retryable = err.is_retryable(),
                        "Engine configuration failed"
                    );
                    failed.push(address.clone());
                }
            }
        }

        // Registered addresses are final even if a duplicate entry failed.
        failed.retain(|address| !self.registry.contains(address));
        failed
    }

    async fn configure_engine(
        &self,
        address: &str,
        workload: &Workload,
        properties: &Properties,
    ) -> std::result::Result<Box<dyn EngineHandle>, (Phase, EngineError)> {
        let handle = self
            .guarded("create", self.factory.create(address))
            .await
            .map_err(|e| (Phase::Connect, e))?;

        self.guarded("configure", handle.configure(workload))
            .await
            .map_err(|e| (Phase::Configure, e))?;

        if !properties.is_empty() {
            self.guarded("set_properties", handle.set_properties(properties))
                .await
                .map_err(|e| (Phase::SetProperties, e))?;
        }

        Ok(handle)
    }

    /// Start the workload on every registered engine
    pub async fn start(&self) {
        self.start_on(&self.registered_addresses()).await;
    }

    pub async fn start_on(&self, addresses: &[String]) {
        self.broadcast(Broadcast::Start, addresses).await;
    }

    /// Gracefully stop every registered engine
    pub async fn stop(&self) {
        self.stop_on(&self.registered_addresses()).await;
    }

    pub async fn stop_on(&self, addresses: &[String]) {
        self.broadcast(Broadcast::Stop, addresses).await;
    }

    /// Stop every registered engine without waiting for in-flight work
    pub async fn shutdown(&self) {
        self.shutdown_on(&self.registered_addresses()).await;
    }

    pub async fn shutdown_on(&self, addresses: &[String]) {
        self.broadcast(Broadcast::Shutdown, addresses).await;
    }

    /// Tell every registered engine process to exit
    pub async fn exit(&self) {
        self.exit_on(&self.registered_addresses()).await;
    }

    pub async fn exit_on(&self, addresses: &[String]) {
        self.broadcast(Broadcast::Exit, addresses).await;
    }

    async fn broadcast(&self, op: Broadcast, addresses: &[String]) {
        let phase = op.phase();
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut missing = 0usize;

        for address in addresses {
            let Some(handle) = self.registry.get(address) else {
                missing += 1;
                self.reporter.report(FleetEvent::engine(
                    address,
                    phase,
                    Outcome::NotRegistered,
                    "not registered",
                ));
                continue;
            };

            let result = match op {
                Broadcast::Start => self.guarded(op.operation(), handle.run_test()).await,
                Broadcast::Stop => self.guarded(op.operation(), handle.stop_test(true)).await,
                Broadcast::Shutdown => self.guarded(op.operation(), handle.stop_test(false)).await,
                Broadcast::Exit => self.guarded(op.operation(), handle.exit()).await,
            };

            match result {
                Ok(()) => {
                    succeeded += 1;
                    self.reporter.report(FleetEvent::engine(
                        address,
                        phase,
                        Outcome::Succeeded,
                        format!("{} ok", op.operation()),
                    ));
                }
                Err(err) => {
                    failed += 1;
                    self.reporter.report(FleetEvent::engine(
                        address,
                        phase,
                        Outcome::Failed,
                        err.to_string(),
                    ));
                }
            }
        }

        info!(
            phase = %phase,
            succeeded,
            failed,
            not_registered = missing,
            "Fleet broadcast complete"
        );
    }

    /// Bound a remote call by the configured call timeout
    async fn guarded<T, F>(&self, operation: &str, call: F) -> std::result::Result<T, EngineError>
    where
        F: Future<Output = std::result::Result<T, EngineError>>,
    {
        match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout {
                    operation: operation.to_string(),
                    elapsed_ms: limit.as_millis() as u64,
                }),
            },
            None => call.await,
        }
    }

    /// Snapshot of addresses with a configured engine
    pub fn registered_addresses(&self) -> Vec<String> {
        self.registry.addresses()
    }

    /// True once an init has run and left no address unconfigured
    pub fn is_fully_configured(&self) -> bool {
        self.initialized && self.unconfigured.is_empty()
    }

    /// Addresses the latest init gave up on
    pub fn unconfigured(&self) -> &[String] {
        &self.unconfigured
    }

    pub fn engine_count(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::engine::{MockEngineFactory, MockEngineHandle};
    use crate::fleet::report::MemoryReporter;
    use async_trait::async_trait;

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    fn workload() -> Workload {
        Workload::new(serde_json::json!({"threads": 4}))
    }

    fn quick_options() -> FleetOptions {
        FleetOptions::default().with_retry_delay(Duration::ZERO)
    }

    /// Factory whose handles accept configure and run `customize` per address
    fn factory_with<F>(customize: F) -> MockEngineFactory
    where
        F: Fn(&str, &mut MockEngineHandle) + Send + Sync + 'static,
    {
        let mut factory = MockEngineFactory::new();
        factory.expect_create().returning(move |address| {
            let mut handle = MockEngineHandle::new();
            handle.expect_configure().returning(|_| Ok(()));
            customize(address, &mut handle);
            Ok(Box::new(handle) as Box<dyn EngineHandle>)
        });
        factory
    }

    #[tokio::test]
    async fn test_start_isolates_failing_engine() {
        let factory = factory_with(|address, handle| {
            if address == "a1" {
                handle
                    .expect_run_test()
                    .times(1)
                    .returning(|| Err(EngineError::Engine("disk full".into())));
            } else {
                handle.expect_run_test().times(1).returning(|| Ok(()));
            }
        });
        let reporter = Arc::new(MemoryReporter::new());
        let mut coordinator = FleetCoordinator::new(Arc::new(factory), reporter.clone());

        coordinator
            .init(&addrs(&["a1", "a2"]), &workload(), &quick_options())
            .await
            .unwrap();
        coordinator.start().await;

        let failures: Vec<_> = reporter
            .events()
            .into_iter()
            .filter(|e| e.phase == Phase::Start && e.outcome == Outcome::Failed)
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].address.as_deref(), Some("a1"));
        assert!(failures[0].detail.contains("disk full"));
    }

    #[tokio::test]
    async fn test_stop_twice_never_raises() {
        let factory = factory_with(|_, handle| {
            let mut calls = 0;
            handle
                .expect_stop_test()
                .withf(|graceful| *graceful)
                .times(2)
                .returning(move |_| {
                    calls += 1;
                    if calls == 1 {
                        Ok(())
                    } else {
                        Err(EngineError::Engine("already stopped".into()))
                    }
                });
        });
        let reporter = Arc::new(MemoryReporter::new());
        let mut coordinator = FleetCoordinator::new(Arc::new(factory), reporter.clone());
        coordinator
            .init(&addrs(&["a1"]), &workload(), &quick_options())
            .await
            .unwrap();

        coordinator.stop().await;
        coordinator.stop().await;

        let stops = reporter
            .events()
            .into_iter()
            .filter(|e| e.phase == Phase::Stop)
            .map(|e| e.outcome)
            .collect::<Vec<_>>();
        assert_eq!(stops, vec![Outcome::Succeeded, Outcome::Failed]);
        assert_eq!(coordinator.registered_addresses(), addrs(&["a1"]));
    }

    #[tokio::test]
    async fn test_shutdown_and_exit_use_matching_operations() {
        let factory = factory_with(|_, handle| {
            handle
                .expect_stop_test()
                .withf(|graceful| !*graceful)
                .times(1)
                .returning(|_| Ok(()));
            handle
                .expect_exit()
                .times(1)
                .returning(|| Err(EngineError::Engine("connection reset".into())));
        });
        let reporter = Arc::new(MemoryReporter::new());
        let mut coordinator = FleetCoordinator::new(Arc::new(factory), reporter.clone());
        coordinator
            .init(&addrs(&["a1"]), &workload(), &quick_options())
            .await
            .unwrap();

        coordinator.shutdown().await;
        coordinator.exit().await;

        assert_eq!(coordinator.engine_count(), 1);
        let exit_events = reporter
            .events()
            .into_iter()
            .filter(|e| e.phase == Phase::Exit)
            .collect::<Vec<_>>();
        assert_eq!(exit_events.len(), 1);
        assert_eq!(exit_events[0].outcome, Outcome::Failed);
    }

    #[tokio::test]
    async fn test_broadcast_reports_unregistered_address() {
        let factory = factory_with(|_, handle| {
            handle.expect_run_test().times(1).returning(|| Ok(()));
        });
        let reporter = Arc::new(MemoryReporter::new());
        let mut coordinator = FleetCoordinator::new(Arc::new(factory), reporter.clone());
        coordinator
            .init(&addrs(&["a1"]), &workload(), &quick_options())
            .await
            .unwrap();

        coordinator.start_on(&addrs(&["ghost", "a1"])).await;

        let ghost = reporter.events_for("ghost");
        assert_eq!(ghost.len(), 1);
        assert_eq!(ghost[0].outcome, Outcome::NotRegistered);
        assert_eq!(ghost[0].detail, "not registered");
    }

    #[tokio::test]
    async fn test_properties_pushed_only_when_present() {
        let mut factory = MockEngineFactory::new();
        factory.expect_create().times(2).returning(|_| {
            let mut handle = MockEngineHandle::new();
            handle.expect_configure().returning(|_| Ok(()));
            handle
                .expect_set_properties()
                .withf(|props| props.get("users").map(String::as_str) == Some("100"))
                .times(1)
                .returning(|_| Ok(()));
            Ok(Box::new(handle) as Box<dyn EngineHandle>)
        });
        let mut coordinator =
            FleetCoordinator::new(Arc::new(factory), Arc::new(MemoryReporter::new()));
        let options = quick_options().with_property("users", "100");

        coordinator
            .init(&addrs(&["a1", "a2"]), &workload(), &options)
            .await
            .unwrap();
        assert!(coordinator.is_fully_configured());

        // No set_properties expectation: an empty bag must not be sent.
        let bare = factory_with(|_, _| {});
        let mut coordinator = FleetCoordinator::new(Arc::new(bare), Arc::new(MemoryReporter::new()));
        coordinator
            .init(&addrs(&["a1"]), &workload(), &quick_options())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_properties_failure_is_retried() {
        let mut factory = MockEngineFactory::new();
        let mut attempt = 0;
        factory.expect_create().times(2).returning(move |_| {
            attempt += 1;
            let fail = attempt == 1;
            let mut handle = MockEngineHandle::new();
            handle.expect_configure().returning(|_| Ok(()));
            handle.expect_set_properties().returning(move |_| {
                if fail {
                    Err(EngineError::Configuration("unknown property".into()))
                } else {
                    Ok(())
                }
            });
            Ok(Box::new(handle) as Box<dyn EngineHandle>)
        });
        let reporter = Arc::new(MemoryReporter::new());
        let mut coordinator = FleetCoordinator::new(Arc::new(factory), reporter.clone());
        let options = quick_options()
            .with_retry_count(2)
            .with_property("users", "5");

        coordinator
            .init(&addrs(&["a1"]), &workload(), &options)
            .await
            .unwrap();

        let events = reporter.events_for("a1");
        assert_eq!(events[0].phase, Phase::SetProperties);
        assert_eq!(events[0].outcome, Outcome::Failed);
        assert_eq!(events[1].outcome, Outcome::Succeeded);
    }

    #[tokio::test]
    async fn test_rejects_empty_addresses_and_zero_retries() {
        let mut coordinator = FleetCoordinator::new(
            Arc::new(MockEngineFactory::new()),
            Arc::new(MemoryReporter::new()),
        );

        let err = coordinator
            .init(&[], &workload(), &quick_options())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));

        let err = coordinator
            .init(&addrs(&["a1"]), &workload(), &quick_options().with_retry_count(0))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
        assert!(!coordinator.is_fully_configured());
    }

    #[tokio::test]
    async fn test_duplicate_keeps_latest_handle() {
        let mut factory = MockEngineFactory::new();
        let mut a1_handles = 0;
        factory.expect_create().returning(move |address| {
            if address == "bad" {
                return Err(EngineError::Connect {
                    address: address.to_string(),
                    reason: "refused".into(),
                });
            }
            a1_handles += 1;
            let mut handle = MockEngineHandle::new();
            handle.expect_configure().returning(|_| Ok(()));
            if a1_handles == 1 {
                handle.expect_stop_test().never();
            } else {
                handle.expect_stop_test().times(1).returning(|_| Ok(()));
            }
            Ok(Box::new(handle) as Box<dyn EngineHandle>)
        });
        let reporter = Arc::new(MemoryReporter::new());
        let mut coordinator = FleetCoordinator::new(Arc::new(factory), reporter.clone());

        let err = coordinator
            .init(&addrs(&["a1", "a1", "bad"]), &workload(), &quick_options())
            .await
            .unwrap_err();

        assert_eq!(err.unconfigured(), addrs(&["bad"]).as_slice());
        assert_eq!(coordinator.registered_addresses(), addrs(&["a1"]));
        let stops = reporter
            .events_for("a1")
            .into_iter()
            .filter(|e| e.phase == Phase::Stop)
            .count();
        assert_eq!(stops, 1);
    }

    /// Engine whose `stall` operation never completes
    struct HangingEngine {
        stall: &'static str,
    }

    impl HangingEngine {
        async fn call(&self, operation: &str) -> std::result::Result<(), EngineError> {
            if self.stall == operation {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl EngineHandle for HangingEngine {
        async fn configure(&self, _workload: &Workload) -> std::result::Result<(), EngineError> {
            self.call("configure").await
        }
        async fn set_properties(
            &self,
            _properties: &Properties,
        ) -> std::result::Result<(), EngineError> {
            Ok(())
        }
        async fn run_test(&self) -> std::result::Result<(), EngineError> {
            self.call("run_test").await
        }
        async fn stop_test(&self, _graceful: bool) -> std::result::Result<(), EngineError> {
            Ok(())
        }
        async fn exit(&self) -> std::result::Result<(), EngineError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_counts_as_failure() {
        let mut factory = MockEngineFactory::new();
        factory
            .expect_create()
            .returning(|_| Ok(Box::new(HangingEngine { stall: "configure" }) as Box<dyn EngineHandle>));
        let reporter = Arc::new(MemoryReporter::new());
        let mut coordinator = FleetCoordinator::new(Arc::new(factory), reporter.clone());
        let options = quick_options().with_call_timeout(Some(Duration::from_millis(250)));

        let err = coordinator
            .init(&addrs(&["slow"]), &workload(), &options)
            .await
            .unwrap_err();

        assert_eq!(err.unconfigured(), addrs(&["slow"]).as_slice());
        let failure = &reporter.events_for("slow")[0];
        assert_eq!(failure.phase, Phase::Configure);
        assert_eq!(failure.detail, "configure timed out after 250ms");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_start_does_not_stall_broadcast() {
        let mut factory = MockEngineFactory::new();
        factory.expect_create().returning(|address| {
            if address == "a1" {
                return Ok(Box::new(HangingEngine { stall: "run_test" }) as Box<dyn EngineHandle>);
            }
            let mut handle = MockEngineHandle::new();
            handle.expect_configure().returning(|_| Ok(()));
            handle.expect_run_test().times(1).returning(|| Ok(()));
            Ok(Box::new(handle) as Box<dyn EngineHandle>)
        });
        let reporter = Arc::new(MemoryReporter::new());
        let mut coordinator = FleetCoordinator::new(Arc::new(factory), reporter.clone());
        let options = quick_options().with_call_timeout(Some(Duration::from_millis(250)));

        coordinator
            .init(&addrs(&["a1", "a2"]), &workload(), &options)
            .await
            .unwrap();
        let started = tokio::time::Instant::now();
        coordinator.start().await;
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert!(started.elapsed() < Duration::from_secs(1));

        let a1 = reporter.events_for("a1");
        let a1_start = a1.iter().find(|e| e.phase == Phase::Start).unwrap();
        assert_eq!(a1_start.outcome, Outcome::Failed);
        assert_eq!(a1_start.detail, "run_test timed out after 250ms");

        let a2 = reporter.events_for("a2");
        let a2_start = a2.iter().find(|e| e.phase == Phase::Start).unwrap();
        assert_eq!(a2_start.outcome, Outcome::Succeeded);
    }
}
