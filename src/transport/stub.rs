//! In-process stub engine
//!
//! Serves the HTTP control API consumed by [`super::HttpEngine`] with a small
//! state machine, for exercising a fleet without real engines.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{Notify, RwLock};
use tracing::info;

use crate::error::{FleetError, Result};
use crate::fleet::Properties;

/// Lifecycle state of the stub engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StubState {
    Idle,
    Configured,
    Running,
    Stopped,
    Exited,
}

/// Observable state of the stub engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StubStatus {
    pub state: StubState,
    pub workload: Option<serde_json::Value>,
    pub properties: Properties,
    pub runs: u32,
    pub last_stop_graceful: Option<bool>,
}

/// Shared stub engine behind the router
pub struct StubEngine {
    status: RwLock<StubStatus>,
    /// Configure requests still to be rejected with 422
    reject_configures: RwLock<u32>,
    exited: Notify,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(StubStatus {
                state: StubState::Idle,
                workload: None,
                properties: Properties::new(),
                runs: 0,
                last_stop_graceful: None,
            }),
            reject_configures: RwLock::new(0),
            exited: Notify::new(),
        }
    }

    /// Reject the first `count` configure requests
    pub fn rejecting_configures(count: u32) -> Self {
        Self {
            reject_configures: RwLock::new(count),
            ..Self::new()
        }
    }

    pub async fn status(&self) -> StubStatus {
        self.status.read().await.clone()
    }

    /// Resolves once `/exit` has been called
    pub async fn wait_exited(&self) {
        self.exited.notified().await;
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct StopParams {
    #[serde(default = "default_graceful")]
    graceful: bool,
}

fn default_graceful() -> bool {
    true
}

/// Router implementing the engine control API
pub fn router(engine: Arc<StubEngine>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/configure", post(configure_handler))
        .route("/properties", post(properties_handler))
        .route("/run", post(run_handler))
        .route("/stop", post(stop_handler))
        .route("/exit", post(exit_handler))
        .with_state(engine)
}

/// Serve the stub until `/exit` is called
pub async fn serve(listener: TcpListener, engine: Arc<StubEngine>) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Stub engine listening on {}", addr);

    let shutdown = Arc::clone(&engine);
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async move { shutdown.wait_exited().await })
        .await
        .map_err(|e| FleetError::Internal(format!("Stub engine server error: {}", e)))?;

    info!("Stub engine on {} exited", addr);
    Ok(())
}

async fn health_handler(State(engine): State<Arc<StubEngine>>) -> impl IntoResponse {
    let status = engine.status.read().await;
    if status.state == StubState::Exited {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    (StatusCode::OK, Json(serde_json::json!({ "state": status.state }))).into_response()
}

async fn status_handler(State(engine): State<Arc<StubEngine>>) -> impl IntoResponse {
    Json(engine.status().await)
}

async fn configure_handler(
    State(engine): State<Arc<StubEngine>>,
    Json(workload): Json<serde_json::Value>,
) -> impl IntoResponse {
    {
        let mut remaining = engine.reject_configures.write().await;
        if *remaining > 0 {
            *remaining -= 1;
            return (StatusCode::UNPROCESSABLE_ENTITY, "workload rejected").into_response();
        }
    }

    let mut status = engine.status.write().await;
    match status.state {
        StubState::Running => (StatusCode::CONFLICT, "engine is running").into_response(),
        StubState::Exited => (StatusCode::CONFLICT, "engine has exited").into_response(),
        _ => {
            status.workload = Some(workload);
            status.state = StubState::Configured;
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

async fn properties_handler(
    State(engine): State<Arc<StubEngine>>,
    Json(properties): Json<Properties>,
) -> impl IntoResponse {
    let mut status = engine.status.write().await;
    if status.workload.is_none() {
        return (StatusCode::CONFLICT, "engine not configured").into_response();
    }
    status.properties.extend(properties);
    StatusCode::NO_CONTENT.into_response()
}

async fn run_handler(State(engine): State<Arc<StubEngine>>) -> impl IntoResponse {
    let mut status = engine.status.write().await;
    match status.state {
        StubState::Configured | StubState::Stopped => {
            status.state = StubState::Running;
            status.runs += 1;
            StatusCode::NO_CONTENT.into_response()
        }
        StubState::Idle => (StatusCode::CONFLICT, "engine not configured").into_response(),
        StubState::Running => (StatusCode::CONFLICT, "engine already running").into_response(),
        StubState::Exited => (StatusCode::CONFLICT, "engine has exited").into_response(),
    }
}

async fn stop_handler(
    State(engine): State<Arc<StubEngine>>,
    Query(params): Query<StopParams>,
) -> impl IntoResponse {
    let mut status = engine.status.write().await;
    if status.state != StubState::Running {
        return (StatusCode::CONFLICT, "engine not running").into_response();
    }
    status.state = StubState::Stopped;
    status.last_stop_graceful = Some(params.graceful);
    StatusCode::NO_CONTENT.into_response()
}

async fn exit_handler(State(engine): State<Arc<StubEngine>>) -> impl IntoResponse {
    engine.status.write().await.state = StubState::Exited;
    engine.exited.notify_one();
    StatusCode::NO_CONTENT
}
