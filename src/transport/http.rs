//! HTTP engine adapter
//!
//! Reaches a remote engine over a small JSON/HTTP control API:
//! `GET /health`, `POST /configure`, `POST /properties`, `POST /run`,
//! `POST /stop?graceful=<bool>`, `POST /exit`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::{EngineError, FleetError, Result};
use crate::fleet::{EngineFactory, EngineHandle, Properties, Workload};

/// Which family of engine call a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    /// configure / set_properties
    Setup,
    /// run / stop / exit
    Lifecycle,
}

impl CallKind {
    fn transport_error(self, err: reqwest::Error) -> EngineError {
        match self {
            CallKind::Setup => EngineError::Configuration(err.to_string()),
            CallKind::Lifecycle => EngineError::Engine(err.to_string()),
        }
    }

    fn status_error(self, status: StatusCode, detail: String) -> EngineError {
        let message = if detail.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, detail)
        };
        match (self, status) {
            (_, StatusCode::CONFLICT) => EngineError::IllegalState(message),
            (CallKind::Setup, s) if s.is_client_error() => EngineError::Configuration(message),
            _ => EngineError::Engine(message),
        }
    }
}

/// Creates [`HttpEngine`] handles after probing the engine's health endpoint
#[derive(Debug, Clone)]
pub struct HttpEngineFactory {
    client: Client,
    scheme: String,
}

impl HttpEngineFactory {
    pub fn new(scheme: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("fleetctl/0.1")
            .timeout(request_timeout)
            .build()
            .map_err(|e| FleetError::Internal(format!("failed to build engine HTTP client: {}", e)))?;

        Ok(Self::with_client(client, scheme))
    }

    pub fn with_client(client: Client, scheme: &str) -> Self {
        Self {
            client,
            scheme: scheme.trim_end_matches("://").to_string(),
        }
    }

    /// Base URL of the engine control API for an address
    pub fn base_url(&self, address: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}://{}/", self.scheme, address))?)
    }
}

#[async_trait]
impl EngineFactory for HttpEngineFactory {
    async fn create(&self, address: &str) -> std::result::Result<Box<dyn EngineHandle>, EngineError> {
        let connect_error = |reason: String| EngineError::Connect {
            address: address.to_string(),
            reason,
        };

        let base = self.base_url(address).map_err(|e| connect_error(e.to_string()))?;
        let health = base.join("health").map_err(|e| connect_error(e.to_string()))?;

        let response = self
            .client
            .get(health)
            .send()
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(connect_error(format!(
                "health check returned {}",
                response.status()
            )));
        }

        debug!(address, "Engine reachable");
        Ok(Box::new(HttpEngine {
            client: self.client.clone(),
            base,
        }))
    }
}

/// Handle for one engine behind the HTTP control API
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: Client,
    base: Url,
}

impl HttpEngine {
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, EngineError> {
        self.base
            .join(path)
            .map_err(|e| EngineError::Engine(format!("invalid endpoint '{}': {}", path, e)))
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        kind: CallKind,
        path: &str,
        body: &B,
    ) -> std::result::Result<(), EngineError> {
        let request = self.client.post(self.endpoint(path)?).json(body);
        self.dispatch(kind, request).await
    }

    async fn post_empty(&self, kind: CallKind, path: &str) -> std::result::Result<(), EngineError> {
        let request = self.client.post(self.endpoint(path)?);
        self.dispatch(kind, request).await
    }

    async fn dispatch(
        &self,
        kind: CallKind,
        request: RequestBuilder,
    ) -> std::result::Result<(), EngineError> {
        let response = request.send().await.map_err(|e| kind.transport_error(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        Err(kind.status_error(status, detail.trim().to_string()))
    }
}

#[async_trait]
impl EngineHandle for HttpEngine {
    async fn configure(&self, workload: &Workload) -> std::result::Result<(), EngineError> {
        self.post_json(CallKind::Setup, "configure", workload).await
    }

    async fn set_properties(&self, properties: &Properties) -> std::result::Result<(), EngineError> {
        self.post_json(CallKind::Setup, "properties", properties).await
    }

    async fn run_test(&self) -> std::result::Result<(), EngineError> {
        self.post_empty(CallKind::Lifecycle, "run").await
    }

    async fn stop_test(&self, graceful: bool) -> std::result::Result<(), EngineError> {
        let path = format!("stop?graceful={}", graceful);
        self.post_empty(CallKind::Lifecycle, &path).await
    }

    async fn exit(&self) -> std::result::Result<(), EngineError> {
        self.post_empty(CallKind::Lifecycle, "exit").await
    }
}
