//! Hub HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/hub/health` | Liveness |
//! | GET | `/hub/ready` | Readiness (checks every handler) |
//! | POST | `/hub/process` | Route one message |
//! | POST | `/hub/batch` | Route a batch |
//! | GET | `/metrics` | Prometheus metrics |
//! | any | other | 404 JSON error envelope |
//!
//! # Request Flow
//!
//! 1. Assign/propagate `x-request-id` and open the request span
//! 2. Acquire a semaphore permit before the body is read (or return 503)
//! 3. Enforce the body size limit (413)
//! 4. Parse the message or batch
//! 5. Route via [`MessageHub`]
//! 6. Return the handler envelope or a JSON error envelope

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State, rejection::BytesRejection},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use prometheus_client::registry::Registry;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::HubConfig;
use crate::error::HubError;
use crate::hub::MessageHub;
use crate::logging_layer::{ensure_request_id, logging_layer, request_id};
use crate::message::{BatchRequest, Message};
use crate::metrics::HubMetrics;
use crate::transport::handler_client::{HandlerClient, HandlerClientConfig};
use crate::transport::router::MessageRouter;

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "MessageHub";

/// Shared state for hub request handlers.
pub struct HubState {
    pub hub: MessageHub,
    pub semaphore: Arc<Semaphore>,
    pub registry: Arc<Registry>,
    pub metrics: Option<Arc<HubMetrics>>,
    pub max_body_size: usize,
}

/// The hub HTTP server.
pub struct HubServer {
    listen_addr: String,
    state: Arc<HubState>,
}

impl HubServer {
    /// Build the full production stack from configuration: metrics
    /// registry, pooled handler client, routing table and hub.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Internal` if the handler client cannot be built.
    pub fn from_config(config: &HubConfig) -> Result<Self, HubError> {
        let mut registry = Registry::default();
        let metrics = Arc::new(HubMetrics::new(&mut registry));

        let client = HandlerClient::new(HandlerClientConfig::from(config))?
            .with_metrics(metrics.clone());
        let hub = MessageHub::new(MessageRouter::new(config), Arc::new(client))
            .with_batch_concurrency(config.batch_concurrency)
            .with_metrics(metrics.clone());

        Ok(Self::new(config, hub, Arc::new(registry), Some(metrics)))
    }

    /// Create a server around an already-built hub.
    pub fn new(
        config: &HubConfig,
        hub: MessageHub,
        registry: Arc<Registry>,
        metrics: Option<Arc<HubMetrics>>,
    ) -> Self {
        Self {
            listen_addr: config.listen_addr.clone(),
            state: Arc::new(HubState {
                hub,
                semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
                registry,
                metrics,
                max_body_size: config.max_body_bytes,
            }),
        }
    }

    pub fn state(&self) -> &Arc<HubState> {
        &self.state
    }

    /// Create the axum Router.
    ///
    /// Layers run outermost first: request id, trace span, body limit.
    /// The processing routes additionally hold a concurrency permit.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/hub/process", post(process_handler))
            .route("/hub/batch", post(batch_handler))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                limit_concurrency,
            ))
            .route("/hub/health", get(health_handler))
            .route("/hub/ready", get(ready_handler))
            .route("/metrics", get(metrics_handler))
            .fallback(not_found_handler)
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn(ensure_request_id))
                    .layer(logging_layer())
                    .layer(DefaultBodyLimit::max(self.state.max_body_size)),
            )
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or serve.
    pub async fn run(
        self,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` is cancelled,
    /// then drain in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(addr = %listener.local_addr()?, "Hub server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("Hub server shutting down");
            })
            .await?;

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /hub/health`: liveness. Does not touch the handlers.
async fn health_handler() -> Response {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
    .into_response()
}

/// `GET /hub/ready`: 200 when every handler's `/health` answers 2xx, else 503.
async fn ready_handler(State(state): State<Arc<HubState>>) -> Response {
    let checks = state.hub.handler_health().await;
    let all_healthy = checks.iter().all(|(_, healthy)| *healthy);

    let handlers: Vec<_> = checks
        .iter()
        .map(|(binding, healthy)| {
            json!({
                "type": binding.kind.as_str(),
                "service": binding.service,
                "url": binding.base_url,
                "healthy": healthy,
            })
        })
        .collect();

    let (status, label) = if all_healthy {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (status, Json(json!({ "status": label, "handlers": handlers }))).into_response()
}

/// `POST /hub/process`: route one message.
async fn process_handler(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let correlation_id = correlation_id(&headers);

    let result = async {
        let body = read_body(&state, body)?;
        let message = Message::from_slice(&body)?;
        state.hub.route(&message, &correlation_id).await
    }
    .await;

    match result {
        Ok(routed) => Json(routed).into_response(),
        Err(e) => state.error_response(e, &correlation_id),
    }
}

/// `POST /hub/batch`: route a batch.
async fn batch_handler(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let correlation_id = correlation_id(&headers);

    let result = async {
        let body = read_body(&state, body)?;
        let batch = BatchRequest::from_slice(&body)?;
        Ok::<_, HubError>(state.hub.route_batch(batch, &correlation_id).await)
    }
    .await;

    match result {
        Ok(batch) => Json(batch).into_response(),
        Err(e) => state.error_response(e, &correlation_id),
    }
}

/// `GET /metrics`: OpenMetrics text.
async fn metrics_handler(State(state): State<Arc<HubState>>) -> Response {
    let mut buffer = String::new();

    if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &state.registry) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buffer,
    )
        .into_response()
}

async fn not_found_handler(headers: HeaderMap, method: Method, uri: Uri) -> Response {
    HubError::RouteNotFound {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
    .into_response_with_id(&correlation_id(&headers))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

impl HubState {
    /// Render an error as a JSON envelope.
    ///
    /// Errors raised by the hub itself are already counted there; errors
    /// raised before routing (permit, body, parse) are counted here.
    fn error_response(&self, err: HubError, correlation_id: &str) -> Response {
        let before_routing = matches!(
            err,
            HubError::ServiceUnavailable { .. }
                | HubError::PayloadTooLarge { .. }
                | HubError::InvalidMessage { .. }
                | HubError::MalformedBatch { .. }
        );
        if before_routing {
            if let Some(ref metrics) = self.metrics {
                metrics.record_error(err.error_type_name());
            }
        }
        err.into_response_with_id(correlation_id)
    }
}

/// The request id set by [`ensure_request_id`], or a fresh one when the
/// handler runs without that middleware.
fn correlation_id(headers: &HeaderMap) -> String {
    request_id(headers)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Hold a semaphore permit for the whole request, rejecting with 503 before
/// the body is read when none is free.
async fn limit_concurrency(
    State(state): State<Arc<HubState>>,
    request: Request,
    next: Next,
) -> Response {
    let Ok(_permit) = state.semaphore.clone().try_acquire_owned() else {
        warn!("Max concurrent requests reached, returning 503");
        let err = HubError::ServiceUnavailable {
            reason: "max concurrent requests reached".to_string(),
        };
        return state.error_response(err, &correlation_id(request.headers()));
    };
    next.run(request).await
}

fn read_body(state: &HubState, body: Result<Bytes, BytesRejection>) -> Result<Bytes, HubError> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            HubError::PayloadTooLarge {
                limit: state.max_body_size,
            }
        } else {
            HubError::InvalidMessage {
                details: rejection.body_text(),
            }
        }
    })
}
