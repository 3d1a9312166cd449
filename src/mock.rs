//! Mock downstream handler services.
//!
//! An in-process stand-in for the Order and Payment services, used by the
//! integration tests and by the `mock-services` binary for local runs.
//!
//! Each mock answers:
//! - `POST /orders` (order profile) or `POST /payments` (payment profile)
//!   after the configured latency, with a freshly minted identifier
//! - `GET /health`
//! - anything else with a 404 JSON body
//!
//! A failure mode makes the processing endpoint reply with a fixed status
//! and JSON payload instead, for exercising hub error paths. Every response
//! carries permissive CORS headers so browser tooling can call the mocks.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderName, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::schema::{DEFAULT_ORDER_PATH, DEFAULT_PAYMENT_PATH};
use crate::message::MessageKind;
use crate::transport::router::{id_field, service_name};

/// Default artificial processing latency.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(500);

/// Builder for a mock handler service.
#[derive(Debug, Clone)]
pub struct MockHandler {
    kind: MessageKind,
    latency: Duration,
    failure: Option<(StatusCode, Value)>,
}

impl MockHandler {
    /// An Order Service mock (`POST /orders`, `orderId: ORD-...`).
    #[must_use]
    pub fn order() -> Self {
        Self::new(MessageKind::Order)
    }

    /// A Payment Service mock (`POST /payments`, `transactionId: TXN-...`).
    #[must_use]
    pub fn payment() -> Self {
        Self::new(MessageKind::Payment)
    }

    /// A mock for `kind`, with no latency and no failure.
    #[must_use]
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            latency: Duration::ZERO,
            failure: None,
        }
    }

    /// Delay every processing reply by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the processing endpoint fail with `status` and `payload`.
    #[must_use]
    pub fn with_failure(mut self, status: StatusCode, payload: Value) -> Self {
        self.failure = Some((status, payload));
        self
    }

    /// Start on an ephemeral localhost port.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the listener cannot be bound.
    pub async fn start(self) -> std::io::Result<MockHandlerHandle> {
        self.bind("127.0.0.1:0").await
    }

    /// Start on `addr`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the listener cannot be bound.
    pub async fn bind(self, addr: &str) -> std::io::Result<MockHandlerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(MockState {
            kind: self.kind,
            port: addr.port(),
            latency: self.latency,
            failure: self.failure,
            request_count: AtomicU64::new(0),
            last_request: RwLock::new(None),
        });

        let app = Router::new()
            .route("/health", get(handle_health))
            .route(processing_path(self.kind), post(handle_process))
            .fallback(handle_not_found)
            .method_not_allowed_fallback(handle_not_found)
            .layer(cors_layer())
            .with_state(state.clone());

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let service = service_name(self.kind);
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::error!(service, error = %e, "Mock handler stopped with error");
            }
        });

        info!(
            service,
            addr = %addr,
            path = processing_path(self.kind),
            "Mock handler listening"
        );

        Ok(MockHandlerHandle {
            addr,
            state,
            shutdown,
            handle,
        })
    }
}

/// Processing endpoint path for a kind (the hub's default handler paths).
pub fn processing_path(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Order => DEFAULT_ORDER_PATH,
        MessageKind::Payment => DEFAULT_PAYMENT_PATH,
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
}

fn id_prefix(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Order => "ORD",
        MessageKind::Payment => "TXN",
    }
}

/// Handle to a running mock. Dropping it stops the server.
pub struct MockHandlerHandle {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl MockHandlerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of processing requests received (health checks excluded).
    pub fn request_count(&self) -> u64 {
        self.state.request_count.load(Ordering::SeqCst)
    }

    /// Body of the last processing request received.
    pub async fn last_request(&self) -> Option<Value> {
        self.state.last_request.read().await.clone()
    }

    /// Stop the server and wait for it to drain.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for MockHandlerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug)]
struct MockState {
    kind: MessageKind,
    port: u16,
    latency: Duration,
    failure: Option<(StatusCode, Value)>,
    request_count: AtomicU64,
    last_request: RwLock<Option<Value>>,
}

async fn handle_health(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(json!({
        "service": service_name(state.kind),
        "status": "healthy",
        "port": state.port,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn handle_process(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let service = service_name(state.kind);
    state.request_count.fetch_add(1, Ordering::SeqCst);

    let request: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid JSON",
                    "service": service,
                    "details": e.to_string(),
                })),
            )
                .into_response();
        }
    };
    debug!(service, body = %request, "Mock handler received message");
    *state.last_request.write().await = Some(request.clone());

    if !state.latency.is_zero() {
        tokio::time::sleep(state.latency).await;
    }

    if let Some((status, payload)) = &state.failure {
        return (*status, Json(payload.clone())).into_response();
    }

    let identifier = format!(
        "{}-{}-{}",
        id_prefix(state.kind),
        chrono::Utc::now().timestamp_millis(),
        &Uuid::new_v4().simple().to_string()[..8]
    );
    let noun = match state.kind {
        MessageKind::Order => "Order",
        MessageKind::Payment => "Payment",
    };

    let mut reply = json!({
        "status": "success",
        "service": service,
        "originalData": request,
        "processedAt": chrono::Utc::now().to_rfc3339(),
        "message": format!("{noun} processed successfully"),
    });
    reply[id_field(state.kind)] = Value::String(identifier);

    Json(reply).into_response()
}

async fn handle_not_found(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Route not found",
            "service": service_name(state.kind),
            "path": uri.path(),
            "method": method.as_str(),
        })),
    )
        .into_response()
}
