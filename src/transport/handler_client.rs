//! Outbound HTTP client for downstream handlers.
//!
//! Maintains a pooled reqwest client shared by every handler binding and
//! classifies failures into [`HubError`] variants:
//!
//! - Timeout → `HandlerUnreachable` with `timeout_ms` set (HTTP 504)
//! - Connect/transport failure → `HandlerUnreachable` (HTTP 502)
//! - Non-2xx reply → `HandlerApplication` carrying the handler's payload (HTTP 502)
//! - 2xx reply that is not a JSON object, or too large → `InvalidHandlerResponse`
//!
//! No automatic retry: handler calls are not assumed idempotent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::config::HubConfig;
use crate::error::HubError;
use crate::logging_layer::REQUEST_ID_HEADER;
use crate::message::Message;
use crate::metrics::HubMetrics;
use crate::transport::router::HandlerBinding;

/// Configuration for the handler client.
#[derive(Debug, Clone)]
pub struct HandlerClientConfig {
    /// Request timeout (includes connection + response body)
    pub timeout: Duration,
    /// Connection timeout (TCP + TLS handshake)
    pub connect_timeout: Duration,
    /// Maximum idle connections per handler host
    pub pool_max_idle_per_host: usize,
    /// Idle connection timeout
    pub pool_idle_timeout: Duration,
    /// Maximum handler response body size in bytes
    pub max_response_size: usize,
}

impl Default for HandlerClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            max_response_size: 1024 * 1024,
        }
    }
}

impl From<&HubConfig> for HandlerClientConfig {
    fn from(config: &HubConfig) -> Self {
        Self {
            timeout: config.handler_timeout,
            // A connect timeout longer than the overall timeout never fires.
            connect_timeout: config.connect_timeout.min(config.handler_timeout),
            max_response_size: config.max_response_bytes,
            ..Self::default()
        }
    }
}

/// Pooled HTTP client for handler calls.
///
/// `Clone` is cheap; the underlying reqwest client shares its pool.
#[derive(Clone)]
pub struct HandlerClient {
    client: Client,
    config: HandlerClientConfig,
    metrics: Option<Arc<HubMetrics>>,
}

impl HandlerClient {
    /// Create a new handler client.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Internal` if the HTTP client cannot be built.
    pub fn new(config: HandlerClientConfig) -> Result<Self, HubError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| HubError::Internal {
                details: format!("failed to build handler client: {e}"),
            })?;

        Ok(Self {
            client,
            config,
            metrics: None,
        })
    }

    /// Record handler call counts and latencies into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<HubMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// POST a message to its handler and return the reply object.
    ///
    /// # Arguments
    ///
    /// * `binding` - The handler the message was classified to
    /// * `message` - Forwarded unchanged as the JSON body
    /// * `correlation_id` - Sent as `x-request-id` and used in logs
    ///
    /// # Errors
    ///
    /// See the module docs for the classification of failures.
    #[tracing::instrument(skip(self, binding, message), fields(service = binding.service))]
    pub async fn post_message(
        &self,
        binding: &HandlerBinding,
        message: &Message,
        correlation_id: &str,
    ) -> Result<Map<String, Value>, HubError> {
        debug!(
            correlation_id = %correlation_id,
            url = %binding.url,
            message_id = ?message.id_value(),
            "Dispatching message to handler"
        );

        let start = Instant::now();
        let result = self
            .client
            .post(&binding.url)
            .header(REQUEST_ID_HEADER, correlation_id)
            .json(message)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let err = self.classify_error(e, binding, correlation_id, self.config.timeout);
                self.record(binding, failure_label(&err), start);
                return Err(err);
            }
        };

        let status = response.status();

        if !status.is_success() {
            let payload = match self.read_body_limited(response, binding, correlation_id).await {
                Ok(bytes) => error_payload(&bytes),
                Err(_) => Value::Null,
            };
            self.record(binding, status.as_str(), start);
            warn!(
                correlation_id = %correlation_id,
                service = binding.service,
                status = %status,
                "Handler returned error status"
            );
            return Err(HubError::HandlerApplication {
                service: binding.service.to_string(),
                status: status.as_u16(),
                payload,
            });
        }

        let body = match self.read_body_limited(response, binding, correlation_id).await {
            Ok(body) => body,
            Err(err) => {
                self.record(binding, failure_label(&err), start);
                return Err(err);
            }
        };
        self.record(binding, status.as_str(), start);

        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => {
                debug!(
                    correlation_id = %correlation_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Received handler response"
                );
                Ok(map)
            }
            Ok(_) => Err(HubError::InvalidHandlerResponse {
                service: binding.service.to_string(),
                details: "response body is not a JSON object".to_string(),
            }),
            Err(e) => {
                error!(
                    correlation_id = %correlation_id,
                    error = %e,
                    body_size = body.len(),
                    "Failed to parse handler response"
                );
                Err(HubError::InvalidHandlerResponse {
                    service: binding.service.to_string(),
                    details: format!("response body is not valid JSON: {e}"),
                })
            }
        }
    }

    /// Check a handler's `GET /health` endpoint.
    ///
    /// # Errors
    ///
    /// Returns `HandlerUnreachable` if the handler cannot be reached in time,
    /// or `HandlerApplication` if it answers with a non-2xx status.
    pub async fn health_check(&self, binding: &HandlerBinding) -> Result<(), HubError> {
        let url = binding.health_url();
        let response = self
            .client
            .get(&url)
            .timeout(self.config.connect_timeout)
            .send()
            .await
            .map_err(|e| {
                self.classify_error(e, binding, "health-check", self.config.connect_timeout)
            })?;

        let status = response.status();
        debug!(url = %url, status = %status, "Handler health check");

        if status.is_success() {
            Ok(())
        } else {
            Err(HubError::HandlerApplication {
                service: binding.service.to_string(),
                status: status.as_u16(),
                payload: Value::Null,
            })
        }
    }

    /// Read the response body with a size limit.
    ///
    /// Checks `Content-Length` first for early rejection, then streams the
    /// body chunk by chunk so chunked replies cannot exceed the limit either.
    async fn read_body_limited(
        &self,
        mut response: reqwest::Response,
        binding: &HandlerBinding,
        correlation_id: &str,
    ) -> Result<bytes::Bytes, HubError> {
        let max_size = self.config.max_response_size;
        let too_large = |size: usize| HubError::InvalidHandlerResponse {
            service: binding.service.to_string(),
            details: format!("response too large: {size} bytes exceeds {max_size} byte limit"),
        };

        if let Some(content_length) = response.content_length() {
            if content_length as usize > max_size {
                warn!(
                    correlation_id = %correlation_id,
                    content_length = content_length,
                    max_response_size = max_size,
                    "Handler response exceeds size limit (Content-Length)"
                );
                return Err(too_large(content_length as usize));
            }
        }

        let mut buf = Vec::with_capacity(
            response
                .content_length()
                .map(|cl| cl as usize)
                .unwrap_or(8192)
                .min(max_size),
        );

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.classify_error(e, binding, correlation_id, self.config.timeout))?
        {
            if buf.len() + chunk.len() > max_size {
                warn!(
                    correlation_id = %correlation_id,
                    accumulated = buf.len(),
                    chunk_size = chunk.len(),
                    max_response_size = max_size,
                    "Handler response exceeds size limit during streaming"
                );
                return Err(too_large(buf.len() + chunk.len()));
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(buf.into())
    }

    /// Classify a reqwest error into `HandlerUnreachable`.
    ///
    /// `timeout` is the bound that applied to the failed call.
    fn classify_error(
        &self,
        error: reqwest::Error,
        binding: &HandlerBinding,
        correlation_id: &str,
        timeout: Duration,
    ) -> HubError {
        let timeout_ms = timeout.as_millis() as u64;

        if error.is_timeout() {
            warn!(
                correlation_id = %correlation_id,
                service = binding.service,
                timeout_ms = timeout_ms,
                "Handler request timed out"
            );
            HubError::HandlerUnreachable {
                service: binding.service.to_string(),
                url: binding.url.clone(),
                reason: format!("no response within {timeout_ms}ms"),
                timeout_ms: Some(timeout_ms),
            }
        } else if error.is_connect() {
            warn!(
                correlation_id = %correlation_id,
                service = binding.service,
                url = %binding.url,
                error = %error,
                "Failed to connect to handler"
            );
            HubError::HandlerUnreachable {
                service: binding.service.to_string(),
                url: binding.url.clone(),
                reason: "connection failed".to_string(),
                timeout_ms: None,
            }
        } else {
            error!(
                correlation_id = %correlation_id,
                service = binding.service,
                error = %error,
                "Handler request failed"
            );
            // The error message embeds the handler URL; keep it in the log only.
            HubError::HandlerUnreachable {
                service: binding.service.to_string(),
                url: binding.url.clone(),
                reason: error.without_url().to_string(),
                timeout_ms: None,
            }
        }
    }

    fn record(&self, binding: &HandlerBinding, status: &str, start: Instant) {
        if let Some(ref metrics) = self.metrics {
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            metrics.record_handler_call(binding.service, status, elapsed_ms);
        }
    }
}

/// Metrics status label for a failed call.
fn failure_label(err: &HubError) -> &'static str {
    match err {
        HubError::HandlerUnreachable {
            timeout_ms: Some(_),
            ..
        } => "timeout",
        HubError::HandlerUnreachable { .. } => "connection_error",
        _ => "invalid_response",
    }
}

/// The handler's diagnostic body: JSON when it parses, the raw text otherwise.
fn error_payload(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Handler dispatch abstraction (enables mocking in tests).
#[async_trait::async_trait]
pub trait HandlerForwarder: Send + Sync {
    /// Deliver a message to its handler and return the raw reply object.
    async fn dispatch(
        &self,
        binding: &HandlerBinding,
        message: &Message,
        correlation_id: &str,
    ) -> Result<Map<String, Value>, HubError>;

    /// Check that a handler is reachable and healthy.
    async fn health(&self, binding: &HandlerBinding) -> Result<(), HubError>;
}

#[async_trait::async_trait]
impl HandlerForwarder for HandlerClient {
    async fn dispatch(
        &self,
        binding: &HandlerBinding,
        message: &Message,
        correlation_id: &str,
    ) -> Result<Map<String, Value>, HubError> {
        self.post_message(binding, message, correlation_id).await
    }

    async fn health(&self, binding: &HandlerBinding) -> Result<(), HubError> {
        self.health_check(binding).await
    }
}
