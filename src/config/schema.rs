//! Configuration schema.
//!
//! [`ConfigFile`] mirrors the YAML file, with every field optional.
//! [`HubConfig`] is the resolved configuration handed to the hub at
//! construction: defaults, then file values, then environment overrides.

use serde::Deserialize;
use std::time::Duration;

use super::duration_format;
use super::error::ConfigError;
use crate::message::MessageKind;

/// Default listen address (the integration-platform HTTP port).
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8290";
pub const DEFAULT_ORDER_SERVICE_URL: &str = "http://localhost:8081";
pub const DEFAULT_PAYMENT_SERVICE_URL: &str = "http://localhost:8082";
pub const DEFAULT_ORDER_PATH: &str = "/orders";
pub const DEFAULT_PAYMENT_PATH: &str = "/payments";
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 1024;
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

// ─────────────────────────────────────────────────────────────────────────────
// File schema
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level YAML document.
///
/// ```yaml
/// listen: 0.0.0.0:8290
/// handlers:
///   order:
///     url: ${ORDER_URL:-http://localhost:8081}
///   payment:
///     url: http://payments:8082
///     path: /payments
/// handler_timeout: 5s
/// batch_concurrency: 8
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub listen: Option<String>,
    #[serde(default)]
    pub handlers: HandlersSection,
    #[serde(default, deserialize_with = "duration_format::deserialize_option")]
    pub handler_timeout: Option<Duration>,
    #[serde(default, deserialize_with = "duration_format::deserialize_option")]
    pub connect_timeout: Option<Duration>,
    pub max_response_bytes: Option<usize>,
    pub max_body_bytes: Option<usize>,
    pub max_concurrent_requests: Option<usize>,
    pub batch_concurrency: Option<usize>,
}

/// `handlers:` section, one entry per routable message kind.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlersSection {
    #[serde(default)]
    pub order: HandlerSection,
    #[serde(default)]
    pub payment: HandlerSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerSection {
    pub url: Option<String>,
    pub path: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Resolved hub configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    /// Inbound listen address (`host:port`)
    pub listen_addr: String,
    /// Base URL of the Order Service
    pub order_service_url: String,
    /// Base URL of the Payment Service
    pub payment_service_url: String,
    /// Processing path on the Order Service
    pub order_path: String,
    /// Processing path on the Payment Service
    pub payment_path: String,
    /// Outbound handler call timeout (connect + response)
    pub handler_timeout: Duration,
    /// Outbound TCP connect timeout
    pub connect_timeout: Duration,
    /// Largest handler response body accepted
    pub max_response_bytes: usize,
    /// Largest inbound request body accepted
    pub max_body_bytes: usize,
    /// Inbound requests processed at once before answering 503
    pub max_concurrent_requests: usize,
    /// Batch items dispatched concurrently (1 = sequential)
    pub batch_concurrency: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            order_service_url: DEFAULT_ORDER_SERVICE_URL.to_string(),
            payment_service_url: DEFAULT_PAYMENT_SERVICE_URL.to_string(),
            order_path: DEFAULT_ORDER_PATH.to_string(),
            payment_path: DEFAULT_PAYMENT_PATH.to_string(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl HubConfig {
    /// Create a config pointing at the given handler base URLs, with defaults
    /// for everything else.
    pub fn with_handler_urls(
        order_service_url: impl Into<String>,
        payment_service_url: impl Into<String>,
    ) -> Self {
        Self {
            order_service_url: order_service_url.into(),
            payment_service_url: payment_service_url.into(),
            ..Self::default()
        }
    }

    /// Set the outbound handler timeout.
    #[must_use]
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Base URL configured for a message kind.
    pub fn service_url(&self, kind: MessageKind) -> &str {
        match kind {
            MessageKind::Order => &self.order_service_url,
            MessageKind::Payment => &self.payment_service_url,
        }
    }

    /// Processing path configured for a message kind.
    pub fn service_path(&self, kind: MessageKind) -> &str {
        match kind {
            MessageKind::Order => &self.order_path,
            MessageKind::Payment => &self.payment_path,
        }
    }

    /// Layer file values over `self`.
    pub fn merge_file(mut self, file: ConfigFile) -> Self {
        if let Some(v) = file.listen {
            self.listen_addr = v;
        }
        if let Some(v) = file.handlers.order.url {
            self.order_service_url = v;
        }
        if let Some(v) = file.handlers.order.path {
            self.order_path = v;
        }
        if let Some(v) = file.handlers.payment.url {
            self.payment_service_url = v;
        }
        if let Some(v) = file.handlers.payment.path {
            self.payment_path = v;
        }
        if let Some(v) = file.handler_timeout {
            self.handler_timeout = v;
        }
        if let Some(v) = file.connect_timeout {
            self.connect_timeout = v;
        }
        if let Some(v) = file.max_response_bytes {
            self.max_response_bytes = v;
        }
        if let Some(v) = file.max_body_bytes {
            self.max_body_bytes = v;
        }
        if let Some(v) = file.max_concurrent_requests {
            self.max_concurrent_requests = v;
        }
        if let Some(v) = file.batch_concurrency {
            self.batch_concurrency = v;
        }
        self
    }

    /// Apply environment variable overrides.
    ///
    /// # Environment Variables
    ///
    /// - `MESSAGEHUB_LISTEN`: Listen address
    /// - `MESSAGEHUB_ORDER_SERVICE_URL`: Order Service base URL
    /// - `MESSAGEHUB_PAYMENT_SERVICE_URL`: Payment Service base URL
    /// - `MESSAGEHUB_HANDLER_TIMEOUT_MS`: Outbound timeout in milliseconds
    /// - `MESSAGEHUB_MAX_BODY_BYTES`: Max inbound body size
    /// - `MESSAGEHUB_MAX_CONCURRENT_REQUESTS`: Concurrency limit
    /// - `MESSAGEHUB_BATCH_CONCURRENCY`: Batch fan-out width
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a numeric variable is set but
    /// does not parse.
    pub fn apply_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(v) = std::env::var("MESSAGEHUB_LISTEN") {
            self.listen_addr = v;
        }
        if let Ok(v) = std::env::var("MESSAGEHUB_ORDER_SERVICE_URL") {
            self.order_service_url = v;
        }
        if let Ok(v) = std::env::var("MESSAGEHUB_PAYMENT_SERVICE_URL") {
            self.payment_service_url = v;
        }
        if let Some(ms) = env_number::<u64>("MESSAGEHUB_HANDLER_TIMEOUT_MS")? {
            self.handler_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = env_number("MESSAGEHUB_MAX_BODY_BYTES")? {
            self.max_body_bytes = v;
        }
        if let Some(v) = env_number("MESSAGEHUB_MAX_CONCURRENT_REQUESTS")? {
            self.max_concurrent_requests = v;
        }
        if let Some(v) = env_number("MESSAGEHUB_BATCH_CONCURRENCY")? {
            self.batch_concurrency = v;
        }
        Ok(self)
    }
}

fn env_number<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar {
                var,
                message: e.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
