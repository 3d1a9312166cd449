//! Error handling for MessageHub.
//!
//! Every failure the hub can hit while serving a request is a [`HubError`]
//! variant. Each variant maps to an HTTP status, a stable snake_case type
//! name (used for metrics labels and the response envelope `code`), and a
//! set of client-safe details.
//!
//! ## Module Organization
//!
//! - `response` - JSON error envelope and axum `IntoResponse` integration

pub mod response;

pub use response::{ErrorBody, ErrorEnvelope};

use http::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;

use crate::message::MessageKind;

/// All error types that can occur while routing a request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HubError {
    // Inbound validation
    /// Request body is not valid JSON, not an object, or has mistyped fields.
    #[error("Invalid message: {details}")]
    InvalidMessage {
        /// Description of the parse failure
        details: String,
    },

    /// The message `type` is missing or not bound to any handler.
    #[error("{}", unroutable_message(.message_type.as_ref()))]
    UnroutableMessage {
        /// The offending `type` value as submitted, `None` when absent
        message_type: Option<Value>,
    },

    /// Batch body is not `{ "items": [ ...objects... ] }`.
    #[error("Malformed batch: {details}")]
    MalformedBatch {
        /// What is wrong with the batch
        details: String,
    },

    /// Request body exceeds the configured limit.
    #[error("Request body exceeds maximum size of {limit} bytes")]
    PayloadTooLarge {
        /// Configured body limit in bytes
        limit: usize,
    },

    /// No hub endpoint at this path.
    #[error("Route not found: {method} {path}")]
    RouteNotFound { method: String, path: String },

    // Handler errors
    /// The handler could not be reached or did not answer in time.
    #[error("Handler '{service}' is unreachable: {reason}")]
    HandlerUnreachable {
        /// Declared handler name
        service: String,
        /// Handler URL that failed (never exposed to clients)
        url: String,
        /// Reason for the failure
        reason: String,
        /// Set when the failure was the outbound timeout expiring
        timeout_ms: Option<u64>,
    },

    /// The handler answered with a non-success status.
    #[error("Handler '{service}' failed with HTTP {status}")]
    HandlerApplication {
        /// Declared handler name
        service: String,
        /// HTTP status returned by the handler
        status: u16,
        /// The handler's diagnostic body (JSON, or a string if not JSON)
        payload: Value,
    },

    /// The handler answered 2xx but the body is unusable.
    #[error("Handler '{service}' returned an invalid response: {details}")]
    InvalidHandlerResponse {
        /// Declared handler name
        service: String,
        /// What is wrong with the body
        details: String,
    },

    // Operational errors
    /// The hub is at its concurrency limit.
    #[error("Service temporarily unavailable")]
    ServiceUnavailable {
        /// Reason for unavailability
        reason: String,
    },

    /// Internal error - should not happen.
    #[error("Internal error: {details}")]
    Internal {
        /// What went wrong
        details: String,
    },
}

fn unroutable_message(message_type: Option<&Value>) -> String {
    match message_type {
        Some(Value::String(t)) => format!("Unknown message type '{t}'"),
        None | Some(Value::Null) => "Message type is missing".to_string(),
        Some(other) => format!("Message type must be a string, got {other}"),
    }
}

impl HubError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidMessage { .. }
            | Self::UnroutableMessage { .. }
            | Self::MalformedBatch { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::HandlerUnreachable {
                timeout_ms: Some(_),
                ..
            } => StatusCode::GATEWAY_TIMEOUT,
            Self::HandlerUnreachable { .. }
            | Self::HandlerApplication { .. }
            | Self::InvalidHandlerResponse { .. } => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error type name for metrics and the response envelope.
    pub fn error_type_name(&self) -> &'static str {
        match self {
            Self::InvalidMessage { .. } => "invalid_message",
            Self::UnroutableMessage { .. } => "unroutable_message",
            Self::MalformedBatch { .. } => "malformed_batch",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::RouteNotFound { .. } => "route_not_found",
            Self::HandlerUnreachable { .. } => "handler_unreachable",
            Self::HandlerApplication { .. } => "handler_application_error",
            Self::InvalidHandlerResponse { .. } => "invalid_handler_response",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Returns retry-after hint (seconds) for retriable errors.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::ServiceUnavailable { .. } => Some(1),
            _ => None,
        }
    }

    /// Returns details safe for client consumption.
    ///
    /// Handler URLs and transport error strings stay in the logs. The
    /// handler's own diagnostic payload is passed through unmasked.
    pub fn safe_details(&self) -> Option<Value> {
        match self {
            Self::UnroutableMessage { message_type } => Some(json!({
                "type": message_type,
                "knownTypes": MessageKind::known_tags(),
            })),
            Self::HandlerUnreachable {
                service,
                timeout_ms,
                ..
            } => {
                let mut details = json!({
                    "service": service,
                    "timedOut": timeout_ms.is_some(),
                });
                if let Some(ms) = timeout_ms {
                    details["timeoutMs"] = json!(ms);
                }
                Some(details)
            }
            Self::HandlerApplication {
                service,
                status,
                payload,
            } => Some(json!({
                "service": service,
                "handlerStatus": status,
                "handlerResponse": payload,
            })),
            Self::InvalidHandlerResponse { service, .. } => Some(json!({ "service": service })),
            Self::PayloadTooLarge { limit } => Some(json!({ "limitBytes": limit })),
            Self::RouteNotFound { method, path } => Some(json!({
                "method": method,
                "path": path,
            })),
            _ => None,
        }
    }

    /// Converts the error to its wire representation.
    pub fn to_error_body(&self, correlation_id: &str) -> ErrorBody {
        ErrorBody {
            code: self.error_type_name().to_string(),
            message: self.to_string(),
            details: self.safe_details(),
            correlation_id: correlation_id.to_string(),
            retry_after: self.retry_after(),
        }
    }
}
