//! JSON error envelope returned for every non-2xx hub response.

use axum::{
    Json,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use super::HubError;

/// Top-level wrapper: `{ "error": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// Error object inside the envelope.
///
/// All fields are safe for client consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Machine-readable error type name
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Type-specific error details (sanitized)
    pub details: Option<serde_json::Value>,

    /// Identifier for finding this error in the hub logs
    pub correlation_id: String,

    /// Suggested retry delay in seconds (for retriable errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl HubError {
    /// Build the HTTP response for this error with an explicit correlation id.
    pub fn into_response_with_id(self, correlation_id: &str) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(
                correlation_id = %correlation_id,
                error_type = self.error_type_name(),
                error = %self,
                "Request failed"
            );
        } else {
            warn!(
                correlation_id = %correlation_id,
                error_type = self.error_type_name(),
                error = %self,
                "Request rejected"
            );
        }

        let envelope = ErrorEnvelope {
            error: self.to_error_body(correlation_id),
        };
        let retry_after = envelope.error.retry_after;

        let mut response = (status, Json(envelope)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        self.into_response_with_id(&correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;

    #[test]
    fn test_envelope_serialization() {
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                code: "unroutable_message".to_string(),
                message: "Unknown message type 'unknown'".to_string(),
                details: Some(serde_json::json!({"type": "unknown"})),
                correlation_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
                retry_after: None,
            },
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"]["code"], "unroutable_message");
        assert_eq!(json["error"]["details"]["type"], "unknown");
        assert_eq!(
            json["error"]["correlationId"],
            "550e8400-e29b-41d4-a716-446655440000"
        );
        assert!(json["error"].get("retryAfter").is_none());
    }

    #[tokio::test]
    async fn test_into_response_sets_status_and_retry_after() {
        let response = HubError::ServiceUnavailable {
            reason: "busy".to_string(),
        }
        .into_response_with_id("cid-1");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let envelope: ErrorEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope.error.code, "service_unavailable");
        assert_eq!(envelope.error.correlation_id, "cid-1");
    }
}
