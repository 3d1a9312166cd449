//! Tower layers for request correlation and structured request/response logging.
//!
//! Uses `tower_http::trace::TraceLayer` for the middleware plumbing, with
//! custom callbacks for header redaction. Every request carries an
//! `x-request-id`: the caller's when supplied, a fresh UUID otherwise. The
//! same id names the tracing span, is forwarded to handlers, appears as
//! `correlationId` in error envelopes, and is echoed on the response.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use http::{HeaderMap, HeaderValue};
use std::fmt;
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{DefaultOnBodyChunk, DefaultOnEos, TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

/// Correlation header name.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Headers that are redacted from logs.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "x-api-key",
    "x-auth-token",
    "proxy-authorization",
    "set-cookie",
];

/// Longest caller-supplied request id that is trusted as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// The request id carried by `headers`, if present and usable.
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= MAX_REQUEST_ID_LEN)
}

/// Middleware that guarantees an `x-request-id` on the request and echoes it
/// on the response.
pub async fn ensure_request_id(mut request: Request, next: Next) -> Response {
    let id = match request_id(request.headers()) {
        Some(id) => id.to_owned(),
        None => Uuid::new_v4().to_string(),
    };

    if let Ok(value) = HeaderValue::from_str(&id) {
        request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
        let mut response = next.run(request).await;
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
        response
    } else {
        next.run(request).await
    }
}

/// Create the logging/tracing layer.
pub fn logging_layer() -> TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    CorrelationMakeSpan,
    OnRequestLogger,
    OnResponseLogger,
    DefaultOnBodyChunk,
    DefaultOnEos,
    OnFailureLogger,
> {
    TraceLayer::new_for_http()
        .make_span_with(CorrelationMakeSpan)
        .on_request(OnRequestLogger)
        .on_response(OnResponseLogger)
        .on_failure(OnFailureLogger)
}

/// Span creator that attaches the request id to every request span.
#[derive(Clone, Debug)]
pub struct CorrelationMakeSpan;

impl<B> tower_http::trace::MakeSpan<B> for CorrelationMakeSpan {
    fn make_span(&mut self, request: &http::Request<B>) -> tracing::Span {
        let request_id = request_id(request.headers()).unwrap_or("-");

        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            version = ?request.version(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone, Debug)]
pub struct OnRequestLogger;

impl<B> tower_http::trace::OnRequest<B> for OnRequestLogger {
    fn on_request(&mut self, request: &http::Request<B>, _span: &tracing::Span) {
        info!(
            method = %request.method(),
            uri = %request.uri(),
            direction = "inbound",
            "Request received"
        );

        // PERF(latency): only sanitize headers at DEBUG level
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                version = ?request.version(),
                headers = ?SanitizedHeaders(request.headers()),
                "Request details"
            );
        }
    }
}

#[derive(Clone, Debug)]
pub struct OnResponseLogger;

impl<B> tower_http::trace::OnResponse<B> for OnResponseLogger {
    fn on_response(
        self,
        response: &http::Response<B>,
        latency: std::time::Duration,
        _span: &tracing::Span,
    ) {
        info!(
            status = %response.status().as_u16(),
            latency_ms = latency.as_millis(),
            direction = "outbound",
            "Response sent"
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                headers = ?SanitizedHeaders(response.headers()),
                "Response details"
            );
        }
    }
}

#[derive(Clone, Debug)]
pub struct OnFailureLogger;

impl tower_http::trace::OnFailure<ServerErrorsFailureClass> for OnFailureLogger {
    fn on_failure(
        &mut self,
        failure: ServerErrorsFailureClass,
        latency: std::time::Duration,
        _span: &tracing::Span,
    ) {
        warn!(
            classification = %failure,
            latency_ms = latency.as_millis(),
            direction = "error",
            "Request failed"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Header Redaction
// ─────────────────────────────────────────────────────────────────────────────

/// Zero-allocation `Debug` wrapper that redacts sensitive headers.
struct SanitizedHeaders<'a>(&'a HeaderMap);

impl fmt::Debug for SanitizedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX_HEADERS_TO_LOG: usize = 50;
        const MAX_VALUE_LEN: usize = 1024;

        let mut map = f.debug_map();

        for (idx, (name, value)) in self.0.iter().enumerate() {
            if idx >= MAX_HEADERS_TO_LOG {
                map.entry(&"...", &format!("({} more headers)", self.0.len() - idx));
                break;
            }

            let name_str = name.as_str();
            let is_sensitive = SENSITIVE_HEADERS
                .iter()
                .any(|&sensitive| name_str.eq_ignore_ascii_case(sensitive));

            if is_sensitive {
                map.entry(&name_str, &"[REDACTED]");
                continue;
            }

            match value.to_str() {
                Ok(val_str) if val_str.len() <= MAX_VALUE_LEN => {
                    map.entry(&name_str, &val_str);
                }
                Ok(val_str) => {
                    let cut = (0..=MAX_VALUE_LEN)
                        .rev()
                        .find(|&i| val_str.is_char_boundary(i))
                        .unwrap_or(0);
                    map.entry(
                        &name_str,
                        &format!("{}... ({} bytes)", &val_str[..cut], val_str.len()),
                    );
                }
                Err(_) => {
                    map.entry(&name_str, &format!("<binary: {} bytes>", value.len()));
                }
            }
        }

        map.finish()
    }
}
