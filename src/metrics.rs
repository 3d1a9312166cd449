//! Prometheus metrics for the hub.
//!
//! Exported in OpenMetrics text format on `GET /metrics`.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

// ─────────────────────────────────────────────────────────────────────────────
// Label Sets
// ─────────────────────────────────────────────────────────────────────────────

/// Labels for routed message counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MessageLabels {
    /// Message type tag, or "unknown" when not routable
    pub r#type: String,
    /// "routed" or "failed"
    pub outcome: String,
}

/// Labels for handler call counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HandlerLabels {
    /// Handler service name
    pub service: String,
    /// HTTP status code as string, or "timeout" / "connection_error"
    pub status_code: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ServiceLabels {
    pub service: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// `HubError::error_type_name()`
    pub error_type: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Histogram Bucket Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Handler call duration buckets in milliseconds.
const HANDLER_BUCKETS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 10000.0,
];

/// Batch size buckets (items per batch).
const BATCH_SIZE_BUCKETS: &[f64] = &[0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 500.0];

// ─────────────────────────────────────────────────────────────────────────────
// HubMetrics
// ─────────────────────────────────────────────────────────────────────────────

/// Prometheus metrics for MessageHub.
///
/// All metric names use the "messagehub_" prefix. Label values are drawn
/// from closed sets (message kinds, service names, error type names), with
/// any unrecognized message type collapsed to "unknown".
#[derive(Clone)]
pub struct HubMetrics {
    pub messages_total: Family<MessageLabels, Counter>,
    pub handler_requests_total: Family<HandlerLabels, Counter>,
    pub handler_duration_ms: Family<ServiceLabels, Histogram>,
    pub errors_total: Family<ErrorLabels, Counter>,
    pub batch_items: Histogram,
}

impl HubMetrics {
    /// Create and register all hub metrics.
    pub fn new(registry: &mut Registry) -> Self {
        let messages_total = Family::<MessageLabels, Counter>::default();
        registry.register(
            "messagehub_messages",
            "Messages processed by type and outcome",
            messages_total.clone(),
        );

        let handler_requests_total = Family::<HandlerLabels, Counter>::default();
        registry.register(
            "messagehub_handler_requests",
            "Handler service calls by service and status",
            handler_requests_total.clone(),
        );

        let handler_duration_ms = Family::<ServiceLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(HANDLER_BUCKETS.iter().copied())
        });
        registry.register(
            "messagehub_handler_duration_ms",
            "Handler service call latency in milliseconds",
            handler_duration_ms.clone(),
        );

        let errors_total = Family::<ErrorLabels, Counter>::default();
        registry.register(
            "messagehub_errors",
            "Errors by type",
            errors_total.clone(),
        );

        let batch_items = Histogram::new(BATCH_SIZE_BUCKETS.iter().copied());
        registry.register(
            "messagehub_batch_items",
            "Items per batch request",
            batch_items.clone(),
        );

        Self {
            messages_total,
            handler_requests_total,
            handler_duration_ms,
            errors_total,
            batch_items,
        }
    }

    /// Record the outcome of routing one message.
    pub fn record_message(&self, message_type: &str, outcome: &str) {
        self.messages_total
            .get_or_create(&MessageLabels {
                r#type: message_type.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Record one handler call.
    ///
    /// # Arguments
    ///
    /// * `service` - Handler service name
    /// * `status_code` - HTTP status, or "timeout" / "connection_error"
    /// * `duration_ms` - Call duration in milliseconds
    pub fn record_handler_call(&self, service: &str, status_code: &str, duration_ms: f64) {
        self.handler_requests_total
            .get_or_create(&HandlerLabels {
                service: service.to_string(),
                status_code: status_code.to_string(),
            })
            .inc();
        self.handler_duration_ms
            .get_or_create(&ServiceLabels {
                service: service.to_string(),
            })
            .observe(duration_ms);
    }

    pub fn record_error(&self, error_type: &str) {
        self.errors_total
            .get_or_create(&ErrorLabels {
                error_type: error_type.to_string(),
            })
            .inc();
    }

    pub fn record_batch(&self, items: usize) {
        self.batch_items.observe(items as f64);
    }
}
