//! The message hub: classify, dispatch, normalize, aggregate.
//!
//! Per-request flow: `received → classified → dispatched → (success |
//! failure) → responded`. The hub holds no per-request state; the only
//! shared state is the metrics registry.
//!
//! ## Module Organization
//!
//! - `envelope` - `RoutingResult` and batch result types

pub mod envelope;

pub use envelope::{BatchItemResult, BatchResult, BatchStatus, ItemOutcome, RoutingResult};

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::HubError;
use crate::message::{BatchRequest, Message, MessageKind};
use crate::metrics::HubMetrics;
use crate::transport::handler_client::HandlerForwarder;
use crate::transport::router::{HandlerBinding, MessageRouter};

/// Routes messages to their handlers.
#[derive(Clone)]
pub struct MessageHub {
    router: MessageRouter,
    forwarder: Arc<dyn HandlerForwarder>,
    metrics: Option<Arc<HubMetrics>>,
    batch_concurrency: usize,
}

impl MessageHub {
    /// Create a hub over a routing table and a handler transport.
    pub fn new(router: MessageRouter, forwarder: Arc<dyn HandlerForwarder>) -> Self {
        Self {
            router,
            forwarder,
            metrics: None,
            batch_concurrency: 1,
        }
    }

    /// Number of batch items dispatched at once. Zero is treated as one.
    #[must_use]
    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<HubMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Route one message and return the normalized handler reply.
    ///
    /// # Errors
    ///
    /// - `UnroutableMessage` if `type` is missing or unknown (no handler is called)
    /// - `HandlerUnreachable` / `HandlerApplication` from the handler call
    /// - `InvalidHandlerResponse` if the reply lacks a non-empty identifier
    #[tracing::instrument(skip(self, message), fields(message_type = ?message.type_value(), message_id = ?message.id_value()))]
    pub async fn route(
        &self,
        message: &Message,
        correlation_id: &str,
    ) -> Result<RoutingResult, HubError> {
        let result = self.route_inner(message, correlation_id).await;

        let type_label = match &result {
            Err(HubError::UnroutableMessage { .. }) => "unknown",
            _ => message.message_type().unwrap_or("unknown"),
        };
        match &result {
            Ok(_) => self.record_message(type_label, "routed"),
            Err(e) => {
                self.record_message(type_label, "failed");
                self.record_error(e);
            }
        }

        result
    }

    async fn route_inner(
        &self,
        message: &Message,
        correlation_id: &str,
    ) -> Result<RoutingResult, HubError> {
        let binding = self.router.classify(message)?;

        if let Some(priority) = message.priority_hint() {
            debug!(
                correlation_id = %correlation_id,
                priority = %priority,
                recognized = message.priority().is_some(),
                "Message priority hint"
            );
        }

        let reply = self
            .forwarder
            .dispatch(binding, message, correlation_id)
            .await?;
        let result = normalize(binding, reply)?;

        info!(
            correlation_id = %correlation_id,
            service = binding.service,
            identifier = result.field_str(binding.id_field).unwrap_or_default(),
            "Message routed"
        );
        Ok(result)
    }

    /// Route every item of a batch and aggregate the outcomes.
    ///
    /// Items are dispatched with bounded concurrency; one item's failure
    /// never aborts or cancels its siblings. Results keep input order.
    pub async fn route_batch(&self, batch: BatchRequest, correlation_id: &str) -> BatchResult {
        let items_received = batch.items.len();
        if let Some(ref metrics) = self.metrics {
            metrics.record_batch(items_received);
        }

        let results: Vec<BatchItemResult> = stream::iter(batch.items.into_iter().enumerate())
            .map(|(index, message)| async move {
                let outcome = self.route(&message, correlation_id).await;
                self.item_result(index, &message, outcome, correlation_id)
            })
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let result = BatchResult::from_items(results);
        info!(
            correlation_id = %correlation_id,
            items_received = result.items_received,
            items_failed = result.items_failed,
            "Batch processed"
        );
        result
    }

    fn item_result(
        &self,
        index: usize,
        message: &Message,
        outcome: Result<RoutingResult, HubError>,
        correlation_id: &str,
    ) -> BatchItemResult {
        let id = message.id_value().cloned();
        let message_type = message.type_value().cloned();

        match outcome {
            Ok(result) => {
                let identifier = message
                    .kind()
                    .and_then(|kind| self.router.binding(kind))
                    .and_then(|b| result.field_str(b.id_field))
                    .map(str::to_string);
                BatchItemResult {
                    index,
                    id,
                    message_type,
                    outcome: ItemOutcome::Routed,
                    service: result.service().map(str::to_string),
                    identifier,
                    error: None,
                }
            }
            Err(e) => {
                warn!(
                    correlation_id = %correlation_id,
                    index = index,
                    error_type = e.error_type_name(),
                    error = %e,
                    "Batch item failed"
                );
                BatchItemResult {
                    index,
                    id,
                    message_type,
                    outcome: ItemOutcome::Failed,
                    service: None,
                    identifier: None,
                    error: Some(e.to_error_body(correlation_id)),
                }
            }
        }
    }

    /// Check every handler's health endpoint, in binding order.
    pub async fn handler_health(&self) -> Vec<(HandlerBinding, bool)> {
        let checks = self.router.bindings().iter().map(|binding| async move {
            let healthy = match self.forwarder.health(binding).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(service = binding.service, error = %e, "Handler health check failed");
                    false
                }
            };
            (binding.clone(), healthy)
        });
        futures_util::future::join_all(checks).await
    }

    fn record_message(&self, message_type: &str, outcome: &str) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_message(message_type, outcome);
        }
    }

    fn record_error(&self, error: &HubError) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_error(error.error_type_name());
        }
    }
}

/// Enforce the reply contract: `service` is the bound handler's declared
/// name and the identifier field is a non-empty string.
fn normalize(
    binding: &HandlerBinding,
    mut reply: Map<String, Value>,
) -> Result<RoutingResult, HubError> {
    let has_identifier = reply
        .get(binding.id_field)
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());

    if !has_identifier {
        return Err(HubError::InvalidHandlerResponse {
            service: binding.service.to_string(),
            details: format!("reply is missing a non-empty '{}'", binding.id_field),
        });
    }

    reply.insert(
        "service".to_string(),
        Value::String(binding.service.to_string()),
    );
    Ok(RoutingResult::new(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory forwarder: answers by kind, optionally failing one kind.
    struct StubForwarder {
        fail_kind: Option<MessageKind>,
        calls: AtomicUsize,
        reply_override: Option<Map<String, Value>>,
    }

    impl StubForwarder {
        fn healthy() -> Self {
            Self {
                fail_kind: None,
                calls: AtomicUsize::new(0),
                reply_override: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl HandlerForwarder for StubForwarder {
        async fn dispatch(
            &self,
            binding: &HandlerBinding,
            message: &Message,
            _correlation_id: &str,
        ) -> Result<Map<String, Value>, HubError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);

            // Later items finish first, to exercise result ordering.
            if message.id() == Some("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }

            if self.fail_kind == Some(binding.kind) {
                return Err(HubError::HandlerApplication {
                    service: binding.service.to_string(),
                    status: 500,
                    payload: json!({"error": "boom"}),
                });
            }
            if let Some(reply) = &self.reply_override {
                return Ok(reply.clone());
            }

            let mut reply = Map::new();
            reply.insert("status".to_string(), json!("success"));
            reply.insert("service".to_string(), json!("whatever the handler says"));
            reply.insert(binding.id_field.to_string(), json!(format!("ID-{n}")));
            reply.insert("originalData".to_string(), Value::Object(message.fields().clone()));
            Ok(reply)
        }

        async fn health(&self, binding: &HandlerBinding) -> Result<(), HubError> {
            if self.fail_kind == Some(binding.kind) {
                Err(HubError::HandlerApplication {
                    service: binding.service.to_string(),
                    status: 503,
                    payload: Value::Null,
                })
            } else {
                Ok(())
            }
        }
    }

    fn hub(forwarder: Arc<StubForwarder>) -> MessageHub {
        let router = MessageRouter::new(&HubConfig::default());
        MessageHub::new(router, forwarder).with_batch_concurrency(4)
    }

    #[tokio::test]
    async fn test_route_order_sets_declared_service() {
        let stub = Arc::new(StubForwarder::healthy());
        let hub = hub(stub.clone());

        let msg = Message::new("order", "TEST-1", json!({"item": "Laptop", "quantity": 3}));
        let result = hub.route(&msg, "cid").await.unwrap();

        assert_eq!(result.service(), Some("Order Service"));
        assert!(!result.field_str("orderId").unwrap().is_empty());
        assert_eq!(result.fields()["originalData"]["data"]["item"], "Laptop");
    }

    #[tokio::test]
    async fn test_unknown_type_never_dispatched() {
        let stub = Arc::new(StubForwarder::healthy());
        let hub = hub(stub.clone());

        let msg = Message::new("unknown", "UNK-1", json!({}));
        let err = hub.route(&msg, "cid").await.unwrap_err();

        assert!(matches!(err, HubError::UnroutableMessage { .. }));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_identifier_is_handler_failure() {
        let mut reply = Map::new();
        reply.insert("service".to_string(), json!("Payment Service"));
        reply.insert("transactionId".to_string(), json!(""));
        let stub = Arc::new(StubForwarder {
            reply_override: Some(reply),
            ..StubForwarder::healthy()
        });
        let hub = hub(stub);

        let msg = Message::new("payment", "TEST-2", json!({"amount": 4500.0}));
        let err = hub.route(&msg, "cid").await.unwrap_err();
        assert!(matches!(err, HubError::InvalidHandlerResponse { .. }));
    }

    #[tokio::test]
    async fn test_batch_all_succeed_in_input_order() {
        let stub = Arc::new(StubForwarder::healthy());
        let hub = hub(stub.clone());

        let batch = BatchRequest::new(vec![
            Message::new("order", "slow", json!({})),
            Message::new("payment", "B-2", json!({})),
            Message::new("order", "B-3", json!({})),
        ]);
        let result = hub.route_batch(batch, "cid").await;

        assert_eq!(result.status, BatchStatus::BatchProcessed);
        assert_eq!(result.items_received, 3);
        let ids: Vec<_> = result
            .results
            .iter()
            .map(|r| r.id.as_ref().and_then(Value::as_str))
            .collect();
        assert_eq!(ids, vec![Some("slow"), Some("B-2"), Some("B-3")]);
        assert_eq!(result.results[1].service.as_deref(), Some("Payment Service"));
        assert!(result.results[1].identifier.is_some());
    }

    #[tokio::test]
    async fn test_batch_partial_failure_dispatches_siblings() {
        let stub = Arc::new(StubForwarder::healthy());
        let hub = hub(stub.clone());

        let batch = BatchRequest::new(vec![
            Message::new("order", "B-1", json!({})),
            Message::new("refund", "B-2", json!({})),
            Message::new("payment", "B-3", json!({})),
        ]);
        let result = hub.route_batch(batch, "cid").await;

        assert_eq!(result.status, BatchStatus::BatchPartialFailure);
        assert_eq!(result.items_failed, 1);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
        let failed = &result.results[1];
        assert_eq!(failed.outcome, ItemOutcome::Failed);
        assert_eq!(failed.message_type, Some(json!("refund")));
        assert_eq!(
            failed.error.as_ref().map(|e| e.code.as_str()),
            Some("unroutable_message")
        );
    }

    #[tokio::test]
    async fn test_batch_non_string_fields_fail_per_item() {
        let stub = Arc::new(StubForwarder::healthy());
        let hub = hub(stub.clone());

        let body = json!({"items": [
            {"type": "order", "id": 123, "data": {}},
            {"type": 7, "id": "BAD-2", "data": {}},
            {"type": "payment", "id": "OK-3"}
        ]});
        let batch = BatchRequest::from_slice(body.to_string().as_bytes()).unwrap();
        let result = hub.route_batch(batch, "cid").await;

        assert_eq!(result.status, BatchStatus::BatchPartialFailure);
        assert_eq!(result.items_succeeded, 2);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);

        assert_eq!(result.results[0].outcome, ItemOutcome::Routed);
        assert_eq!(result.results[0].id, Some(json!(123)));

        let failed = &result.results[1];
        assert_eq!(failed.message_type, Some(json!(7)));
        let error = failed.error.as_ref().unwrap();
        assert_eq!(error.code, "unroutable_message");
        assert_eq!(error.details.as_ref().unwrap()["type"], 7);
    }

    #[tokio::test]
    async fn test_handler_failure_in_batch() {
        let stub = Arc::new(StubForwarder {
            fail_kind: Some(MessageKind::Payment),
            ..StubForwarder::healthy()
        });
        let hub = hub(stub);

        let batch = BatchRequest::new(vec![
            Message::new("payment", "B-1", json!({})),
            Message::new("order", "B-2", json!({})),
        ]);
        let result = hub.route_batch(batch, "cid").await;

        assert_eq!(result.items_succeeded, 1);
        let error = result.results[0].error.as_ref().unwrap();
        assert_eq!(error.code, "handler_application_error");
        assert_eq!(error.details.as_ref().unwrap()["handlerStatus"], 500);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let stub = Arc::new(StubForwarder::healthy());
        let hub = hub(stub.clone());

        let result = hub.route_batch(BatchRequest::default(), "cid").await;
        assert_eq!(result.status, BatchStatus::BatchProcessed);
        assert_eq!(result.items_received, 0);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_health() {
        let stub = Arc::new(StubForwarder {
            fail_kind: Some(MessageKind::Order),
            ..StubForwarder::healthy()
        });
        let hub = hub(stub);

        let health = hub.handler_health().await;
        assert_eq!(health.len(), 2);
        assert_eq!(health[0].0.kind, MessageKind::Order);
        assert!(!health[0].1);
        assert!(health[1].1);
    }
}
