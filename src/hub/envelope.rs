//! Response envelopes returned by the hub.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorBody;

/// A handler reply after normalization.
///
/// Serialized as the handler's own object: every field the handler returned
/// is passed through, with `service` guaranteed to be the bound handler's
/// declared name and the identifier field guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingResult(Map<String, Value>);

impl RoutingResult {
    pub(crate) fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Declared name of the handler that processed the message.
    pub fn service(&self) -> Option<&str> {
        self.0.get("service").and_then(Value::as_str)
    }

    /// A string field from the handler reply, e.g. `orderId`.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// All reply fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Overall batch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every item was routed successfully (also the empty batch).
    BatchProcessed,
    /// At least one item failed.
    BatchPartialFailure,
}

/// Per-item outcome inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOutcome {
    Routed,
    Failed,
}

/// Result for one batch item, reported at the item's input position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    /// Position of the item in the submitted `items` array
    pub index: usize,
    /// Echo of the item's `id`, whatever its JSON type
    pub id: Option<Value>,
    /// Echo of the item's `type`, whatever its JSON type
    #[serde(rename = "type")]
    pub message_type: Option<Value>,
    pub outcome: ItemOutcome,
    /// Handler that processed the item (on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Handler-generated identifier (on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Error envelope body (on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Aggregated batch response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub status: BatchStatus,
    pub items_received: usize,
    pub items_succeeded: usize,
    pub items_failed: usize,
    /// One entry per input item, in input order
    pub results: Vec<BatchItemResult>,
}

impl BatchResult {
    /// Aggregate per-item results. `results` must already be in input order.
    pub fn from_items(results: Vec<BatchItemResult>) -> Self {
        let items_received = results.len();
        let items_succeeded = results
            .iter()
            .filter(|r| r.outcome == ItemOutcome::Routed)
            .count();
        let items_failed = items_received - items_succeeded;
        let status = if items_failed == 0 {
            BatchStatus::BatchProcessed
        } else {
            BatchStatus::BatchPartialFailure
        };

        Self {
            status,
            items_received,
            items_succeeded,
            items_failed,
            results,
        }
    }
}
