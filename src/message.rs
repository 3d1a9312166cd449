//! Message and batch wire types.
//!
//! A [`Message`] is the unit of work submitted to the hub. Only its `type`
//! participates in routing; `id`, `priority`, `data` and any extra top-level
//! fields are carried through to the downstream handler unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HubError;

/// Message types the hub knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `"order"` messages, handled by the Order Service.
    Order,
    /// `"payment"` messages, handled by the Payment Service.
    Payment,
}

impl MessageKind {
    /// Every routable kind, in a stable order.
    pub const ALL: [MessageKind; 2] = [MessageKind::Order, MessageKind::Payment];

    /// The wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Order => "order",
            MessageKind::Payment => "payment",
        }
    }

    /// Parse a wire tag. Matching is exact; `"Order"` is not `"order"`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "order" => Some(MessageKind::Order),
            "payment" => Some(MessageKind::Payment),
            _ => None,
        }
    }

    /// Wire tags of all known kinds, for diagnostics.
    pub fn known_tags() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_str()).collect()
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory priority hint. Never affects handler selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }
}

/// A message submitted to the hub.
///
/// Wraps the caller's JSON object as received. Field accessors read it
/// leniently: a `type` that is not a string is simply unroutable, and an
/// `id` of any JSON type is echoed back as-is. Serialization yields the
/// original object, which is what the handler receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    /// Build a message with the given type, id and data.
    pub fn new(message_type: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(message_type.into()));
        fields.insert("id".to_string(), Value::String(id.into()));
        fields.insert("data".to_string(), data);
        Self(fields)
    }

    /// Set the priority hint.
    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.0
            .insert("priority".to_string(), Value::String(priority.into()));
        self
    }

    /// The raw `type` field, whatever its JSON type.
    pub fn type_value(&self) -> Option<&Value> {
        self.0.get("type")
    }

    /// The `type` field when it is a string.
    pub fn message_type(&self) -> Option<&str> {
        self.type_value().and_then(Value::as_str)
    }

    /// The routable kind, if `type` names one exactly.
    pub fn kind(&self) -> Option<MessageKind> {
        self.message_type().and_then(MessageKind::parse)
    }

    /// The raw `id` field, echoed untouched in batch results.
    pub fn id_value(&self) -> Option<&Value> {
        self.0.get("id")
    }

    pub fn id(&self) -> Option<&str> {
        self.id_value().and_then(Value::as_str)
    }

    /// The raw `priority` hint, kept verbatim.
    pub fn priority_hint(&self) -> Option<&Value> {
        self.0.get("priority")
    }

    /// The parsed priority, if it is one of the recognized levels.
    pub fn priority(&self) -> Option<Priority> {
        self.priority_hint()
            .and_then(Value::as_str)
            .and_then(Priority::parse)
    }

    /// The handler-owned `data` payload, when it is an object.
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.0.get("data").and_then(Value::as_object)
    }

    /// Every top-level field, as submitted.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Parse a message from an already-decoded JSON value.
    ///
    /// The value must be a JSON object; its fields are not otherwise checked.
    pub fn from_value(value: Value) -> Result<Self, HubError> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(HubError::InvalidMessage {
                details: format!("message must be a JSON object, got {}", json_kind(&other)),
            }),
        }
    }

    /// Parse a message from a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, HubError> {
        let value: Value = serde_json::from_slice(body).map_err(|e| HubError::InvalidMessage {
            details: format!("invalid JSON: {e}"),
        })?;
        Self::from_value(value)
    }
}

/// A batch submission: `{ "items": [Message, ...] }`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchRequest {
    pub items: Vec<Message>,
}

impl BatchRequest {
    pub fn new(items: Vec<Message>) -> Self {
        Self { items }
    }

    /// Parse and validate a batch body.
    ///
    /// The whole batch is rejected with [`HubError::MalformedBatch`] when the
    /// body is not an object, `items` is missing or not an array, or any item
    /// is not a JSON object. Item fields are not checked here; a missing,
    /// unknown or non-string type is a per-item routing failure.
    pub fn from_slice(body: &[u8]) -> Result<Self, HubError> {
        let value: Value = serde_json::from_slice(body).map_err(|e| HubError::MalformedBatch {
            details: format!("invalid JSON: {e}"),
        })?;

        let Value::Object(mut root) = value else {
            return Err(HubError::MalformedBatch {
                details: "batch body must be a JSON object".to_string(),
            });
        };

        let items = match root.remove("items") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(HubError::MalformedBatch {
                    details: format!("'items' must be an array, got {}", json_kind(&other)),
                });
            }
            None => {
                return Err(HubError::MalformedBatch {
                    details: "missing 'items' field".to_string(),
                });
            }
        };

        let items = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                Message::from_value(item).map_err(|e| HubError::MalformedBatch {
                    details: format!("item {index}: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { items })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parse_is_exact() {
        assert_eq!(MessageKind::parse("order"), Some(MessageKind::Order));
        assert_eq!(MessageKind::parse("payment"), Some(MessageKind::Payment));
        assert_eq!(MessageKind::parse("Order"), None);
        assert_eq!(MessageKind::parse(""), None);
        assert_eq!(MessageKind::known_tags(), vec!["order", "payment"]);
    }

    #[test]
    fn test_message_preserves_unknown_fields() {
        let body = json!({
            "type": "order",
            "id": "ORDER-12345",
            "priority": "high",
            "data": {"item": "Laptop", "quantity": 2},
            "source": "web"
        });

        let message = Message::from_value(body.clone()).unwrap();
        assert_eq!(message.message_type(), Some("order"));
        assert_eq!(message.kind(), Some(MessageKind::Order));
        assert_eq!(message.priority(), Some(Priority::High));
        assert_eq!(message.fields().get("source"), Some(&json!("web")));

        // Forwarded body is the original body
        assert_eq!(serde_json::to_value(&message).unwrap(), body);
    }

    #[test]
    fn test_forwarded_body_adds_and_drops_nothing() {
        for body in [
            json!({"type": "order", "id": "NO-DATA"}),
            json!({"type": null, "id": null, "data": {}}),
            json!({}),
        ] {
            let message = Message::from_slice(body.to_string().as_bytes()).unwrap();
            assert_eq!(serde_json::to_value(&message).unwrap(), body);
        }
    }

    #[test]
    fn test_unrecognized_priority_is_kept() {
        let message = Message::from_value(json!({"type": "order", "priority": "urgent"})).unwrap();
        assert_eq!(message.priority_hint(), Some(&json!("urgent")));
        assert_eq!(message.priority(), None);
    }

    #[test]
    fn test_missing_type_parses() {
        let message = Message::from_value(json!({"id": "X-1", "data": {}})).unwrap();
        assert!(message.type_value().is_none());
        assert!(message.data().unwrap().is_empty());
    }

    #[test]
    fn test_non_object_message_rejected() {
        let err = Message::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, HubError::InvalidMessage { .. }));

        let err = Message::from_slice(b"{not json").unwrap_err();
        assert!(matches!(err, HubError::InvalidMessage { .. }));
    }

    #[test]
    fn test_wrongly_typed_fields_parse_leniently() {
        let message = Message::from_value(json!({"type": 42, "id": 123, "data": "x"})).unwrap();
        assert_eq!(message.type_value(), Some(&json!(42)));
        assert_eq!(message.message_type(), None);
        assert_eq!(message.kind(), None);
        assert_eq!(message.id_value(), Some(&json!(123)));
        assert_eq!(message.id(), None);
        assert!(message.data().is_none());
    }

    #[test]
    fn test_batch_parse() {
        let body = json!({
            "items": [
                {"type": "order", "id": "BATCH-001", "data": {"item": "Phone"}},
                {"type": "payment", "id": "BATCH-002", "data": {"amount": 500}},
                {"type": "mystery", "id": "BATCH-003"},
                {"type": 7, "id": 123}
            ]
        });
        let batch = BatchRequest::from_slice(body.to_string().as_bytes()).unwrap();
        assert_eq!(batch.items.len(), 4);
        assert_eq!(batch.items[2].message_type(), Some("mystery"));
        assert_eq!(batch.items[3].type_value(), Some(&json!(7)));
    }

    #[test]
    fn test_batch_empty_items_ok() {
        let batch = BatchRequest::from_slice(br#"{"items": []}"#).unwrap();
        assert!(batch.items.is_empty());
    }

    #[test]
    fn test_malformed_batches() {
        for body in [
            &br#"[]"#[..],
            br#"{}"#,
            br#"{"items": {"type": "order"}}"#,
            br#"{"items": [1]}"#,
            br#"{"items": "#,
        ] {
            let err = BatchRequest::from_slice(body).unwrap_err();
            assert!(
                matches!(err, HubError::MalformedBatch { .. }),
                "expected MalformedBatch for {}",
                String::from_utf8_lossy(body)
            );
        }
    }
}
