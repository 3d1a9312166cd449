//! Message type routing.
//!
//! Maps a message's declared `type` to the handler bound to it.
//!
//! # Routing Table
//!
//! | Type | Handler | Identifier field |
//! |------|---------|------------------|
//! | `order` | Order Service | `orderId` |
//! | `payment` | Payment Service | `transactionId` |
//! | anything else / missing | none | unroutable |
//!
//! Only `type` is consulted. `data` never influences the route.

use crate::config::HubConfig;
use crate::error::HubError;
use crate::message::{Message, MessageKind};

/// A downstream handler bound to one message kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerBinding {
    /// The message kind this handler owns
    pub kind: MessageKind,
    /// Declared human-readable service name
    pub service: &'static str,
    /// Field in the handler reply that carries the generated identifier
    pub id_field: &'static str,
    /// Handler base URL (health lives at `<base_url>/health`)
    pub base_url: String,
    /// Full processing URL (`<base_url><path>`)
    pub url: String,
}

impl HandlerBinding {
    /// Build the binding for `kind` from a base URL and processing path.
    pub fn new(kind: MessageKind, base_url: &str, path: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            kind,
            service: service_name(kind),
            id_field: id_field(kind),
            url: format!("{base_url}{path}"),
            base_url,
        }
    }

    /// URL of the handler's health endpoint.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

/// Declared service name for a kind.
pub fn service_name(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Order => "Order Service",
        MessageKind::Payment => "Payment Service",
    }
}

/// Identifier field a handler of `kind` must return.
pub fn id_field(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Order => "orderId",
        MessageKind::Payment => "transactionId",
    }
}

/// Router for hub messages.
///
/// Immutable after construction; shared across requests without locking.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    bindings: Vec<HandlerBinding>,
}

impl MessageRouter {
    /// Build the routing table from configuration.
    pub fn new(config: &HubConfig) -> Self {
        let bindings = MessageKind::ALL
            .iter()
            .map(|&kind| {
                HandlerBinding::new(kind, config.service_url(kind), config.service_path(kind))
            })
            .collect();
        Self { bindings }
    }

    /// Resolve the handler for a message.
    ///
    /// # Errors
    ///
    /// Returns `HubError::UnroutableMessage` if `type` is missing or does
    /// not match a known tag exactly.
    pub fn classify(&self, message: &Message) -> Result<&HandlerBinding, HubError> {
        let unroutable = || HubError::UnroutableMessage {
            message_type: message.type_value().cloned(),
        };

        let kind = message.kind().ok_or_else(unroutable)?;
        self.binding(kind).ok_or_else(unroutable)
    }

    /// The binding for a kind.
    pub fn binding(&self, kind: MessageKind) -> Option<&HandlerBinding> {
        self.bindings.iter().find(|b| b.kind == kind)
    }

    /// All bindings, in `MessageKind::ALL` order.
    pub fn bindings(&self) -> &[HandlerBinding] {
        &self.bindings
    }
}
