//! HTTP transport and routing layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────────┐     ┌─────────────────┐
//! │   Client    │────▶│        MessageHub        │────▶│  Order Service  │
//! │             │◀────│  server → router → client│────▶│ Payment Service │
//! └─────────────┘     └──────────────────────────┘     └─────────────────┘
//! ```
//!
//! - [`server`]: inbound endpoints, body limits, concurrency cap
//! - [`router`]: the static type → handler routing table
//! - [`handler_client`]: pooled outbound HTTP client for the handlers

pub mod handler_client;
pub mod router;
pub mod server;
