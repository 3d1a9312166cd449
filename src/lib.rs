//! MessageHub - HTTP/JSON message routing hub.
//!
//! Clients submit typed JSON messages (`order`, `payment`) singly or in
//! batches. The hub classifies each message by its `type` field, forwards it
//! to the matching downstream handler service, and returns the handler's
//! reply in a normalized envelope. Unknown types, malformed input, and
//! handler failures come back as structured JSON error envelopes carrying a
//! correlation id.
//!
//! # Modules
//!
//! - [`message`]: inbound message and batch models
//! - [`hub`]: classification, dispatch, normalization, batch fan-out
//! - [`transport`]: HTTP server, routing table, handler client
//! - [`config`]: YAML + environment configuration
//! - [`mock`]: in-process mock handler services

pub mod config;
pub mod error;
pub mod hub;
pub mod lifecycle;
pub mod logging_layer;
pub mod message;
pub mod metrics;
pub mod mock;
pub mod transport;
