//! SSE streaming handler for the web layer.
//!
//! This module only adapts HTTP connections onto broker subscriptions.
//! The broker itself (coordinator, queues, encoder) lives in the `sse` crate.

pub mod handler;
