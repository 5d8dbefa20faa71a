//! Server-Sent Events (SSE) broker core.
//!
//! Fans published events out to long-lived streaming clients grouped by
//! named channels, replays missed events to reconnecting clients and encodes
//! everything into the `text/event-stream` wire format.
//!
//! # Architecture
//!
//! - **Single-owner coordinator**: one task owns the channel → subscriber map
//!   and the channel → repository map. Everything else talks to it through
//!   [`Broker`], so the maps are never locked.
//! - **Bounded per-subscription queues**: the only state shared between tasks.
//!   Publishing never blocks: a subscriber whose queue is full is disconnected
//!   rather than allowed to stall the fan-out or silently lose events.
//! - **Pluggable history**: a channel (or the whole broker, by default) can be
//!   bound to an [`events::Repository`]; clients that reconnect with a
//!   `Last-Event-ID` get the missed events replayed by a separate task.
//! - **Byte-exact encoding**: [`Encoder`] writes records and comment lines,
//!   flushing after every event, optionally through gzip.
//!
//! Replayed and live events share one queue and may interleave; only the
//! start of replay is ordered relative to registration.
//!
//! # Example
//!
//! ```rust,ignore
//! use sse::{Broker, BrokerConfig};
//! use events::Event;
//!
//! let broker = Broker::new(BrokerConfig::default());
//! let mut subscription = broker.subscribe("news", "").await;
//! broker.publish(["news"], Event::data("hello")).await;
//! assert_eq!(subscription.recv().await, Some(Event::data("hello")));
//! ```
//!
//! # Modules
//!
//! - `broker`: the coordinator task and its [`Broker`] handle
//! - `encoder`: wire format serialization
//! - `history`: bounded in-memory repository
//! - `subscription`: subscription queues and their identity

pub mod broker;
pub mod encoder;
pub mod error;
pub mod history;
pub mod subscription;

pub use broker::{Broker, BrokerConfig, DEFAULT_BUFFER_SIZE};
pub use encoder::{format_event, Encoder};
pub use error::Error;
pub use history::History;
pub use subscription::{Subscription, SubscriptionId};
