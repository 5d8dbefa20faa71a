//! Event model and history contracts for the broker.
//!
//! This crate is the leaf of the workspace: it has no dependencies on the
//! other internal crates, so the broker core (`sse`), the infrastructure
//! layer (`service`) and the HTTP layer (`web`) can all share one vocabulary.
//!
//! # Architecture
//!
//! - **Event**: sum type over the two frames a stream can carry, a data
//!   publication and a single-line comment (used for heartbeats)
//! - **Repository**: pluggable source of historical events, used to replay
//!   missed events to reconnecting clients

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A data event delivered to subscribers.
///
/// `id` and `event` are optional on the wire; an empty string means the
/// field is omitted. `data` is always emitted, even when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event: String,
    pub data: String,
}

impl Publication {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }
}

/// A single meta line, not a data record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comment {
    pub value: String,
}

impl Comment {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Anything the broker can fan out to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Publication(Publication),
    Comment(Comment),
}

impl Event {
    /// Shorthand for a publication carrying only a data payload.
    pub fn data(data: impl Into<String>) -> Self {
        Event::Publication(Publication::new(data))
    }

    pub fn comment(value: impl Into<String>) -> Self {
        Event::Comment(Comment::new(value))
    }

    /// The event identifier, if this is a publication with a non-empty id.
    pub fn id(&self) -> Option<&str> {
        match self {
            Event::Publication(p) if !p.id.is_empty() => Some(&p.id),
            _ => None,
        }
    }

    /// The event name, if this is a publication with a non-empty name.
    pub fn event(&self) -> Option<&str> {
        match self {
            Event::Publication(p) if !p.event.is_empty() => Some(&p.event),
            _ => None,
        }
    }

    /// The data payload. Comments carry none; publications always do.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Event::Publication(p) => Some(&p.data),
            Event::Comment(_) => None,
        }
    }
}

impl From<Publication> for Event {
    fn from(publication: Publication) -> Self {
        Event::Publication(publication)
    }
}

impl From<Comment> for Event {
    fn from(comment: Comment) -> Self {
        Event::Comment(comment)
    }
}

/// A finite, ordered, one-shot sequence of historical events.
pub type Replay = BoxStream<'static, Event>;

/// Source of historical events for one or more channels.
///
/// Implementations may be backed by anything (a database, a log, memory).
/// A store that fails part way should simply end the stream; the broker
/// carries on with live traffic.
pub trait Repository: Send + Sync {
    /// Events on `channel` that follow `last_event_id`.
    ///
    /// An empty `last_event_id` asks for everything available.
    fn replay(&self, channel: &str, last_event_id: &str) -> Replay;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, StreamExt};

    struct Fixed(Vec<Event>);

    impl Repository for Fixed {
        fn replay(&self, _channel: &str, _last_event_id: &str) -> Replay {
            stream::iter(self.0.clone()).boxed()
        }
    }

    #[test]
    fn publication_accessors_hide_empty_optional_fields() {
        let event = Event::data("payload");
        assert_eq!(event.id(), None);
        assert_eq!(event.event(), None);
        assert_eq!(event.payload(), Some("payload"));

        let event: Event = Publication::new("").with_id("7").with_event("tick").into();
        assert_eq!(event.id(), Some("7"));
        assert_eq!(event.event(), Some("tick"));
        assert_eq!(event.payload(), Some(""));
    }

    #[test]
    fn comment_has_no_data_capabilities() {
        let event = Event::comment("hello");
        assert_eq!(event.id(), None);
        assert_eq!(event.event(), None);
        assert_eq!(event.payload(), None);
    }

    #[test]
    fn publication_deserializes_with_missing_optional_fields() {
        let publication: Publication = serde_json::from_str(r#"{"data":"x"}"#).unwrap();
        assert_eq!(publication, Publication::new("x"));

        let json = serde_json::to_string(&Publication::new("x").with_event("e")).unwrap();
        assert_eq!(json, r#"{"event":"e","data":"x"}"#);
    }

    #[test]
    fn publication_requires_a_data_field() {
        assert!(serde_json::from_str::<Publication>(r#"{"id":"1"}"#).is_err());

        let empty: Publication = serde_json::from_str(r#"{"data":""}"#).unwrap();
        assert_eq!(empty, Publication::new(""));
    }

    #[tokio::test]
    async fn repository_replay_is_a_one_shot_stream() {
        let repo = Fixed(vec![Event::data("a"), Event::data("b")]);
        let replayed: Vec<Event> = repo.replay("news", "").collect().await;
        assert_eq!(replayed, vec![Event::data("a"), Event::data("b")]);
    }
}
