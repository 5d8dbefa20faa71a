use dashmap::DashMap;
use events::{Event, Publication, Replay, Repository};
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;

/// Default number of publications retained per channel.
pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// Bounded, in-memory, per-channel event history.
///
/// Keeps the most recent `capacity` publications of every channel it has
/// seen and nothing across restarts.
pub struct History {
    capacity: usize,
    channels: DashMap<String, VecDeque<Event>>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: DashMap::new(),
        }
    }

    /// Append a publication to `channel`, forgetting the oldest one beyond capacity.
    pub fn record(&self, channel: &str, publication: Publication) {
        if self.capacity == 0 {
            return;
        }
        let mut retained = self.channels.entry(channel.to_string()).or_default();
        if retained.len() == self.capacity {
            retained.pop_front();
        }
        retained.push_back(Event::Publication(publication));
    }

    /// Number of publications currently retained for `channel`.
    pub fn len(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |retained| retained.len())
    }

    pub fn is_empty(&self, channel: &str) -> bool {
        self.len(channel) == 0
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl Repository for History {
    /// Everything after the event whose id is `last_event_id`. When the cursor
    /// is empty or has already been forgotten, everything retained.
    fn replay(&self, channel: &str, last_event_id: &str) -> Replay {
        let events: Vec<Event> = match self.channels.get(channel) {
            Some(retained) => {
                let start = if last_event_id.is_empty() {
                    0
                } else {
                    retained
                        .iter()
                        .rposition(|event| event.id() == Some(last_event_id))
                        .map_or(0, |position| position + 1)
                };
                retained.iter().skip(start).cloned().collect()
            }
            None => Vec::new(),
        };
        stream::iter(events).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(history: &History, channel: &str, ids: std::ops::Range<u32>) {
        for id in ids {
            history.record(
                channel,
                Publication::new(format!("event {id}")).with_id(id.to_string()),
            );
        }
    }

    async fn replayed_ids(history: &History, channel: &str, cursor: &str) -> Vec<String> {
        history
            .replay(channel, cursor)
            .map(|event| event.id().unwrap_or_default().to_string())
            .collect()
            .await
    }

    #[tokio::test]
    async fn replays_events_after_the_cursor() {
        let history = History::new(10);
        numbered(&history, "news", 1..5);

        assert_eq!(replayed_ids(&history, "news", "2").await, ["3", "4"]);
        assert_eq!(replayed_ids(&history, "news", "4").await, Vec::<String>::new());
    }

    #[tokio::test]
    async fn empty_or_forgotten_cursor_replays_everything_retained() {
        let history = History::new(3);
        numbered(&history, "news", 1..6);

        assert_eq!(history.len("news"), 3);
        assert_eq!(replayed_ids(&history, "news", "").await, ["3", "4", "5"]);
        assert_eq!(replayed_ids(&history, "news", "1").await, ["3", "4", "5"]);
    }

    #[tokio::test]
    async fn channels_are_independent() {
        let history = History::default();
        numbered(&history, "news", 1..3);

        assert!(history.is_empty("sport"));
        assert!(replayed_ids(&history, "sport", "").await.is_empty());
        assert_eq!(replayed_ids(&history, "news", "").await, ["1", "2"]);
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let history = History::new(0);
        numbered(&history, "news", 1..3);
        assert!(history.is_empty("news"));
    }
}
