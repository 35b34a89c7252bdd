//! Events recorded against a setting.
//!
//! An [`Event`] is an immutable fact about one key: it was [set](EventKind::Set),
//! its value was [changed](EventKind::Changed), or it was [unset](EventKind::Unset).
//! Nothing stores the current value of a setting directly; it is always
//! derived from the history of events by [`project`](crate::project).
//!
//! Every event carries its `index`, the position of the event within the
//! history of its key. Indexes start at `0` and grow by exactly one per
//! committed event, which is what lets a [`Committer`](crate::Committer)
//! notice when two writers raced for the same slot.
//!
//! # Examples
//!
//! ```rust
//! use chrono::Utc;
//! use toy_settings::{Event, EventKind};
//!
//! let event = Event::set("FOO", 0, Utc::now(), "me", "42");
//! assert_eq!(event.key(), "FOO");
//! assert_eq!(event.event_type(), "Set");
//! assert_eq!(event.kind(), &EventKind::Set { value: "42".to_string() });
//!
//! let json = serde_json::to_string(&event).unwrap();
//! let deserialized: Event = serde_json::from_str(&json).unwrap();
//! assert_eq!(deserialized, event);
//! ```

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The variant-specific payload of an [`Event`].
///
/// The set of variants is closed; projections match on it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    /// A value was established for a key that had none.
    Set { value: String },
    /// The value of a key that had one was replaced.
    Changed { new_value: String },
    /// The value of a key that had one was removed.
    Unset,
}

/// An immutable record of something that happened to one setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    key: String,
    index: u64,
    timestamp: DateTime<Utc>,
    by: String,
    kind: EventKind,
}

impl Event {
    pub fn new(
        key: impl Into<String>,
        index: u64,
        timestamp: DateTime<Utc>,
        by: impl Into<String>,
        kind: EventKind,
    ) -> Self {
        Self {
            key: key.into(),
            index,
            timestamp,
            by: by.into(),
            kind,
        }
    }

    pub fn set(
        key: impl Into<String>,
        index: u64,
        timestamp: DateTime<Utc>,
        by: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            key,
            index,
            timestamp,
            by,
            EventKind::Set {
                value: value.into(),
            },
        )
    }

    pub fn changed(
        key: impl Into<String>,
        index: u64,
        timestamp: DateTime<Utc>,
        by: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self::new(
            key,
            index,
            timestamp,
            by,
            EventKind::Changed {
                new_value: new_value.into(),
            },
        )
    }

    pub fn unset(
        key: impl Into<String>,
        index: u64,
        timestamp: DateTime<Utc>,
        by: impl Into<String>,
    ) -> Self {
        Self::new(key, index, timestamp, by, EventKind::Unset)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Position of this event within the history of its key.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The actor that caused the event.
    pub fn by(&self) -> &str {
        &self.by
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// The value this event leaves behind, if any.
    pub fn value(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Set { value } => Some(value),
            EventKind::Changed { new_value } => Some(new_value),
            EventKind::Unset => None,
        }
    }

    /// Returns a string identifier for the event type.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::Set { .. } => "Set",
            EventKind::Changed { .. } => "Changed",
            EventKind::Unset => "Unset",
        }
    }

    /// Orders events of one key by index; timestamps only break ties.
    ///
    /// A retried event can carry an older timestamp than the event that beat
    /// it to the previous index.
    pub fn in_sequence(a: &Event, b: &Event) -> Ordering {
        a.index
            .cmp(&b.index)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn value_follows_the_variant() {
        let now = Utc::now();
        assert_eq!(Event::set("FOO", 0, now, "me", "42").value(), Some("42"));
        assert_eq!(
            Event::changed("FOO", 1, now, "me", "43").value(),
            Some("43")
        );
        assert_eq!(Event::unset("FOO", 2, now, "me").value(), None);
    }

    #[test]
    fn sequence_follows_index_over_timestamp() {
        let now = Utc::now();
        let first = Event::set("FOO", 0, now + Duration::seconds(5), "me", "42");
        let second = Event::unset("FOO", 1, now, "me");

        assert_eq!(Event::in_sequence(&first, &second), Ordering::Less);
        assert_eq!(Event::in_sequence(&second, &first), Ordering::Greater);
    }

    #[test]
    fn serializes_with_a_type_tag() {
        let event = Event::unset("FOO", 3, Utc::now(), "me");
        let json = serde_json::to_value(&event).expect("serializable");
        assert_eq!(json["kind"]["type"], "Unset");
        assert_eq!(json["index"], 3);
    }
}
