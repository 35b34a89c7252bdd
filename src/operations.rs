//! Domain rules for settings.
//!
//! A key is either unset (no value) or set. `set` is only legal from the
//! unset state; `change` and `unset` are only legal from the set state. Each
//! legal operation produces exactly one event whose index is the successor of
//! the current one. These functions perform no I/O.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::Event;
use crate::projection::Setting;

/// A requested operation is not legal in the current state of its key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("setting '{0}' is already set")]
    AlreadySet(String),

    #[error("setting '{0}' is not set")]
    NotSet(String),
}

/// Create a new setting.
pub fn set(
    current: &Setting,
    key: &str,
    value: &str,
    timestamp: DateTime<Utc>,
    by: &str,
) -> Result<Event, OperationError> {
    if current.is_set() {
        return Err(OperationError::AlreadySet(key.to_owned()));
    }
    Ok(Event::set(key, current.next_index(), timestamp, by, value))
}

/// Change the current value of a setting.
pub fn change(
    current: &Setting,
    key: &str,
    new_value: &str,
    timestamp: DateTime<Utc>,
    by: &str,
) -> Result<Event, OperationError> {
    if !current.is_set() {
        return Err(OperationError::NotSet(key.to_owned()));
    }
    Ok(Event::changed(
        key,
        current.next_index(),
        timestamp,
        by,
        new_value,
    ))
}

/// Unset a setting.
pub fn unset(
    current: &Setting,
    key: &str,
    timestamp: DateTime<Utc>,
    by: &str,
) -> Result<Event, OperationError> {
    if !current.is_set() {
        return Err(OperationError::NotSet(key.to_owned()));
    }
    Ok(Event::unset(key, current.next_index(), timestamp, by))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::project;

    fn setting(value: Option<&str>, index: Option<u64>) -> Setting {
        Setting {
            value: value.map(str::to_owned),
            index,
        }
    }

    #[test]
    fn set_from_nothing_starts_at_index_zero() {
        let now = Utc::now();
        let event = set(&Setting::default(), "FOO", "42", now, "me").unwrap();
        assert_eq!(event, Event::set("FOO", 0, now, "me", "42"));
    }

    #[test]
    fn set_after_unset_continues_the_sequence() {
        let now = Utc::now();
        let event = set(&setting(None, Some(4)), "FOO", "42", now, "me").unwrap();
        assert_eq!(event.index(), 5);
    }

    #[test]
    fn set_cannot_update_value() {
        let result = set(&setting(Some("42"), Some(0)), "FOO", "43", Utc::now(), "me");
        assert_eq!(result, Err(OperationError::AlreadySet("FOO".to_string())));
    }

    #[test]
    fn change_replaces_value() {
        let now = Utc::now();
        let event = change(&setting(Some("42"), Some(0)), "FOO", "43", now, "me").unwrap();
        assert_eq!(event, Event::changed("FOO", 1, now, "me", "43"));
    }

    #[test]
    fn cannot_change_non_existent_setting() {
        let result = change(&Setting::default(), "FOO", "42", Utc::now(), "me");
        assert_eq!(result, Err(OperationError::NotSet("FOO".to_string())));
    }

    #[test]
    fn cannot_change_unset_setting() {
        let result = change(&setting(None, Some(1)), "FOO", "42", Utc::now(), "me");
        assert_eq!(result, Err(OperationError::NotSet("FOO".to_string())));
    }

    #[test]
    fn unset_removes_value() {
        let now = Utc::now();
        let event = unset(&setting(Some("42"), Some(0)), "FOO", now, "me").unwrap();
        assert_eq!(event, Event::unset("FOO", 1, now, "me"));
    }

    #[test]
    fn cannot_unset_twice() {
        let now = Utc::now();
        let first = unset(&setting(Some("42"), Some(0)), "FOO", now, "me").unwrap();
        let history = [Event::set("FOO", 0, now, "me", "42"), first];
        let result = unset(&project(&history), "FOO", now, "me");
        assert_eq!(result, Err(OperationError::NotSet("FOO".to_string())));
    }

    #[test]
    fn lifecycle_can_repeat() {
        let now = Utc::now();
        let mut history = Vec::new();
        for _ in 0..3 {
            history.push(set(&project(&history), "FOO", "1", now, "me").unwrap());
            history.push(change(&project(&history), "FOO", "2", now, "me").unwrap());
            history.push(unset(&project(&history), "FOO", now, "me").unwrap());
        }
        let indexes: Vec<u64> = history.iter().map(Event::index).collect();
        assert_eq!(indexes, (0..9).collect::<Vec<_>>());
        assert!(!project(&history).is_set());
    }
}
