//! Current state of settings, derived from their event history.

use std::collections::BTreeMap;

use crate::event::{Event, EventKind};

/// The projected state of one setting.
///
/// `value` is `None` when the key was never set or is currently unset.
/// `index` is the index of the last event folded in, or `None` when there is
/// no history at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Setting {
    pub value: Option<String>,
    pub index: Option<u64>,
}

impl Setting {
    /// Index the next event for this key must carry.
    pub fn next_index(&self) -> u64 {
        self.index.map_or(0, |index| index + 1)
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Apply an event to the current state and return the new state.
    pub fn apply(&self, event: &Event) -> Self {
        let value = match event.kind() {
            EventKind::Set { value } => Some(value.clone()),
            EventKind::Changed { new_value } => Some(new_value.clone()),
            EventKind::Unset => None,
        };
        Self {
            value,
            index: Some(event.index()),
        }
    }
}

/// Fold the history of one key into its current [`Setting`].
///
/// Events are folded in index order regardless of the order they are given
/// in, so the result's index is always the highest committed one.
pub fn project<'a>(history: impl IntoIterator<Item = &'a Event>) -> Setting {
    let mut events: Vec<&Event> = history.into_iter().collect();
    events.sort_by(|a, b| Event::in_sequence(a, b));
    events
        .into_iter()
        .fold(Setting::default(), |setting, event| setting.apply(event))
}

/// Fold a log covering many keys, projecting each key independently.
pub fn current_settings<'a>(
    log: impl IntoIterator<Item = &'a Event>,
) -> BTreeMap<String, Setting> {
    let mut by_key: BTreeMap<String, Vec<&Event>> = BTreeMap::new();
    for event in log {
        by_key.entry(event.key().to_owned()).or_default().push(event);
    }
    by_key
        .into_iter()
        .map(|(key, history)| (key, project(history)))
        .collect()
}

/// Keys whose current value is set, with that value.
pub fn values(settings: BTreeMap<String, Setting>) -> BTreeMap<String, String> {
    settings
        .into_iter()
        .filter_map(|(key, setting)| setting.value.map(|value| (key, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn empty_history_is_unset() {
        let setting = project(std::iter::empty());
        assert_eq!(setting, Setting::default());
        assert_eq!(setting.next_index(), 0);
    }

    #[test]
    fn folds_set_change_and_unset() {
        let t0 = Utc::now();
        let history = vec![
            Event::set("FOO", 0, t0, "me", "42"),
            Event::changed("FOO", 1, t0 + Duration::seconds(1), "me", "43"),
        ];
        assert_eq!(
            project(&history),
            Setting {
                value: Some("43".to_string()),
                index: Some(1),
            }
        );

        let mut history = history;
        history.push(Event::unset("FOO", 2, t0 + Duration::seconds(2), "me"));
        let setting = project(&history);
        assert_eq!(setting.value, None);
        assert_eq!(setting.next_index(), 3);
    }

    #[test]
    fn folds_in_index_order() {
        let t0 = Utc::now();
        let history = [
            Event::changed("FOO", 1, t0 + Duration::seconds(1), "me", "43"),
            Event::set("FOO", 0, t0, "me", "42"),
        ];
        let setting = project(&history);
        assert_eq!(setting.value.as_deref(), Some("43"));
        assert_eq!(setting.index, Some(1));
    }

    #[test]
    fn retried_event_with_older_timestamp_still_wins() {
        let t0 = Utc::now();
        let history = [
            Event::set("FOO", 0, t0, "me", "42"),
            Event::changed("FOO", 1, t0 + Duration::seconds(2), "rival", "100"),
            Event::changed("FOO", 2, t0 + Duration::seconds(1), "me", "43"),
        ];
        let setting = project(&history);
        assert_eq!(setting.value.as_deref(), Some("43"));
        assert_eq!(setting.next_index(), 3);
    }

    #[test]
    fn projection_is_deterministic() {
        let t0 = Utc::now();
        let history = vec![
            Event::set("FOO", 0, t0, "me", "42"),
            Event::unset("FOO", 1, t0, "me"),
            Event::set("FOO", 2, t0, "me", "7"),
        ];
        assert_eq!(project(&history), project(&history));
    }

    #[test]
    fn keys_are_projected_independently() {
        let t0 = Utc::now();
        let log = vec![
            Event::set("FOO", 0, t0, "me", "42"),
            Event::set("BAR", 0, t0, "me", "1"),
            Event::unset("BAR", 1, t0 + Duration::seconds(1), "me"),
        ];
        let settings = current_settings(&log);
        assert_eq!(settings["FOO"].value.as_deref(), Some("42"));
        assert_eq!(settings["BAR"].index, Some(1));

        let set = values(settings);
        assert_eq!(set.len(), 1);
        assert_eq!(set["FOO"], "42");
    }
}
