//! Commands that [`execute`](crate::execute) runs against a setting.
//!
//! A command names the key it targets and decides, given the current
//! [`Setting`], which events to record. The decision is re-made on every
//! attempt, so a command that lost a race is judged again against the state
//! that beat it.
//!
//! # Examples
//!
//! ```rust
//! use chrono::Utc;
//! use toy_settings::{Command, OperationError, SetValue, Setting};
//!
//! let command = SetValue::new("FOO", "42", Utc::now(), "me");
//! let events = command.handle(&Setting::default()).unwrap();
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].index(), 0);
//!
//! let already = Setting { value: Some("1".to_string()), index: Some(0) };
//! assert_eq!(
//!     command.handle(&already),
//!     Err(OperationError::AlreadySet("FOO".to_string()))
//! );
//! ```

use chrono::{DateTime, Utc};

use crate::event::Event;
use crate::operations::{self, OperationError};
use crate::projection::Setting;

/// Represents an intention to modify one setting.
pub trait Command {
    /// The error type that can be returned when handling this command
    type Error: std::error::Error + Send + Sync + 'static;

    /// The key whose history this command reads and extends.
    fn key(&self) -> &str;

    /// Handles the command and produces events
    ///
    /// This should validate the command against `current` and return the
    /// events to record. All returned events are committed as one batch.
    fn handle(&self, current: &Setting) -> Result<Vec<Event>, Self::Error>;
}

/// Establish a value for a key that has none.
#[derive(Debug, Clone)]
pub struct SetValue {
    key: String,
    value: String,
    timestamp: DateTime<Utc>,
    by: String,
}

impl SetValue {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        timestamp: DateTime<Utc>,
        by: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp,
            by: by.into(),
        }
    }
}

impl Command for SetValue {
    type Error = OperationError;

    fn key(&self) -> &str {
        &self.key
    }

    fn handle(&self, current: &Setting) -> Result<Vec<Event>, Self::Error> {
        operations::set(current, &self.key, &self.value, self.timestamp, &self.by)
            .map(|event| vec![event])
    }
}

/// Replace the value of a key that has one.
#[derive(Debug, Clone)]
pub struct ChangeValue {
    key: String,
    new_value: String,
    timestamp: DateTime<Utc>,
    by: String,
}

impl ChangeValue {
    pub fn new(
        key: impl Into<String>,
        new_value: impl Into<String>,
        timestamp: DateTime<Utc>,
        by: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            new_value: new_value.into(),
            timestamp,
            by: by.into(),
        }
    }
}

impl Command for ChangeValue {
    type Error = OperationError;

    fn key(&self) -> &str {
        &self.key
    }

    fn handle(&self, current: &Setting) -> Result<Vec<Event>, Self::Error> {
        operations::change(
            current,
            &self.key,
            &self.new_value,
            self.timestamp,
            &self.by,
        )
        .map(|event| vec![event])
    }
}

/// Remove the value of a key that has one.
#[derive(Debug, Clone)]
pub struct UnsetValue {
    key: String,
    timestamp: DateTime<Utc>,
    by: String,
}

impl UnsetValue {
    pub fn new(key: impl Into<String>, timestamp: DateTime<Utc>, by: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            timestamp,
            by: by.into(),
        }
    }
}

impl Command for UnsetValue {
    type Error = OperationError;

    fn key(&self) -> &str {
        &self.key
    }

    fn handle(&self, current: &Setting) -> Result<Vec<Event>, Self::Error> {
        operations::unset(current, &self.key, self.timestamp, &self.by).map(|event| vec![event])
    }
}
