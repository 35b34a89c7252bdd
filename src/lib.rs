//! Event-sourced key/value settings.
//!
//! Settings are never stored directly. Every change is recorded as an
//! [`Event`] in an append-only log and the current value of a key is
//! [projected](project) from its history. Writers validate against the
//! projected state and commit optimistically: the log only accepts an event
//! whose index directly follows the last one committed for its key, and a
//! writer that lost the race re-reads and tries again.
//!
//! ```rust
//! use chrono::Utc;
//! use toy_settings::{ExecuteConfig, InMemoryStore, SettingKey, ToySettings};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), toy_settings::Error> {
//! let store = InMemoryStore::new();
//! let settings = ToySettings::new(store.clone(), store, ExecuteConfig::default());
//!
//! let key = SettingKey::try_new("foo")?;
//! settings.set(&key, "42", Utc::now(), "me").await?;
//! settings.change(&key, "43", Utc::now(), "me").await?;
//!
//! let all = settings.all_settings().await?;
//! assert_eq!(all.get("FOO").map(String::as_str), Some("43"));
//! # Ok(())
//! # }
//! ```

mod command;
mod config;
mod delay;
mod error;
mod event;
mod event_store;
mod key;
pub mod operations;
mod projection;
mod service;
pub mod store;

pub use command::{ChangeValue, Command, SetValue, UnsetValue};
pub use config::{ExecuteConfig, MAX_RETRIES_VAR, MAX_WAIT_SECONDS_VAR};
pub use delay::RetryDelay;
pub use error::Error;
pub use event::{Event, EventKind};
pub use event_store::{Committer, Repository, Transaction};
pub use key::{MAX_KEY_LEN, SettingKey, SettingKeyError};
pub use operations::OperationError;
pub use projection::{Setting, current_settings, project};
pub use service::ToySettings;
pub use store::{CommitError, FileSystemStore, InMemoryStore, StorageError};

/// Run `command` to completion: read the current state of its key, decide,
/// and commit, starting over whenever the commit reports stale state.
///
/// Only [`CommitError::StaleState`] is retried, at most
/// `config.max_retries()` times, sleeping a jittered exponential delay
/// between attempts. Rejections by the command and storage failures end the
/// call at once.
pub async fn execute<C, R, W>(
    command: &C,
    state: &R,
    committer: &W,
    config: &ExecuteConfig,
) -> Result<(), Error>
where
    C: Command + Sync,
    C::Error: Into<Error>,
    R: Repository,
    W: Committer,
{
    let key = command.key();
    let mut retries = 0;

    loop {
        let current = state.get_setting(key).await?;
        let domain_events = match command.handle(&current) {
            Ok(events) => events,
            Err(err) => return Err(err.into()),
        };

        let mut transaction = committer.begin();
        for event in domain_events {
            transaction.append(event);
        }

        match transaction.commit().await {
            Ok(()) => return Ok(()),
            Err(CommitError::StaleState {
                attempted, current, ..
            }) => {
                let Some(delay) = config.backoff(retries) else {
                    tracing::error!(key, attempts = retries + 1, "giving up on stale state");
                    return Err(Error::StaleState {
                        key: key.to_owned(),
                        attempts: retries + 1,
                    });
                };
                tracing::warn!(
                    key,
                    attempt = retries + 1,
                    attempted,
                    current = ?current,
                    delay_ms = delay.as_millis() as u64,
                    "stale state, retrying"
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            Err(CommitError::Storage(err)) => return Err(err.into()),
        }
    }
}
