//! Storage backends for the event log.
//!
//! Both backends implement [`Repository`](crate::Repository) and
//! [`Committer`](crate::Committer):
//!
//! - [`InMemoryStore`] keeps the log in process memory, for tests and local
//!   development.
//! - [`FileSystemStore`] keeps one JSON file per event under a root
//!   directory, so several processes can share a log.
//!
//! Whatever the backend, a commit only succeeds when every event in the
//! batch carries the index directly after the last committed index for its
//! key. Anything else is reported as [`CommitError::StaleState`] and nothing
//! from the batch is kept.

mod filesystem;
mod memory;

pub use filesystem::FileSystemStore;
pub use memory::InMemoryStore;

use std::collections::HashMap;

use thiserror::Error;

use crate::event::Event;

/// Failures of the storage backend itself.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A stored event could not be encoded or decoded
    #[error(transparent)]
    Codec(#[from] serde_json::Error),

    #[error("key cannot be stored: {key:?}")]
    InvalidKey { key: String },

    #[error("commit lock busy: {lock_path}")]
    LockBusy { lock_path: String },
}

/// Why a batch of events was not committed.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The event's index is not the successor of the last committed index
    #[error("stale state for '{key}': index {attempted} does not follow {}", current.map_or_else(|| "an empty history".to_string(), |c| format!("index {c}")))]
    StaleState {
        key: String,
        attempted: u64,
        current: Option<u64>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Check that each event in `batch` follows the last committed index for its
/// key, counting earlier events of the same batch.
///
/// `highest` reports the last committed index for a key.
pub(crate) fn check_successors(
    batch: &[Event],
    mut highest: impl FnMut(&str) -> Option<u64>,
) -> Result<(), CommitError> {
    let mut staged: HashMap<&str, u64> = HashMap::new();
    for event in batch {
        let current = match staged.get(event.key()) {
            Some(index) => Some(*index),
            None => highest(event.key()),
        };
        let expected = current.map_or(0, |index| index + 1);
        if event.index() != expected {
            return Err(CommitError::StaleState {
                key: event.key().to_owned(),
                attempted: event.index(),
                current,
            });
        }
        staged.insert(event.key(), event.index());
    }
    Ok(())
}
