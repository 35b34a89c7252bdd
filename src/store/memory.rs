use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::event::Event;
use crate::event_store::{Committer, Repository};
use crate::projection::{self, Setting};
use crate::store::{CommitError, StorageError, check_successors};

/// An event log held in process memory.
///
/// Clones share the same log, so one clone can be handed to the service as
/// its repository and another as its committer.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    log: Arc<Mutex<Vec<Event>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose log starts out as `history`, taken as already committed.
    pub fn with_history(history: Vec<Event>) -> Self {
        Self {
            log: Arc::new(Mutex::new(history)),
        }
    }

    /// Every committed event, in commit order.
    pub fn history(&self) -> Vec<Event> {
        self.log().clone()
    }

    fn log(&self) -> MutexGuard<'_, Vec<Event>> {
        // appends are all-or-nothing, so a poisoned log is still consistent
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Repository for InMemoryStore {
    async fn get_setting(&self, key: &str) -> Result<Setting, StorageError> {
        let log = self.log();
        Ok(projection::project(
            log.iter().filter(|event| event.key() == key),
        ))
    }

    async fn events_for_key(&self, key: &str) -> Result<Vec<Event>, StorageError> {
        let mut events: Vec<Event> = self
            .log()
            .iter()
            .filter(|event| event.key() == key)
            .cloned()
            .collect();
        events.sort_by(Event::in_sequence);
        Ok(events)
    }

    async fn all_settings(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let log = self.log();
        Ok(projection::values(projection::current_settings(log.iter())))
    }
}

impl Committer for InMemoryStore {
    async fn commit_batch(&self, events: Vec<Event>) -> Result<(), CommitError> {
        let mut log = self.log();
        check_successors(&events, |key| {
            log.iter()
                .filter(|event| event.key() == key)
                .map(Event::index)
                .max()
        })?;
        log.extend(events);
        Ok(())
    }
}
