use std::collections::BTreeMap;
use std::future::Future;

use crate::event::Event;
use crate::projection::Setting;
use crate::store::{CommitError, StorageError};

/// Read side of the event log.
///
/// Reads observe at least every commit that completed before them. Anything
/// staler than that is caught by the [`Committer`] when the decision based on
/// it is committed.
pub trait Repository: Send + Sync {
    /// Current projected state of one key; the default setting if unknown.
    fn get_setting(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Setting, StorageError>> + Send;

    /// Full history of one key, oldest first.
    fn events_for_key(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Vec<Event>, StorageError>> + Send;

    /// Every key that currently has a value, with that value.
    fn all_settings(
        &self,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, StorageError>> + Send;

    /// Get the current value of a setting.
    fn current_value(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StorageError>> + Send {
        async move { Ok::<_, StorageError>(self.get_setting(key).await?.value) }
    }
}

/// Write side of the event log.
pub trait Committer: Send + Sync {
    /// Durably append `events` as one all-or-nothing unit.
    ///
    /// Every event must carry the index directly after the last committed
    /// index for its key (earlier events of the same batch included). The
    /// check must be enforced by the storage itself, atomically with the
    /// write; a violation fails with [`CommitError::StaleState`] and leaves
    /// the log untouched.
    fn commit_batch(
        &self,
        events: Vec<Event>,
    ) -> impl Future<Output = Result<(), CommitError>> + Send;

    /// Append a single event.
    fn append(&self, event: Event) -> impl Future<Output = Result<(), CommitError>> + Send {
        self.commit_batch(vec![event])
    }

    /// Start a transaction whose events are committed together.
    fn begin(&self) -> Transaction<'_, Self>
    where
        Self: Sized,
    {
        Transaction::new(self)
    }
}

/// Events waiting to be committed as one batch.
///
/// Nothing reaches the log until [`commit`](Transaction::commit) succeeds. A
/// transaction that is aborted or dropped discards its events.
pub struct Transaction<'a, C: Committer> {
    committer: &'a C,
    events: Vec<Event>,
    committed: bool,
}

impl<'a, C: Committer> Transaction<'a, C> {
    pub fn new(committer: &'a C) -> Self {
        Self {
            committer,
            events: Vec::new(),
            committed: false,
        }
    }

    /// Append an event to the transaction.
    pub fn append(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Commit every appended event, or none of them.
    pub async fn commit(mut self) -> Result<(), CommitError> {
        let events = std::mem::take(&mut self.events);
        self.committed = true;
        if events.is_empty() {
            return Ok(());
        }
        tracing::debug!(event_count = events.len(), "committing transaction");
        self.committer.commit_batch(events).await
    }

    /// Discard the transaction without committing anything.
    pub fn abort(mut self) {
        let discarded = std::mem::take(&mut self.events);
        self.committed = true;
        tracing::trace!(event_count = discarded.len(), "transaction aborted");
    }
}

impl<C: Committer> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if !self.committed && !self.events.is_empty() {
            tracing::trace!(
                event_count = self.events.len(),
                "transaction dropped without commit; discarding buffered events"
            );
        }
    }
}
