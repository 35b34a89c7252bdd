use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::command::{ChangeValue, SetValue, UnsetValue};
use crate::config::ExecuteConfig;
use crate::error::Error;
use crate::event::Event;
use crate::event_store::{Committer, Repository};
use crate::execute;
use crate::key::SettingKey;

/// The public face of the settings log.
///
/// Each write reads the current state through `state`, decides with the
/// domain rules and commits through `committer`, retrying on stale state as
/// configured. A successful call has appended exactly one event; a failed one
/// has appended none.
#[derive(Debug, Clone)]
pub struct ToySettings<R, C> {
    state: R,
    committer: C,
    config: ExecuteConfig,
}

impl<R, C> ToySettings<R, C>
where
    R: Repository,
    C: Committer,
{
    pub fn new(state: R, committer: C, config: ExecuteConfig) -> Self {
        Self {
            state,
            committer,
            config,
        }
    }

    /// Turn user input into a setting key.
    pub fn normalize_key(raw: &str) -> Result<SettingKey, Error> {
        Ok(SettingKey::try_new(raw)?)
    }

    pub fn config(&self) -> &ExecuteConfig {
        &self.config
    }

    /// Create a new setting.
    ///
    /// Fails with [`Error::AlreadySet`] if the setting already has a value.
    pub async fn set(
        &self,
        key: &SettingKey,
        value: &str,
        timestamp: DateTime<Utc>,
        by: &str,
    ) -> Result<(), Error> {
        let command = SetValue::new(key.to_string(), value, timestamp, by);
        match execute(&command, &self.state, &self.committer, &self.config).await {
            Ok(()) => {
                tracing::info!(key = %key, value, "set");
                Ok(())
            }
            Err(err) => Err(log_rejection(key, err)),
        }
    }

    /// Change the current value of a setting.
    ///
    /// Fails with [`Error::NotSet`] if there is no value to change.
    pub async fn change(
        &self,
        key: &SettingKey,
        new_value: &str,
        timestamp: DateTime<Utc>,
        by: &str,
    ) -> Result<(), Error> {
        let command = ChangeValue::new(key.to_string(), new_value, timestamp, by);
        match execute(&command, &self.state, &self.committer, &self.config).await {
            Ok(()) => {
                tracing::info!(key = %key, value = new_value, "changed");
                Ok(())
            }
            Err(err) => Err(log_rejection(key, err)),
        }
    }

    /// Unset a setting.
    ///
    /// Fails with [`Error::NotSet`] if there is no value to remove.
    pub async fn unset(
        &self,
        key: &SettingKey,
        timestamp: DateTime<Utc>,
        by: &str,
    ) -> Result<(), Error> {
        let command = UnsetValue::new(key.to_string(), timestamp, by);
        match execute(&command, &self.state, &self.committer, &self.config).await {
            Ok(()) => {
                tracing::info!(key = %key, "unset");
                Ok(())
            }
            Err(err) => Err(log_rejection(key, err)),
        }
    }

    pub async fn current_value(&self, key: &SettingKey) -> Result<Option<String>, Error> {
        Ok(self.state.current_value(key.as_ref()).await?)
    }

    /// Every event recorded for `key`, oldest first.
    pub async fn history(&self, key: &SettingKey) -> Result<Vec<Event>, Error> {
        Ok(self.state.events_for_key(key.as_ref()).await?)
    }

    pub async fn all_settings(&self) -> Result<BTreeMap<String, String>, Error> {
        Ok(self.state.all_settings().await?)
    }
}

fn log_rejection(key: &SettingKey, err: Error) -> Error {
    match &err {
        Error::AlreadySet { .. } => tracing::error!(key = %key, "already set"),
        Error::NotSet { .. } => tracing::error!(key = %key, "not set"),
        _ => {}
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn service(store: &InMemoryStore) -> ToySettings<InMemoryStore, InMemoryStore> {
        ToySettings::new(store.clone(), store.clone(), ExecuteConfig::default())
    }

    fn key(raw: &str) -> SettingKey {
        SettingKey::try_new(raw).unwrap()
    }

    #[tokio::test]
    async fn set_records_one_event() {
        let store = InMemoryStore::new();
        let set_at = Utc::now();
        service(&store)
            .set(&key("FOO"), "42", set_at, "me")
            .await
            .unwrap();

        assert_eq!(store.history(), vec![Event::set("FOO", 0, set_at, "me", "42")]);
    }

    #[tokio::test]
    async fn set_cannot_update_value() {
        let set_at = Utc::now();
        let store = InMemoryStore::with_history(vec![Event::set("FOO", 0, set_at, "me", "42")]);

        let result = service(&store).set(&key("FOO"), "43", Utc::now(), "me").await;
        assert!(matches!(result, Err(Error::AlreadySet { ref key }) if key == "FOO"));
        assert_eq!(store.history().len(), 1);
    }

    #[tokio::test]
    async fn can_change_setting() {
        let set_at = Utc::now();
        let store = InMemoryStore::with_history(vec![Event::set("FOO", 0, set_at, "me", "42")]);

        let changed_at = Utc::now();
        service(&store)
            .change(&key("FOO"), "43", changed_at, "me")
            .await
            .unwrap();
        assert_eq!(
            store.history().last(),
            Some(&Event::changed("FOO", 1, changed_at, "me", "43"))
        );
    }

    #[tokio::test]
    async fn cannot_change_non_existent_setting() {
        let store = InMemoryStore::new();
        let result = service(&store).change(&key("FOO"), "42", Utc::now(), "me").await;
        assert!(matches!(result, Err(Error::NotSet { ref key }) if key == "FOO"));
        assert!(store.history().is_empty());
    }

    #[tokio::test]
    async fn unset_removes_value() {
        let store = InMemoryStore::with_history(vec![Event::set("FOO", 0, Utc::now(), "me", "42")]);
        let settings = service(&store);

        settings.unset(&key("FOO"), Utc::now(), "me").await.unwrap();
        assert_eq!(settings.current_value(&key("FOO")).await.unwrap(), None);
        assert_eq!(settings.history(&key("FOO")).await.unwrap().len(), 2);
    }

    #[test]
    fn normalize_key_rejects_garbage() {
        assert!(matches!(
            ToySettings::<InMemoryStore, InMemoryStore>::normalize_key(" "),
            Err(Error::InvalidKey(_))
        ));
        assert_eq!(
            ToySettings::<InMemoryStore, InMemoryStore>::normalize_key("foo")
                .unwrap()
                .as_ref(),
            "FOO"
        );
    }
}
