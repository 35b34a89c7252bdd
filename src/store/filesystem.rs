use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use futures::{TryStreamExt, future};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_stream::wrappers::ReadDirStream;
use uuid::Uuid;

use crate::event::Event;
use crate::event_store::{Committer, Repository};
use crate::key::is_valid_key;
use crate::projection::{self, Setting};
use crate::store::{CommitError, StorageError, check_successors};

const LOCK_FILE: &str = ".commit.lock";
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// An event log stored as one JSON file per event.
///
/// Layout: `<root>/<KEY>/<index>.json`, the index zero-padded so that file
/// names sort in index order. Commits are serialized across processes by a
/// lock file in the root directory, and each event file is linked into place
/// only if no file for that `(key, index)` exists yet.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    root: PathBuf,
    lock_timeout: Duration,
}

impl FileSystemStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    /// How long a commit waits for another writer's lock before giving up
    /// with [`StorageError::LockBusy`].
    pub fn with_lock_timeout(self, lock_timeout: Duration) -> Self {
        Self {
            lock_timeout,
            ..self
        }
    }

    /// Open the store under `$XDG_STATE_HOME/toy-settings`, falling back to
    /// `~/.local/state/toy-settings`.
    pub async fn from_env() -> Result<Self, StorageError> {
        let state_home = std::env::var_os("XDG_STATE_HOME")
            .map(PathBuf::from)
            .filter(|path| path.is_absolute())
            .or_else(|| {
                std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/state"))
            })
            .ok_or_else(|| {
                std::io::Error::new(
                    ErrorKind::NotFound,
                    "neither XDG_STATE_HOME nor HOME is set",
                )
            })?;
        Self::open(state_home.join("toy-settings")).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || !is_valid_key(key) {
            return Err(StorageError::InvalidKey {
                key: key.to_owned(),
            });
        }
        Ok(self.root.join(key))
    }

    async fn read_key(&self, key: &str) -> Result<Vec<Event>, StorageError> {
        let Some(entries) = read_dir_if_exists(&self.key_dir(key)?).await? else {
            return Ok(Vec::new());
        };
        let mut events: Vec<Event> = entries
            .map_err(StorageError::from)
            .try_filter_map(|entry| read_event(entry.path()))
            .try_collect()
            .await?;
        events.sort_by(Event::in_sequence);
        Ok(events)
    }

    async fn highest_index(&self, key: &str) -> Result<Option<u64>, StorageError> {
        let Some(entries) = read_dir_if_exists(&self.key_dir(key)?).await? else {
            return Ok(None);
        };
        entries
            .map_err(StorageError::from)
            .try_fold(None, |highest: Option<u64>, entry| {
                future::ok(highest.max(event_file_index(&entry.path())))
            })
            .await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let Some(entries) = read_dir_if_exists(&self.root).await? else {
            return Ok(Vec::new());
        };
        entries
            .map_err(StorageError::from)
            .try_filter_map(|entry| async move {
                let name = entry.file_name().to_string_lossy().into_owned();
                let is_key = entry.file_type().await?.is_dir() && is_valid_key(&name);
                Ok::<_, StorageError>(is_key.then_some(name))
            })
            .try_collect()
            .await
    }

    /// Write `event` to a staging file in its key directory and flush it to
    /// disk. Nothing is visible to readers until the batch is linked.
    async fn stage_event(&self, batch: &mut PendingBatch, event: &Event) -> Result<(), CommitError> {
        let dir = self.key_dir(event.key())?;
        fs::create_dir_all(&dir).await.map_err(StorageError::from)?;

        let staging = dir.join(format!(".{}.tmp", Uuid::new_v4()));
        let payload = serde_json::to_vec(event).map_err(StorageError::from)?;
        batch.staged.push(StagedEvent {
            staging: staging.clone(),
            target: dir.join(event_file_name(event.index())),
            key: event.key().to_owned(),
            index: event.index(),
        });

        let mut file = fs::File::create(&staging)
            .await
            .map_err(StorageError::from)?;
        file.write_all(&payload).await.map_err(StorageError::from)?;
        file.sync_all().await.map_err(StorageError::from)?;
        Ok(())
    }
}

impl Repository for FileSystemStore {
    async fn get_setting(&self, key: &str) -> Result<Setting, StorageError> {
        Ok(projection::project(&self.read_key(key).await?))
    }

    async fn events_for_key(&self, key: &str) -> Result<Vec<Event>, StorageError> {
        self.read_key(key).await
    }

    async fn all_settings(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let mut settings = BTreeMap::new();
        for key in self.keys().await? {
            if let Some(value) = projection::project(&self.read_key(&key).await?).value {
                settings.insert(key, value);
            }
        }
        Ok(settings)
    }
}

impl Committer for FileSystemStore {
    async fn commit_batch(&self, events: Vec<Event>) -> Result<(), CommitError> {
        if events.is_empty() {
            return Ok(());
        }
        let _lock = CommitLock::acquire(&self.root, self.lock_timeout).await?;

        let mut highest: HashMap<String, Option<u64>> = HashMap::new();
        for event in &events {
            if !highest.contains_key(event.key()) {
                let index = self.highest_index(event.key()).await?;
                highest.insert(event.key().to_owned(), index);
            }
        }
        check_successors(&events, |key| highest.get(key).copied().flatten())?;

        let mut batch = PendingBatch::default();
        for event in &events {
            self.stage_event(&mut batch, event).await?;
        }
        batch.link()?;

        for dir in batch.directories() {
            if let Err(err) = sync_dir(&dir).await {
                tracing::warn!(path = %dir.display(), error = %err, "failed to sync key directory");
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct StagedEvent {
    staging: PathBuf,
    target: PathBuf,
    key: String,
    index: u64,
}

/// Event files of one commit, staged but not yet all linked into place.
///
/// Dropping the batch removes its staging files and, unless every event was
/// linked, the event files it already linked. A commit that fails or is
/// cancelled therefore leaves no trace in the log.
#[derive(Debug, Default)]
struct PendingBatch {
    staged: Vec<StagedEvent>,
    linked: Vec<PathBuf>,
    complete: bool,
}

impl PendingBatch {
    /// Link every staged file to its event file name.
    ///
    /// Runs without await points, so it cannot be cancelled halfway. An
    /// existing event file means another writer took the index first.
    fn link(&mut self) -> Result<(), CommitError> {
        for staged in &self.staged {
            match std::fs::hard_link(&staged.staging, &staged.target) {
                Ok(()) => self.linked.push(staged.target.clone()),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    return Err(CommitError::StaleState {
                        key: staged.key.clone(),
                        attempted: staged.index,
                        current: Some(staged.index),
                    });
                }
                Err(err) => return Err(StorageError::from(err).into()),
            }
        }
        self.complete = true;
        Ok(())
    }

    fn directories(&self) -> BTreeSet<PathBuf> {
        self.staged
            .iter()
            .filter_map(|staged| staged.target.parent().map(Path::to_path_buf))
            .collect()
    }
}

impl Drop for PendingBatch {
    fn drop(&mut self) {
        if !self.complete {
            for path in &self.linked {
                if let Err(err) = std::fs::remove_file(path) {
                    tracing::error!(
                        path = %path.display(),
                        error = %err,
                        "failed to roll back event file"
                    );
                }
            }
        }
        for staged in &self.staged {
            match std::fs::remove_file(&staged.staging) {
                Err(err) if err.kind() != ErrorKind::NotFound => tracing::warn!(
                    path = %staged.staging.display(),
                    error = %err,
                    "failed to remove staging file"
                ),
                _ => {}
            }
        }
    }
}

async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

fn event_file_name(index: u64) -> String {
    format!("{index:020}.json")
}

fn event_file_index(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

async fn read_dir_if_exists(dir: &Path) -> Result<Option<ReadDirStream>, StorageError> {
    match fs::read_dir(dir).await {
        Ok(entries) => Ok(Some(ReadDirStream::new(entries))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn read_event(path: PathBuf) -> Result<Option<Event>, StorageError> {
    if event_file_index(&path).is_none() {
        return Ok(None);
    }
    let raw = fs::read(&path).await?;
    Ok(Some(serde_json::from_slice(&raw)?))
}

/// Exclusive right to commit to a store, held for as long as the guard lives.
struct CommitLock {
    path: PathBuf,
    file: fs::File,
}

impl CommitLock {
    async fn acquire(root: &Path, timeout: Duration) -> Result<Self, StorageError> {
        let path = root.join(LOCK_FILE);
        let attempts = (timeout.as_millis() / LOCK_RETRY_INTERVAL.as_millis()).max(1);
        for _ in 0..attempts {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    let mut lock = Self { path, file };
                    let owner = format!(
                        "pid={}\nutc={}\n",
                        std::process::id(),
                        Utc::now().to_rfc3339()
                    );
                    lock.file.write_all(owner.as_bytes()).await?;
                    return Ok(lock);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StorageError::LockBusy {
            lock_path: path.display().to_string(),
        })
    }
}

impl Drop for CommitLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::error!(
                path = %self.path.display(),
                error = %err,
                "failed to release commit lock"
            );
        }
    }
}
