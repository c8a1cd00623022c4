//! Account and score storage behind the narrow gateway the server consumes.
//!
//! The game only ever talks to [`PersistenceGateway`]. Two implementations
//! ship with the server: [`MemoryStore`] keeps everything in-process, and
//! [`JsonFileStore`] wraps the same data and rewrites a JSON file after every
//! mutation so accounts and scores survive restarts.
//!
//! Store calls may block on disk. Async callers go through [`with_store`],
//! and the game loop writes scores through a [`ScoreWriter`], so neither ever
//! waits on the backing store inside a runtime worker.

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use shared::ScoreEntry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;
pub type StoreResult<T> = Result<T, StoreError>;

pub trait PersistenceGateway: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> StoreResult<bool>;

    /// Returns false when the name is empty or already taken.
    fn create_account(&self, username: &str, password: &str) -> StoreResult<bool>;

    /// Best score recorded for the user, 0 when none.
    fn get_score(&self, username: &str) -> StoreResult<u64>;

    fn insert_score(&self, username: &str, score: u64) -> StoreResult<()>;

    /// Every user's best score, highest first, ties broken by name.
    fn get_all_scores(&self) -> StoreResult<Vec<ScoreEntry>>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
struct StoreData {
    accounts: BTreeMap<String, String>,
    scores: BTreeMap<String, Vec<u64>>,
}

impl StoreData {
    fn authenticate(&self, username: &str, password: &str) -> bool {
        self.accounts
            .get(username)
            .map_or(false, |stored| stored == password)
    }

    fn create_account(&mut self, username: &str, password: &str) -> bool {
        if username.trim().is_empty() || self.accounts.contains_key(username) {
            return false;
        }
        self.accounts
            .insert(username.to_string(), password.to_string());
        true
    }

    fn best(&self, username: &str) -> u64 {
        self.scores
            .get(username)
            .and_then(|scores| scores.iter().max().copied())
            .unwrap_or(0)
    }

    fn leaderboard(&self) -> Vec<ScoreEntry> {
        let mut entries: Vec<ScoreEntry> = self
            .scores
            .keys()
            .map(|username| ScoreEntry {
                username: username.clone(),
                score: self.best(username),
            })
            .collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.username.cmp(&b.username)));
        entries
    }
}

fn lock(data: &Mutex<StoreData>) -> StoreResult<MutexGuard<'_, StoreData>> {
    data.lock().map_err(|_| "score store lock poisoned".into())
}

/// In-process store; contents vanish with the server.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceGateway for MemoryStore {
    fn authenticate(&self, username: &str, password: &str) -> StoreResult<bool> {
        Ok(lock(&self.data)?.authenticate(username, password))
    }

    fn create_account(&self, username: &str, password: &str) -> StoreResult<bool> {
        Ok(lock(&self.data)?.create_account(username, password))
    }

    fn get_score(&self, username: &str) -> StoreResult<u64> {
        Ok(lock(&self.data)?.best(username))
    }

    fn insert_score(&self, username: &str, score: u64) -> StoreResult<()> {
        lock(&self.data)?
            .scores
            .entry(username.to_string())
            .or_default()
            .push(score);
        Ok(())
    }

    fn get_all_scores(&self) -> StoreResult<Vec<ScoreEntry>> {
        Ok(lock(&self.data)?.leaderboard())
    }
}

/// Store persisted as pretty-printed JSON at `path`. A mutation only becomes
/// visible once the file write for it has succeeded.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonFileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    fn save(&self, data: &StoreData) -> StoreResult<()> {
        let contents = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PersistenceGateway for JsonFileStore {
    fn authenticate(&self, username: &str, password: &str) -> StoreResult<bool> {
        Ok(lock(&self.data)?.authenticate(username, password))
    }

    fn create_account(&self, username: &str, password: &str) -> StoreResult<bool> {
        let mut data = lock(&self.data)?;
        let mut next = data.clone();
        if !next.create_account(username, password) {
            return Ok(false);
        }
        self.save(&next)?;
        *data = next;
        Ok(true)
    }

    fn get_score(&self, username: &str) -> StoreResult<u64> {
        Ok(lock(&self.data)?.best(username))
    }

    fn insert_score(&self, username: &str, score: u64) -> StoreResult<()> {
        let mut data = lock(&self.data)?;
        let mut next = data.clone();
        next.scores
            .entry(username.to_string())
            .or_default()
            .push(score);
        self.save(&next)?;
        *data = next;
        Ok(())
    }

    fn get_all_scores(&self) -> StoreResult<Vec<ScoreEntry>> {
        Ok(lock(&self.data)?.leaderboard())
    }
}

/// Runs one store operation on the blocking pool.
pub async fn with_store<T, F>(store: &Arc<dyn PersistenceGateway>, op: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn PersistenceGateway) -> StoreResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(&*store)).await?
}

/// Gateway that queues score writes for a background task and returns at
/// once. Writes are applied in order. Every other call goes straight to the
/// wrapped store.
pub struct ScoreWriter {
    inner: Arc<dyn PersistenceGateway>,
    queue: mpsc::UnboundedSender<(String, u64)>,
}

impl ScoreWriter {
    /// Starts the writer task. Must be called from within a tokio runtime.
    pub fn spawn(inner: Arc<dyn PersistenceGateway>) -> Self {
        let (queue, mut pending) = mpsc::unbounded_channel::<(String, u64)>();
        let store = Arc::clone(&inner);

        tokio::spawn(async move {
            while let Some((username, score)) = pending.recv().await {
                let name = username.clone();
                match with_store(&store, move |store| store.insert_score(&name, score)).await {
                    Ok(()) => debug!("Stored score {} for {}", score, username),
                    Err(e) => error!("Lost score {} for {}: {}", score, username, e),
                }
            }
        });

        Self { inner, queue }
    }
}

impl PersistenceGateway for ScoreWriter {
    fn authenticate(&self, username: &str, password: &str) -> StoreResult<bool> {
        self.inner.authenticate(username, password)
    }

    fn create_account(&self, username: &str, password: &str) -> StoreResult<bool> {
        self.inner.create_account(username, password)
    }

    fn get_score(&self, username: &str) -> StoreResult<u64> {
        self.inner.get_score(username)
    }

    fn insert_score(&self, username: &str, score: u64) -> StoreResult<()> {
        self.queue
            .send((username.to_string(), score))
            .map_err(|_| {
                warn!("Score writer is gone");
                "score writer stopped".into()
            })
    }

    fn get_all_scores(&self) -> StoreResult<Vec<ScoreEntry>> {
        self.inner.get_all_scores()
    }
}
