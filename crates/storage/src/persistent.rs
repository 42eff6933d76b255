//! Write-through adapter over a [`KeyValueRepository`].
//!
//! A [`PersistentStore`] owns one JSON root object under one key. Every clone
//! shares the same live object, so a mutation made through one handle is
//! visible to all readers without a re-read. Storage failures never reach the
//! caller: they are logged and the in-memory value stays authoritative.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::repository::{KeyValueRepository, StorageError};

pub struct PersistentStore<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    key: String,
    repo: Arc<dyn KeyValueRepository>,
    value: Mutex<T>,
    // Serializes write-through so storage sees mutations in call order.
    write_order: tokio::sync::Mutex<()>,
    revision: watch::Sender<u64>,
    durable: AtomicBool,
    failed_writes: AtomicU64,
}

impl<T> Clone for PersistentStore<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> PersistentStore<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Load the value stored under `key`, or `default` if it is absent,
    /// corrupt, or the backend cannot be read.
    pub async fn load(repo: Arc<dyn KeyValueRepository>, key: impl Into<String>, default: T) -> Self {
        let key = key.into();
        let (value, durable) = match repo.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => (value, true),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "discarding corrupt persisted value");
                    (default, true)
                }
            },
            Ok(None) => (default, true),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "storage unavailable, continuing in memory");
                (default, false)
            }
        };

        let (revision, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                key,
                repo,
                value: Mutex::new(value),
                write_order: tokio::sync::Mutex::new(()),
                revision,
                durable: AtomicBool::new(durable),
                failed_writes: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.shared.key
    }

    /// Run `f` against the live value.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self
            .shared
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Apply `f` to the live value, then persist the whole value before
    /// returning `f`'s result.
    pub async fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let _order = self.shared.write_order.lock().await;

        let (result, encoded) = {
            let mut guard = self
                .shared
                .value
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut guard);
            let encoded = serde_json::to_string(&*guard)
                .map_err(|err| StorageError::Serialization(err.to_string()));
            (result, encoded)
        };

        let outcome = match encoded {
            Ok(json) => self.shared.repo.put(&self.shared.key, &json).await,
            Err(err) => Err(err),
        };
        self.record_write(outcome);
        self.shared.revision.send_modify(|rev| *rev += 1);

        result
    }

    /// Receiver that observes a revision bump after every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// False while the latest write (or the initial read) failed.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.shared.durable.load(Ordering::Acquire)
    }

    /// Number of write-throughs that failed since load.
    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.shared.failed_writes.load(Ordering::Acquire)
    }

    fn record_write(&self, outcome: Result<(), StorageError>) {
        match outcome {
            Ok(()) => {
                if !self.shared.durable.swap(true, Ordering::AcqRel) {
                    tracing::info!(key = %self.shared.key, "storage writes succeeding again");
                }
            }
            Err(err) => {
                self.shared.failed_writes.fetch_add(1, Ordering::AcqRel);
                self.shared.durable.store(false, Ordering::Release);
                tracing::warn!(
                    key = %self.shared.key,
                    error = %err,
                    "failed to persist value, keeping in-memory state"
                );
            }
        }
    }
}

impl<T> PersistentStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.read(T::clone)
    }
}

/// Read a one-shot JSON value. Absent, corrupt, or unreadable values are `None`.
pub async fn load_json<T: DeserializeOwned>(repo: &dyn KeyValueRepository, key: &str) -> Option<T> {
    match repo.get(key).await {
        Ok(Some(raw)) => serde_json::from_str(&raw)
            .map_err(|err| {
                tracing::warn!(key, error = %err, "ignoring corrupt persisted value");
            })
            .ok(),
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to read persisted value");
            None
        }
    }
}

/// Write a one-shot JSON value. Returns whether it reached storage.
pub async fn save_json<T: Serialize + ?Sized>(repo: &dyn KeyValueRepository, key: &str, value: &T) -> bool {
    let outcome = match serde_json::to_string(value) {
        Ok(json) => repo.put(key, &json).await,
        Err(err) => Err(StorageError::Serialization(err.to_string())),
    };
    match outcome {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to persist value");
            false
        }
    }
}
