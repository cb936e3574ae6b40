//! Bounded check history persisted through the session store.
//!
//! Persistence is best effort by design: a session store that fails to
//! read or write is logged and treated as "nothing persisted", never as
//! an error the caller has to handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::check::CheckResult;

/// Maximum number of history entries retained; older ones are evicted.
pub const HISTORY_LIMIT: usize = 100;

const HISTORY_KEY: &str = "usernameChecks";

/// A session read or write failed.
#[derive(Debug)]
#[non_exhaustive]
pub enum StorageError {
    /// The entry could not be encoded or decoded as JSON.
    Serde(serde_json::Error),
    /// The backing store rejected the operation.
    Backend(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serde(e) => write!(f, "bad session blob: {e}"),
            Self::Backend(msg) => write!(f, "session store: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serde(e) => Some(e),
            Self::Backend(_) => None,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e)
    }
}

/// Key-to-JSON-blob storage scoped to the session lifetime.
///
/// The contract is deliberately small: `save` overwrites, `load` returns
/// the blob as last saved (or nothing), `clear` drops everything. An
/// implementation may layer encryption underneath as long as the
/// round-trip stays transparent.
pub trait SessionStore {
    /// Store `value` under `key`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend rejects the write.
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Fetch the blob stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend cannot be read.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Drop every stored blob.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend rejects the wipe.
    fn clear(&self) -> Result<(), StorageError>;
}

/// In-memory session store living for the process lifetime.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

/// Bounded log of check results, newest first.
///
/// Owns the records it holds; the current result set of an operation
/// lives with the caller and is replaced wholesale per run, not merged
/// in here.
#[derive(Debug)]
pub struct History<S> {
    store: S,
}

impl<S: SessionStore> History<S> {
    /// Wrap a session store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Prepend a result, evicting the oldest entry beyond
    /// [`HISTORY_LIMIT`]. Storage failures are logged and swallowed.
    pub fn record(&self, result: &CheckResult) {
        let mut entries = self.recent();
        entries.insert(0, result.clone());
        entries.truncate(HISTORY_LIMIT);
        match serde_json::to_string(&entries) {
            Ok(blob) => {
                if let Err(e) = self.store.save(HISTORY_KEY, &blob) {
                    warn!(error = %e, "history save failed");
                }
            }
            Err(e) => warn!(error = %e, "history encode failed"),
        }
    }

    /// Every recorded result, newest first. Reads as empty when nothing
    /// was persisted or the store is unreadable.
    #[must_use]
    pub fn recent(&self) -> Vec<CheckResult> {
        match self.store.load(HISTORY_KEY) {
            Ok(Some(blob)) => serde_json::from_str(&blob).unwrap_or_else(|e| {
                warn!(error = %e, "history decode failed");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "history load failed");
                Vec::new()
            }
        }
    }

    /// Wipe the history. Storage failures are logged and swallowed.
    pub fn clear(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "history clear failed");
        }
    }
}
