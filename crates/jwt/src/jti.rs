use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::error::{JwtError, Result};

/// Records consumed token ids.
pub trait JtiStore: Send + Sync {
    /// Inserts `jti`; returns `false` if it was already present.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::JtiStore` when the store is unusable.
    fn check_and_insert(&self, jti: &str, expires_at: Option<SystemTime>) -> Result<bool>;
    /// Drops expired entries and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::JtiStore` when the store is unusable.
    fn purge_expired(&self, now: SystemTime) -> Result<usize>;
}

/// In-memory JTI store.
#[derive(Debug, Default)]
pub struct InMemoryJtiStore {
    inner: Mutex<HashMap<String, Option<SystemTime>>>,
}

impl InMemoryJtiStore {
    fn cleanup_locked(map: &mut HashMap<String, Option<SystemTime>>, now: SystemTime) {
        map.retain(|_, expires| expires.map_or(true, |exp| exp > now));
    }
}

impl JtiStore for InMemoryJtiStore {
    fn check_and_insert(&self, jti: &str, expires_at: Option<SystemTime>) -> Result<bool> {
        let now = SystemTime::now();
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| JwtError::JtiStore("lock poisoned"))?;
        Self::cleanup_locked(&mut guard, now);
        if guard.contains_key(jti) {
            return Ok(false);
        }
        guard.insert(jti.to_owned(), expires_at);
        Ok(true)
    }

    fn purge_expired(&self, now: SystemTime) -> Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| JwtError::JtiStore("lock poisoned"))?;
        let before = guard.len();
        Self::cleanup_locked(&mut guard, now);
        Ok(before - guard.len())
    }
}
