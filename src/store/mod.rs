//! Key-value storage abstraction.
//!
//! All cross-request state lives behind the [`Kv`] trait: string keys with
//! JSON string values, optional TTLs, sets, and a per-key version counter
//! enabling compare-and-swap. Components receive an `Arc<dyn Kv>` at
//! construction and expose only domain operations above it.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{AppError, Result};

/// A value together with the store's version counter for its key.
#[derive(Debug, Clone)]
pub struct Versioned {
    pub value: String,
    pub version: i64,
}

pub trait Kv: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn get_versioned(&self, key: &str) -> Result<Option<Versioned>>;

    fn put(&self, key: &str, value: &str, ttl_secs: Option<i64>) -> Result<()>;

    /// Write only if the key's current version matches `expected`.
    /// `expected = None` means the key must not exist (insert-only).
    /// Returns false if the version check failed.
    fn put_if_version(
        &self,
        key: &str,
        value: &str,
        expected: Option<i64>,
        ttl_secs: Option<i64>,
    ) -> Result<bool>;

    fn delete(&self, key: &str) -> Result<bool>;

    fn set_add(&self, set: &str, member: &str) -> Result<()>;

    fn set_members(&self, set: &str) -> Result<Vec<String>>;

    /// All live keys beginning with `prefix`.
    fn scan(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Attempts before a compare-and-swap loop gives up.
const MAX_CAS_ATTEMPTS: u32 = 16;

pub fn get_json<T: DeserializeOwned>(kv: &dyn Kv, key: &str) -> Result<Option<T>> {
    match kv.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn put_json<T: Serialize>(kv: &dyn Kv, key: &str, value: &T, ttl_secs: Option<i64>) -> Result<()> {
    kv.put(key, &serde_json::to_string(value)?, ttl_secs)
}

/// Read-modify-write a JSON value under an optimistic CAS loop.
///
/// Loads the current value (or `default()` when absent), applies `mutate`,
/// and writes back conditioned on the version observed at read time. Retries
/// on conflict up to [`MAX_CAS_ATTEMPTS`].
pub fn update_json<T, D, F>(
    kv: &dyn Kv,
    key: &str,
    ttl_secs: Option<i64>,
    default: D,
    mut mutate: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    D: Fn() -> T,
    F: FnMut(&mut T),
{
    for _ in 0..MAX_CAS_ATTEMPTS {
        let current = kv.get_versioned(key)?;
        let (mut value, expected) = match &current {
            Some(v) => (serde_json::from_str::<T>(&v.value)?, Some(v.version)),
            None => (default(), None),
        };

        mutate(&mut value);

        let raw = serde_json::to_string(&value)?;
        if kv.put_if_version(key, &raw, expected, ttl_secs)? {
            return Ok(value);
        }
    }

    Err(AppError::Internal(format!(
        "compare-and-swap contention on key {key}"
    )))
}
