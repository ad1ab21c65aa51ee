//! In-memory [`Kv`] implementation for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use chrono::Utc;

use crate::error::Result;

use super::{Kv, Versioned};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    version: i64,
    expires_at: Option<i64>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|exp| exp > Utc::now().timestamp())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Entry>>,
    sets: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Kv for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key).filter(|e| e.live()).map(|e| e.value.clone()))
    }

    fn get_versioned(&self, key: &str) -> Result<Option<Versioned>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key).filter(|e| e.live()).map(|e| Versioned {
            value: e.value.clone(),
            version: e.version,
        }))
    }

    fn put(&self, key: &str, value: &str, ttl_secs: Option<i64>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let version = entries.get(key).map(|e| e.version + 1).unwrap_or(1);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                version,
                expires_at: ttl_secs.map(|ttl| Utc::now().timestamp() + ttl),
            },
        );
        Ok(())
    }

    fn put_if_version(
        &self,
        key: &str,
        value: &str,
        expected: Option<i64>,
        ttl_secs: Option<i64>,
    ) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        let current = entries.get(key).filter(|e| e.live());

        let matches = match (expected, current) {
            (None, None) => true,
            (Some(v), Some(e)) => e.version == v,
            _ => false,
        };
        if !matches {
            return Ok(false);
        }

        let version = entries.get(key).map(|e| e.version + 1).unwrap_or(1);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                version,
                expires_at: ttl_secs.map(|ttl| Utc::now().timestamp() + ttl),
            },
        );
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        Ok(entries.remove(key).is_some())
    }

    fn set_add(&self, set: &str, member: &str) -> Result<()> {
        let mut sets = self.sets.lock().unwrap();
        sets.entry(set.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    fn set_members(&self, set: &str) -> Result<Vec<String>> {
        let sets = self.sets.lock().unwrap();
        Ok(sets.get(set).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, e)| e.live())
            .map(|(k, _)| k.clone())
            .collect())
    }
}
