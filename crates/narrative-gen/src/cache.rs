//! Narrative content cache
//!
//! Entries are keyed by the SHA-256 of the narrative key and the exact
//! prompt, so a changed prompt never returns stale text. The cache is
//! persisted as JSON and rewritten atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::NarrativeSource;
use tracing::{debug, info, warn};

use crate::errors::GenerationError;

/// Entries older than this are dropped on load
pub const MAX_AGE_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub narrative_key: String,
    pub content: String,
    pub source: NarrativeSource,
    pub created_at: DateTime<Utc>,
}

pub struct NarrativeCache {
    path: Option<PathBuf>,
    entries: DashMap<String, CacheEntry>,
    save_lock: Mutex<()>,
}

/// Cache key for a (narrative key, prompt) pair
pub fn cache_key(narrative_key: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(narrative_key.as_bytes());
    hasher.update(b"\n");
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

impl NarrativeCache {
    /// A cache that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: DashMap::new(),
            save_lock: Mutex::new(()),
        }
    }

    /// Load the cache file at `path`. A missing or unreadable file yields
    /// an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = Self {
            path: Some(path.clone()),
            entries: DashMap::new(),
            save_lock: Mutex::new(()),
        };

        if !path.exists() {
            debug!("No narrative cache at {}", path.display());
            return cache;
        }

        match read_entries(&path) {
            Ok(entries) => {
                let cutoff = Utc::now() - Duration::days(MAX_AGE_DAYS);
                let total = entries.len();
                for (key, entry) in entries {
                    if entry.created_at >= cutoff {
                        cache.entries.insert(key, entry);
                    }
                }
                info!(
                    "Loaded {} narrative cache entries ({} expired)",
                    cache.entries.len(),
                    total - cache.entries.len()
                );
            }
            Err(e) => warn!("Ignoring unreadable narrative cache {}: {}", path.display(), e),
        }
        cache
    }

    pub fn get(&self, narrative_key: &str, prompt: &str) -> Option<String> {
        self.entries
            .get(&cache_key(narrative_key, prompt))
            .map(|entry| entry.content.clone())
    }

    pub fn insert(&self, narrative_key: &str, prompt: &str, content: &str, source: NarrativeSource) {
        self.insert_entry(
            cache_key(narrative_key, prompt),
            CacheEntry {
                narrative_key: narrative_key.to_string(),
                content: content.to_string(),
                source,
                created_at: Utc::now(),
            },
        );
    }

    fn insert_entry(&self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the cache to disk (temp file, then rename). No-op for an
    /// in-memory cache.
    pub fn save(&self) -> Result<(), GenerationError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());

        let snapshot: HashMap<String, CacheEntry> = self
            .entries
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect();
        let json = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;

        debug!("Saved {} narrative cache entries", snapshot.len());
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<HashMap<String, CacheEntry>, GenerationError> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cache_key_depends_on_prompt() {
        assert_eq!(cache_key("conclusion", "a"), cache_key("conclusion", "a"));
        assert_ne!(cache_key("conclusion", "a"), cache_key("conclusion", "b"));
        assert_ne!(cache_key("introduction", "a"), cache_key("conclusion", "a"));
        assert_eq!(cache_key("k", "p").len(), 64);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cache_key_is_lowercase_hex(key in "[a-z_]{1,20}", prompt in ".{0,200}") {
                let digest = cache_key(&key, &prompt);
                prop_assert_eq!(digest.len(), 64);
                prop_assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
            }

            #[test]
            fn newline_separates_key_from_prompt(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
                let joined = format!("{}{}", a, b);
                prop_assert_ne!(cache_key(&joined, ""), cache_key(&a, &b));
            }
        }
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("narrative_cache.json");

        let cache = NarrativeCache::load(&path);
        assert!(cache.is_empty());
        cache.insert("conclusion", "prompt", "Cached conclusion text", NarrativeSource::Ai);
        cache.save().unwrap();

        let reloaded = NarrativeCache::load(&path);
        assert_eq!(
            reloaded.get("conclusion", "prompt").as_deref(),
            Some("Cached conclusion text")
        );
        assert_eq!(reloaded.get("conclusion", "other prompt"), None);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_expired_entries_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("narrative_cache.json");

        let cache = NarrativeCache::load(&path);
        cache.insert_entry(
            cache_key("introduction", "old"),
            CacheEntry {
                narrative_key: "introduction".to_string(),
                content: "stale".to_string(),
                source: NarrativeSource::Ai,
                created_at: Utc::now() - Duration::days(MAX_AGE_DAYS + 1),
            },
        );
        cache.insert("introduction", "new", "fresh", NarrativeSource::Ai);
        cache.save().unwrap();

        let reloaded = NarrativeCache::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("introduction", "old"), None);
        assert_eq!(reloaded.get("introduction", "new").as_deref(), Some("fresh"));
    }

    #[test]
    fn test_corrupt_file_yields_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("narrative_cache.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(NarrativeCache::load(&path).is_empty());
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let cache = NarrativeCache::in_memory();
        cache.insert("k", "p", "v", NarrativeSource::Ai);
        cache.save().unwrap();
        assert_eq!(cache.len(), 1);
    }
}
