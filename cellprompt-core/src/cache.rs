//! Response cache
//!
//! Completed prompts are memoized under a SHA-256 of the serialized
//! `(provider, prompt)` pair. A prompt carrying tool results is never stored:
//! tool output depends on state outside the request. Concurrent misses for the
//! same key may both compute and both insert; the later write wins.

use crate::config::CacheConfig;
use crate::protocol::Prompt;
use crate::providers::ProviderId;
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
struct Entry {
    prompt: Prompt,
    inserted: Instant,
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    provider: ProviderId,
    prompt: &'a Prompt,
}

/// TTL-bounded store of completed prompts
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<String, Entry>,
    enabled: bool,
    ttl: Duration,
    max_entries: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: config.enabled,
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries,
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(&CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Hex SHA-256 of the canonical serialization of `(provider, prompt)`
    pub fn key(provider: ProviderId, prompt: &Prompt) -> String {
        let material = KeyMaterial { provider, prompt };
        match serde_json::to_vec(&material) {
            Ok(bytes) => format!("{:x}", Sha256::digest(&bytes)),
            // Prompt serialization only fails on non-string map keys, which it has none of
            Err(err) => {
                warn!("Failed to serialize cache key material: {}", err);
                String::new()
            }
        }
    }

    /// Cached prompt for `key`, dropping it if expired
    pub fn get(&self, key: &str) -> Option<Prompt> {
        if !self.enabled || key.is_empty() {
            return None;
        }

        let expired = match self.entries.get(key) {
            Some(entry) if !self.is_expired(&entry) => {
                trace!("Cache hit for {}", key);
                return Some(entry.prompt.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            debug!("Cache entry {} expired", key);
            self.entries.remove(key);
        }
        None
    }

    /// Store `prompt` under `key` unless it carries tool messages
    ///
    /// Returns whether the prompt was stored. A prompt with tool messages also
    /// evicts any existing entry for the key.
    pub fn insert(&self, key: String, prompt: &Prompt) -> bool {
        if !self.enabled || key.is_empty() {
            return false;
        }
        if prompt.has_tool_messages() {
            debug!("Not caching {}: prompt contains tool results", key);
            self.entries.remove(&key);
            return false;
        }

        if self.max_entries > 0 && self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict();
        }

        self.entries.insert(
            key,
            Entry {
                prompt: prompt.clone(),
                inserted: Instant::now(),
            },
        );
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lifetime of a stored entry
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        entry.inserted.elapsed() >= self.ttl
    }

    /// Drop expired entries, then the oldest one if still full
    fn evict(&self) {
        self.entries.retain(|_, entry| !self.is_expired(entry));
        if self.entries.len() < self.max_entries {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            trace!("Evicting oldest cache entry {}", key);
            self.entries.remove(&key);
        }
    }
}
