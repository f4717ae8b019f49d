/*
 * SejmBot - Rust Edition
 * Copyright (c) 2024 SejmBot Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 *
 * For commercial licensing inquiries, please contact the project maintainers.
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::types::FetchResult;

/// SHA-256 of normalized bytes, hex-encoded. Shared by the in-memory cache key
/// scheme and the evaluation cache in the AI orchestrator.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

struct Entry {
    value: FetchResult,
    expires_at: Instant,
    last_accessed: Instant,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub cleanups: u64,
}

/// Two-tier response cache: a bounded in-memory LRU-like tier backed by an
/// on-disk content-hash tier for checking whether a previously downloaded
/// artifact is still current.
pub struct ResponseCache {
    memory: Mutex<HashMap<String, Entry>>,
    max_entries: usize,
    stats: Mutex<CacheStats>,
    file_tier_dir: PathBuf,
}

impl ResponseCache {
    pub fn new(max_entries: usize, file_tier_dir: PathBuf) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            max_entries,
            stats: Mutex::new(CacheStats::default()),
            file_tier_dir,
        }
    }

    /// `api_<endpoint-path-with-underscores>#sorted(k=v&...)`.
    pub fn key(endpoint: &str, params: &HashMap<String, String>) -> String {
        let path_part = endpoint.trim_start_matches("http://").trim_start_matches("https://");
        let path_part = path_part.replace(['/', '.', ':'], "_");
        let mut pairs: Vec<(&String, &String)> = params.iter().collect();
        pairs.sort_by_key(|(k, _)| k.as_str());
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("api_{}#{}", path_part, query)
    }

    pub async fn get(&self, key: &str) -> Option<FetchResult> {
        let mut memory = self.memory.lock().await;
        let mut stats = self.stats.lock().await;

        let expired = match memory.get(key) {
            Some(entry) => Instant::now() >= entry.expires_at,
            None => {
                stats.misses += 1;
                return None;
            }
        };

        if expired {
            memory.remove(key);
            stats.misses += 1;
            return None;
        }

        stats.hits += 1;
        let entry = memory.get_mut(key).unwrap();
        entry.last_accessed = Instant::now();
        Some(entry.value.clone())
    }

    pub async fn set(&self, key: &str, value: FetchResult, ttl: Duration) {
        let mut memory = self.memory.lock().await;
        let mut stats = self.stats.lock().await;

        if memory.len() >= self.max_entries && !memory.contains_key(key) {
            Self::evict_lru(&mut memory, self.max_entries / 10);
            stats.cleanups += 1;
        }

        let now = Instant::now();
        memory.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
                last_accessed: now,
            },
        );
        stats.sets += 1;
    }

    fn evict_lru(memory: &mut HashMap<String, Entry>, count: usize) {
        let mut entries: Vec<(String, Instant)> =
            memory.iter().map(|(k, v)| (k.clone(), v.last_accessed)).collect();
        entries.sort_by_key(|(_, accessed)| *accessed);
        for (key, _) in entries.into_iter().take(count.max(1)) {
            memory.remove(&key);
        }
    }

    pub async fn stats(&self) -> CacheStats {
        *self.stats.lock().await
    }

    pub async fn clear(&self) {
        let mut memory = self.memory.lock().await;
        let mut stats = self.stats.lock().await;
        stats.deletes += memory.len() as u64;
        memory.clear();
    }

    /// Drops every entry past its TTL and returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut memory = self.memory.lock().await;
        let mut stats = self.stats.lock().await;
        let now = Instant::now();
        let expired: Vec<String> = memory
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            memory.remove(key);
        }
        stats.cleanups += 1;
        stats.deletes += expired.len() as u64;
        expired.len()
    }

    /// True if `path` exists and (when `check_content` is set) its SHA-256
    /// matches the hash recorded at cache time.
    pub fn has_file_cache(&self, path: &Path, expected_hash: Option<&str>) -> bool {
        if !path.exists() {
            return false;
        }
        match expected_hash {
            None => true,
            Some(expected) => match std::fs::read(path) {
                Ok(bytes) => sha256_hex(&bytes) == expected,
                Err(_) => false,
            },
        }
    }

    pub fn file_tier_dir(&self) -> &Path {
        &self.file_tier_dir
    }
}

/// Decides whether a sitting's transcripts should be re-fetched, per the
/// freshness policy: future sittings refresh daily, fully-covered past
/// sittings refresh weekly, partial/mixed sittings refresh every two hours.
pub fn should_refresh_sitting(
    all_dates_future: bool,
    all_dates_covered_on_disk: bool,
    last_checked: Option<Instant>,
    force: bool,
) -> bool {
    if force {
        return true;
    }
    let age = last_checked.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
    if all_dates_future {
        age >= Duration::from_secs(24 * 3600)
    } else if all_dates_covered_on_disk {
        age >= Duration::from_secs(168 * 3600)
    } else {
        age >= Duration::from_secs(2 * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_tier_round_trips_and_expires() {
        let cache = ResponseCache::new(10, std::env::temp_dir());
        let mut params = HashMap::new();
        params.insert("term".to_string(), "10".to_string());
        let key = ResponseCache::key("https://api.sejm.gov.pl/sejm/term10", &params);

        assert!(cache.get(&key).await.is_none());
        cache
            .set(&key, FetchResult::Json(serde_json::json!({"num": 10})), Duration::from_secs(60))
            .await;
        assert!(cache.get(&key).await.is_some());

        cache
            .set(&key, FetchResult::Json(serde_json::json!({"num": 10})), Duration::from_millis(0))
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn eviction_drops_least_recently_used() {
        let cache = ResponseCache::new(10, std::env::temp_dir());
        for i in 0..10 {
            cache
                .set(
                    &format!("k{i}"),
                    FetchResult::Json(serde_json::json!(i)),
                    Duration::from_secs(60),
                )
                .await;
        }
        // touch k9 so it is most-recently-used and survives eviction
        cache.get("k9").await;
        cache
            .set("k10", FetchResult::Json(serde_json::json!(10)), Duration::from_secs(60))
            .await;
        assert!(cache.get("k9").await.is_some());
    }

    #[test]
    fn cache_key_sorts_params() {
        let mut params = HashMap::new();
        params.insert("b".to_string(), "2".to_string());
        params.insert("a".to_string(), "1".to_string());
        let key = ResponseCache::key("https://x/y/z", &params);
        assert_eq!(key, "api_x_y_z#a=1&b=2");
    }

    #[test]
    fn refresh_policy_matches_design() {
        assert!(should_refresh_sitting(true, false, None, false));
        assert!(!should_refresh_sitting(
            true,
            false,
            Some(Instant::now()),
            false
        ));
        assert!(should_refresh_sitting(false, false, None, false));
    }
}
