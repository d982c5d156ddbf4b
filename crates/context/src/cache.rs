//! Snapshot cache with TTL freshness, per-thread versions and locks.
//!
//! Snapshots live in a `moka` cache that expires them after the TTL and, when
//! capped, evicts the least recently used one. Version counters and thread
//! locks sit beside it behind short-held `std::sync::Mutex`es that are never
//! held across an await point.

use crate::snapshot::ContextSnapshot;
use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use weft_config::EngineConfig;
use weft_core::error::{Error, Result};

/// Default time a snapshot stays fresh.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Idle per-thread locks are pruned once the lock table grows past this.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Identifies one cached snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub thread_id: String,
    pub user_id: String,
    pub agent_id: String,
}

impl CacheKey {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            agent_id: agent_id.into(),
        }
    }
}

fn snapshot_store(ttl: Duration, max_entries: Option<u64>) -> Cache<CacheKey, ContextSnapshot> {
    let builder = Cache::builder()
        .time_to_live(ttl)
        .eviction_policy(EvictionPolicy::lru())
        .eviction_listener(
            |key: Arc<CacheKey>, _snapshot: ContextSnapshot, cause: RemovalCause| {
                if cause.was_evicted() {
                    debug!(thread_id = %key.thread_id, ?cause, "Evicted snapshot");
                }
            },
        );
    match max_entries {
        Some(max) => builder.max_capacity(max).build(),
        None => builder.build(),
    }
}

/// The only mutable shared structure of the engine.
pub struct ContextCache {
    ttl: Duration,
    snapshots: Cache<CacheKey, ContextSnapshot>,
    /// Highest version handed out per thread. Survives eviction and
    /// invalidation so versions never repeat; one counter per thread ever
    /// built, which bounds it by the number of distinct threads.
    versions: Mutex<HashMap<String, u64>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ContextCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshots: snapshot_store(ttl, None),
            versions: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Cap the number of cached snapshots; the least recently used entry is
    /// evicted once the cap is exceeded.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.snapshots = snapshot_store(self.ttl, Some(max_entries.max(1) as u64));
        self
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let cache = Self::new(config.cache.ttl());
        match config.cache.max_entries {
            Some(max) => cache.with_max_entries(max),
            None => cache,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A fresh snapshot for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<ContextSnapshot> {
        self.snapshots.get(key)
    }

    /// Store a snapshot.
    ///
    /// Refuses to replace an entry holding a newer version; that can only
    /// happen when a write bypassed the thread lock.
    pub fn put(&self, key: CacheKey, snapshot: ContextSnapshot) -> Result<()> {
        let thread_id = key.thread_id.clone();
        let attempted_version = snapshot.version;
        let outcome = self
            .snapshots
            .entry(key)
            .and_compute_with(|existing| match existing {
                Some(entry) if entry.value().version > attempted_version => Op::Nop,
                _ => Op::Put(snapshot),
            });
        match outcome {
            CompResult::Unchanged(entry) => Err(Error::CacheRaceDetected {
                thread_id,
                cached_version: entry.into_value().version,
                attempted_version,
            }),
            _ => Ok(()),
        }
    }

    /// Remove every snapshot of a thread. Returns how many were removed.
    pub fn invalidate(&self, thread_id: &str) -> usize {
        let keys: Vec<Arc<CacheKey>> = self
            .snapshots
            .iter()
            .filter(|(key, _)| key.thread_id == thread_id)
            .map(|(key, _)| key)
            .collect();
        for key in &keys {
            self.snapshots.invalidate(key.as_ref());
        }
        keys.len()
    }

    fn versions(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.versions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve the next version for a thread: 1 for the first build, then
    /// strictly increasing.
    pub fn next_version(&self, thread_id: &str) -> u64 {
        let mut versions = self.versions();
        let version = versions.entry(thread_id.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    /// The last version handed out for a thread, 0 if none.
    pub fn current_version(&self, thread_id: &str) -> u64 {
        self.versions().get(thread_id).copied().unwrap_or(0)
    }

    /// The newest fresh snapshot an agent built in a thread, for any user.
    pub fn latest_for_agent(&self, thread_id: &str, agent_id: &str) -> Option<ContextSnapshot> {
        self.snapshots
            .iter()
            .filter(|(key, _)| key.thread_id == thread_id && key.agent_id == agent_id)
            .map(|(_, snapshot)| snapshot)
            .max_by_key(|snapshot| snapshot.version)
    }

    /// The async mutex serializing rebuilds of one thread.
    pub fn thread_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.len() > LOCK_PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Number of live snapshots, after pending evictions are applied.
    pub fn len(&self) -> usize {
        self.snapshots.run_pending_tasks();
        self.snapshots.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenStats;
    use chrono::Utc;

    fn snapshot(thread: &str, agent: &str, version: u64) -> ContextSnapshot {
        ContextSnapshot {
            thread_id: thread.into(),
            user_id: "u1".into(),
            agent_id: agent.into(),
            history: Vec::new(),
            token_stats: TokenStats {
                current_tokens: 0,
                max_tokens: 8192,
                usage_percentage: 0.0,
            },
            memories: Vec::new(),
            shared_data: serde_json::Map::new(),
            document_context: None,
            version,
            content_hash: String::new(),
            created_at: Utc::now(),
            compressed: false,
            memory_injected: false,
        }
    }

    fn key(thread: &str, agent: &str) -> CacheKey {
        CacheKey::new(thread, "u1", agent)
    }

    #[test]
    fn fresh_within_ttl_stale_after() {
        let cache = ContextCache::new(Duration::from_millis(200));
        cache.put(key("t1", "a1"), snapshot("t1", "a1", 1)).unwrap();
        assert_eq!(cache.get(&key("t1", "a1")).unwrap().version, 1);

        std::thread::sleep(Duration::from_millis(300));
        assert!(cache.get(&key("t1", "a1")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn versions_start_at_one_and_survive_invalidation() {
        let cache = ContextCache::default();
        assert_eq!(cache.current_version("t1"), 0);
        assert_eq!(cache.next_version("t1"), 1);
        assert_eq!(cache.next_version("t1"), 2);
        assert_eq!(cache.next_version("t2"), 1);
        cache.invalidate("t1");
        assert_eq!(cache.next_version("t1"), 3);
    }

    #[test]
    fn invalidate_removes_every_entry_of_thread() {
        let cache = ContextCache::default();
        cache.put(key("t1", "a1"), snapshot("t1", "a1", 1)).unwrap();
        cache.put(key("t1", "a2"), snapshot("t1", "a2", 2)).unwrap();
        cache.put(key("t2", "a1"), snapshot("t2", "a1", 1)).unwrap();

        assert_eq!(cache.invalidate("t1"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("t2", "a1")).is_some());
        assert_eq!(cache.invalidate("t1"), 0);
    }

    #[test]
    fn older_version_is_rejected() {
        let cache = ContextCache::default();
        cache.put(key("t1", "a1"), snapshot("t1", "a1", 5)).unwrap();
        let err = cache
            .put(key("t1", "a1"), snapshot("t1", "a1", 4))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CacheRaceDetected {
                cached_version: 5,
                attempted_version: 4,
                ..
            }
        ));
        // same version may be rewritten
        cache.put(key("t1", "a1"), snapshot("t1", "a1", 5)).unwrap();
    }

    #[test]
    fn lru_cap_evicts_least_recently_used() {
        let cache = ContextCache::default().with_max_entries(2);
        cache.put(key("t1", "a"), snapshot("t1", "a", 1)).unwrap();
        cache.put(key("t2", "a"), snapshot("t2", "a", 1)).unwrap();
        assert_eq!(cache.len(), 2);

        cache.get(&key("t1", "a"));
        cache.put(key("t3", "a"), snapshot("t3", "a", 1)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("t1", "a")).is_some());
        assert!(cache.get(&key("t2", "a")).is_none());
        assert!(cache.get(&key("t3", "a")).is_some());
    }

    #[test]
    fn version_counters_outlive_evicted_snapshots() {
        let cache = ContextCache::default().with_max_entries(1);
        let v = cache.next_version("t1");
        cache.put(key("t1", "a"), snapshot("t1", "a", v)).unwrap();
        let v = cache.next_version("t2");
        cache.put(key("t2", "a"), snapshot("t2", "a", v)).unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("t1", "a")).is_none());
        assert_eq!(cache.next_version("t1"), 2);
    }

    #[test]
    fn latest_for_agent_picks_newest_version_across_users() {
        let cache = ContextCache::default();
        cache.put(CacheKey::new("t1", "u1", "a1"), snapshot("t1", "a1", 1)).unwrap();
        cache.put(CacheKey::new("t1", "u2", "a1"), snapshot("t1", "a1", 3)).unwrap();
        cache.put(key("t1", "a2"), snapshot("t1", "a2", 4)).unwrap();

        assert_eq!(cache.latest_for_agent("t1", "a1").unwrap().version, 3);
        assert!(cache.latest_for_agent("t1", "a9").is_none());
        assert!(cache.latest_for_agent("t2", "a1").is_none());
    }

    #[test]
    fn latest_for_agent_skips_expired_snapshots() {
        let cache = ContextCache::new(Duration::from_millis(200));
        cache.put(key("t1", "a1"), snapshot("t1", "a1", 1)).unwrap();
        assert!(cache.latest_for_agent("t1", "a1").is_some());

        std::thread::sleep(Duration::from_millis(300));
        assert!(cache.latest_for_agent("t1", "a1").is_none());
    }

    #[tokio::test]
    async fn thread_lock_is_shared_per_thread() {
        let cache = ContextCache::default();
        let a = cache.thread_lock("t1");
        let b = cache.thread_lock("t1");
        let c = cache.thread_lock("t2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let _guard = a.lock().await;
        assert!(b.try_lock().is_err());
        assert!(c.try_lock().is_ok());
    }
}
