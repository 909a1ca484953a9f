//! Key-value store abstraction backing throttle markers, caches, counters,
//! and delivery bookkeeping.
//!
//! Three implementations mirror the deployment modes: Redis for production,
//! an in-memory TTL-aware store for tests and single-process experiments,
//! and a no-op null object used when no backing store is configured so call
//! sites never have to branch on store presence.

use crate::errors::StoreError;
use anyhow::Result;
use async_trait::async_trait;
use deadpool_redis::{Pool as RedisPool, redis, redis::AsyncCommands};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Persistent state operations used by the notification pipeline.
///
/// All methods return `Err` only for backing-store failures; "not found" is
/// always an `Ok` value. Callers decide whether a failure degrades (rate
/// limiter fails open, caches are best-effort) or surfaces.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value, with an optional TTL in seconds.
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()>;

    /// Atomically set a value only if the key does not exist, with a TTL.
    ///
    /// Returns `true` if the key was newly set. This is the primitive that
    /// closes the read-then-write race on throttle markers: whoever gets
    /// `true` owns the fire.
    async fn set_nx(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete a key, returning the number of keys removed.
    async fn delete(&self, key: &str) -> Result<u64>;

    /// Collect keys matching a glob pattern, up to `limit`.
    async fn scan_keys(&self, pattern: &str, limit: usize) -> Result<Vec<String>>;

    /// Remaining TTL in seconds, `None` when the key is missing or has no
    /// expiry.
    async fn ttl(&self, key: &str) -> Result<Option<i64>>;

    /// Increment a counter, returning the post-increment value.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Set a key's expiry in seconds.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()>;

    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Push onto the head of a list and trim it to `max_len` entries.
    async fn lpush_trim(&self, key: &str, value: &str, max_len: usize) -> Result<()>;

    /// Read up to `count` entries from the head of a list.
    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;
}

/// Redis-backed store using a deadpool connection pool.
#[derive(Clone)]
pub struct RedisNotificationStore {
    pool: RedisPool,
}

impl RedisNotificationStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        self.pool.get().await.map_err(|e| {
            StoreError::ConnectionFailed {
                details: e.to_string(),
            }
            .into()
        })
    }
}

fn op_err(operation: &str, err: impl std::fmt::Display) -> anyhow::Error {
    StoreError::OperationFailed {
        operation: operation.to_string(),
        details: err.to_string(),
    }
    .into()
}

#[async_trait]
impl NotificationStore for RedisNotificationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(|e| op_err("GET", e))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.conn().await?;
        match ttl_seconds {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl)
                .await
                .map_err(|e| op_err("SETEX", e)),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| op_err("SET", e)),
        }
    }

    async fn set_nx(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| op_err("SET NX EX", e))?;
        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        conn.exists(key).await.map_err(|e| op_err("EXISTS", e))
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.del(key).await.map_err(|e| op_err("DEL", e))
    }

    async fn scan_keys(&self, pattern: &str, limit: usize) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut out = Vec::new();
        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| op_err("SCAN", e))?;
            out.extend(page);
            if out.len() >= limit {
                out.truncate(limit);
                break;
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(out)
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>> {
        let mut conn = self.conn().await?;
        let ttl: i64 = conn.ttl(key).await.map_err(|e| op_err("TTL", e))?;
        Ok(if ttl >= 0 { Some(ttl) } else { None })
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        conn.incr(key, 1).await.map_err(|e| op_err("INCR", e))
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.expire::<_, ()>(key, ttl_seconds as i64)
            .await
            .map_err(|e| op_err("EXPIRE", e))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| op_err("SADD", e))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.smembers(key).await.map_err(|e| op_err("SMEMBERS", e))
    }

    async fn lpush_trim(&self, key: &str, value: &str, max_len: usize) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::pipe()
            .lpush(key, value)
            .ignore()
            .ltrim(key, 0, max_len.saturating_sub(1) as isize)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| op_err("LPUSH/LTRIM", e))
    }

    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.lrange(key, 0, count.saturating_sub(1) as isize)
            .await
            .map_err(|e| op_err("LRANGE", e))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(|e| op_err("HSET", e))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn().await?;
        conn.hgetall(key).await.map_err(|e| op_err("HGETALL", e))
    }
}

/// Null-object store used when no backing store is configured.
///
/// Reads see nothing, writes succeed and vanish. `set_nx` reports success so
/// marker claims always go through: without a store nothing throttles.
#[derive(Debug, Clone, Default)]
pub struct NoopNotificationStore;

impl NoopNotificationStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationStore for NoopNotificationStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_seconds: Option<u64>) -> Result<()> {
        Ok(())
    }

    async fn set_nx(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> Result<bool> {
        Ok(true)
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    async fn delete(&self, _key: &str) -> Result<u64> {
        Ok(0)
    }

    async fn scan_keys(&self, _pattern: &str, _limit: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn ttl(&self, _key: &str) -> Result<Option<i64>> {
        Ok(None)
    }

    async fn incr(&self, _key: &str) -> Result<i64> {
        Ok(1)
    }

    async fn expire(&self, _key: &str, _ttl_seconds: u64) -> Result<()> {
        Ok(())
    }

    async fn sadd(&self, _key: &str, _member: &str) -> Result<()> {
        Ok(())
    }

    async fn smembers(&self, _key: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn lpush_trim(&self, _key: &str, _value: &str, _max_len: usize) -> Result<()> {
        Ok(())
    }

    async fn lrange(&self, _key: &str, _count: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn hset(&self, _key: &str, _field: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn hgetall(&self, _key: &str) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }
}

#[derive(Default)]
struct MemoryInner {
    strings: HashMap<String, (String, Option<Instant>)>,
    sets: HashMap<String, HashSet<String>>,
    lists: HashMap<String, Vec<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl MemoryInner {
    fn purge_expired(&mut self, key: &str) {
        if let Some((_, Some(deadline))) = self.strings.get(key) {
            if Instant::now() >= *deadline {
                self.strings.remove(key);
            }
        }
    }
}

/// In-memory TTL-aware store for tests and store-less single-process runs.
#[derive(Default)]
pub struct MemoryNotificationStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Match a key against a glob pattern supporting `*` wildcards only.
fn glob_match(pattern: &str, key: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == key;
    }
    let mut remainder = key;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match remainder.strip_prefix(segment) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            return remainder.ends_with(segment);
        } else {
            match remainder.find(segment) {
                Some(pos) => remainder = &remainder[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock();
        inner.purge_expired(key);
        Ok(inner.strings.get(key).map(|(v, _)| v.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let deadline = ttl_seconds.map(|ttl| Instant::now() + Duration::from_secs(ttl));
        self.inner
            .lock()
            .strings
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool> {
        let mut inner = self.inner.lock();
        inner.purge_expired(key);
        if inner.strings.contains_key(key) {
            return Ok(false);
        }
        let deadline = Instant::now() + Duration::from_secs(ttl_seconds);
        inner
            .strings
            .insert(key.to_string(), (value.to_string(), Some(deadline)));
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        inner.purge_expired(key);
        Ok(inner.strings.contains_key(key)
            || inner.sets.contains_key(key)
            || inner.lists.contains_key(key)
            || inner.hashes.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let mut inner = self.inner.lock();
        let mut removed = 0u64;
        if inner.strings.remove(key).is_some() {
            removed += 1;
        }
        if inner.sets.remove(key).is_some() {
            removed += 1;
        }
        if inner.lists.remove(key).is_some() {
            removed += 1;
        }
        if inner.hashes.remove(key).is_some() {
            removed += 1;
        }
        Ok(removed.min(1))
    }

    async fn scan_keys(&self, pattern: &str, limit: usize) -> Result<Vec<String>> {
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .strings
            .iter()
            .filter(|(_, (_, deadline))| deadline.is_some_and(|d| Instant::now() >= d))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            inner.strings.remove(&key);
        }
        let mut matched: Vec<String> = inner
            .strings
            .keys()
            .chain(inner.sets.keys())
            .chain(inner.lists.keys())
            .chain(inner.hashes.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        matched.sort();
        matched.truncate(limit);
        Ok(matched)
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>> {
        let mut inner = self.inner.lock();
        inner.purge_expired(key);
        Ok(inner.strings.get(key).and_then(|(_, deadline)| {
            deadline.map(|d| d.saturating_duration_since(Instant::now()).as_secs() as i64)
        }))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut inner = self.inner.lock();
        inner.purge_expired(key);
        let entry = inner
            .strings
            .entry(key.to_string())
            .or_insert_with(|| ("0".to_string(), None));
        let next = entry.0.parse::<i64>().unwrap_or(0) + 1;
        entry.0 = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.strings.get_mut(key) {
            entry.1 = Some(Instant::now() + Duration::from_secs(ttl_seconds));
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.inner
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn lpush_trim(&self, key: &str, value: &str, max_len: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let list = inner.lists.entry(key.to_string()).or_default();
        list.insert(0, value.to_string());
        list.truncate(max_len);
        Ok(())
    }

    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .lists
            .get(key)
            .map(|l| l.iter().take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .inner
            .lock()
            .hashes
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("notif:*", "notif:fence:warned:fid:1:plant:2"));
        assert!(glob_match(
            "notif:fence:pending:fid:42:plant:*",
            "notif:fence:pending:fid:42:plant:7"
        ));
        assert!(!glob_match(
            "notif:fence:pending:fid:42:plant:*",
            "notif:fence:pending:fid:43:plant:7"
        ));
        assert!(glob_match("fidmap:42", "fidmap:42"));
        assert!(!glob_match("fidmap:42", "fidmap:421"));
        assert!(glob_match("*plant*", "notif:plant12h:fid:1"));
    }

    #[tokio::test]
    async fn test_memory_set_nx_claims_once() {
        let store = MemoryNotificationStore::new();
        assert!(store.set_nx("k", "1", 60).await.unwrap());
        assert!(!store.set_nx("k", "1", 60).await.unwrap());
        assert!(store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_ttl_expiry() {
        let store = MemoryNotificationStore::new();
        store.set("k", "v", Some(0)).await.unwrap();
        // Zero TTL means an already-expired deadline
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_nx("k", "1", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_incr_and_expire() {
        let store = MemoryNotificationStore::new();
        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert_eq!(store.incr("counter").await.unwrap(), 2);
        store.expire("counter", 60).await.unwrap();
        assert!(store.ttl("counter").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_lpush_trim_bounds_list() {
        let store = MemoryNotificationStore::new();
        for i in 0..10 {
            store
                .lpush_trim("log", &i.to_string(), 3)
                .await
                .unwrap();
        }
        let entries = store.lrange("log", 10).await.unwrap();
        assert_eq!(entries, vec!["9", "8", "7"]);
    }

    #[tokio::test]
    async fn test_noop_store_claims_and_forgets() {
        let store = NoopNotificationStore::new();
        assert!(store.set_nx("k", "1", 60).await.unwrap());
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.incr("counter").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_scan_keys_matches_pattern() {
        let store = MemoryNotificationStore::new();
        store.set("notif:fence:pending:fid:42:plant:7", "100", None).await.unwrap();
        store.set("notif:fence:pending:fid:42:plant:9", "200", None).await.unwrap();
        store.set("notif:fence:pending:fid:43:plant:7", "300", None).await.unwrap();
        let keys = store
            .scan_keys("notif:fence:pending:fid:42:plant:*", 100)
            .await
            .unwrap();
        assert_eq!(keys.len(), 2);
    }
}
