use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CacheResult, VolatileStore};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// 进程内的 [`VolatileStore`]，过期在读取时惰性判断
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未过期的键数量
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }
}

#[async_trait]
impl VolatileStore for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let removed = keys
            .iter()
            .filter_map(|k| entries.remove(k))
            .filter(|e| e.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn take_if_equal(&self, key: &str, expected: &str) -> CacheResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) && entry.value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| e.is_live(now) && glob_match(pattern.as_bytes(), k.as_bytes()))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn increment(&self, key: &str, window: Duration) -> CacheResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if !e.is_live(now) {
                    e.value = "0".into();
                    e.expires_at = now + window;
                }
            })
            .or_insert_with(|| Entry {
                value: "0".into(),
                expires_at: now + window,
            });
        let count = entry.value.parse::<u64>().unwrap_or(0) + 1;
        entry.value = count.to_string();
        Ok(count)
    }
}

/// Redis `KEYS`/`SCAN` 使用的 glob 子集：`*` 与 `?`
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((bp, bt)) => {
                    p = bp + 1;
                    t = bt + 1;
                    backtrack = Some((bp, bt + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_redis_style_patterns() {
        assert!(glob_match(b"players:auction:a1*", b"players:auction:a1"));
        assert!(glob_match(b"players:auction:a1*", b"players:auction:a1:page:2"));
        assert!(!glob_match(b"players:auction:a1*", b"players:auction:b1"));
        assert!(glob_match(b"login_otp:?@x.com", b"login_otp:a@x.com"));
        assert!(glob_match(b"*:all:*", b"auctions:all:u@x.com"));
        assert!(!glob_match(b"", b"x"));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.keys_matching("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn take_if_equal_only_removes_matching_value() {
        let cache = MemoryCache::new();
        cache.set("otp", "old", Duration::from_secs(60)).await.unwrap();
        cache.set("otp", "new", Duration::from_secs(60)).await.unwrap();

        assert!(!cache.take_if_equal("otp", "old").await.unwrap());
        assert_eq!(cache.get("otp").await.unwrap().as_deref(), Some("new"));
        assert!(cache.take_if_equal("otp", "new").await.unwrap());
        assert!(!cache.take_if_equal("otp", "new").await.unwrap());
        assert_eq!(cache.get("otp").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_keeps_live_value() {
        let cache = MemoryCache::new();
        assert!(cache.set_if_absent("k", "first", Duration::from_millis(20)).await.unwrap());
        assert!(!cache.set_if_absent("k", "second", Duration::from_secs(60)).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("first"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.set_if_absent("k", "third", Duration::from_secs(60)).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn delete_counts_only_live_keys() {
        let cache = MemoryCache::new();
        cache.set("a", "1", Duration::from_secs(60)).await.unwrap();
        cache.set("b", "2", Duration::from_secs(60)).await.unwrap();

        let removed = cache
            .delete(&["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.delete(&["a".into()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn increment_resets_after_window() {
        let cache = MemoryCache::new();
        let window = Duration::from_millis(30);
        assert_eq!(cache.increment("rl", window).await.unwrap(), 1);
        assert_eq!(cache.increment("rl", window).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.increment("rl", window).await.unwrap(), 1);
    }
}
