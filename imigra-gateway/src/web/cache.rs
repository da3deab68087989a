use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock advanced by hand, for tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted: Instant,
}

/// Bounded map whose entries expire `ttl` after insertion.
///
/// Expired entries are invisible to `get` and are purged when the map is
/// full; after that the oldest insertion is evicted.
pub struct TimedCache<K, V> {
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    map: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TimedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self::with_clock(ttl, capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            clock,
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let map = self.map.read().await;
        map.get(key).and_then(|entry| {
            if now.saturating_duration_since(entry.inserted) <= self.ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    pub async fn set(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut map = self.map.write().await;

        if !map.contains_key(&key) && map.len() >= self.capacity {
            let ttl = self.ttl;
            map.retain(|_, entry| now.saturating_duration_since(entry.inserted) <= ttl);

            if map.len() >= self.capacity
                && let Some(oldest) = map
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted)
                    .map(|(key, _)| key.clone())
            {
                map.remove(&oldest);
            }
        }

        map.insert(
            key,
            CacheEntry {
                value,
                inserted: now,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.map.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl: Duration, capacity: usize) -> (TimedCache<&'static str, &'static str>, ManualClock) {
        let clock = ManualClock::new();
        let cache = TimedCache::with_clock(ttl, capacity, Arc::new(clock.clone()));
        (cache, clock)
    }

    #[tokio::test]
    async fn test_cache_get_set() {
        let (cache, _) = cache(Duration::from_secs(60), 4);
        cache.set("key", "value").await;
        assert_eq!(cache.get(&"key").await, Some("value"));
        assert_eq!(cache.get(&"other").await, None);
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let (cache, clock) = cache(Duration::from_secs(3600), 4);
        cache.set("key", "value").await;

        clock.advance(Duration::from_secs(3599));
        assert_eq!(cache.get(&"key").await, Some("value"));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get(&"key").await, None);
    }

    #[tokio::test]
    async fn test_capacity_prefers_expired_then_oldest() {
        let (cache, clock) = cache(Duration::from_secs(10), 2);
        cache.set("a", "1").await;
        clock.advance(Duration::from_secs(11));
        cache.set("b", "2").await;
        clock.advance(Duration::from_secs(1));
        cache.set("c", "3").await;
        // "a" was expired and purged first.
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&"b").await, Some("2"));

        clock.advance(Duration::from_secs(1));
        cache.set("d", "4").await;
        assert_eq!(cache.get(&"b").await, None);
        assert_eq!(cache.get(&"c").await, Some("3"));
        assert_eq!(cache.get(&"d").await, Some("4"));
    }
}
