use activity_core::{DetailIndex, OperationDetail};
use async_trait::async_trait;
use config_manager::{CacheConfig, RedisConfig};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Redis connection error: {0}")]
    Connection(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unsupported cache backend: {0}")]
    UnsupportedBackend(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Session-keyed storage for the detail index of a result set.
///
/// Storing a session again replaces its previous index entirely.
#[async_trait]
pub trait DetailCache: Send + Sync {
    async fn store(&self, session: &str, index: &DetailIndex) -> Result<()>;

    /// Detail at `position`, or `None` when the session expired, was evicted
    /// or has no entry for that position
    async fn lookup(&self, session: &str, position: usize) -> Result<Option<OperationDetail>>;

    /// Returns whether the session was present
    async fn evict(&self, session: &str) -> Result<bool>;
}

/// Build the cache backend selected in configuration
pub async fn detail_cache_from_config(
    cache: &CacheConfig,
    redis: &RedisConfig,
) -> Result<Box<dyn DetailCache>> {
    let ttl = Duration::from_secs(cache.ttl_seconds);
    match cache.backend.as_str() {
        "memory" => Ok(Box::new(MemoryDetailCache::new(ttl, cache.max_sessions))),
        "redis" => {
            let store = RedisDetailCache::new(&redis.url, &redis.key_prefix, ttl)?;
            let pong = store.ping().await?;
            info!("Connected to Redis detail cache ({})", pong);
            Ok(Box::new(store))
        }
        other => Err(PersistenceError::UnsupportedBackend(other.to_string())),
    }
}

struct CachedSession {
    index: DetailIndex,
    stored_at: Instant,
}

/// In-process cache bounded by age and by number of sessions
pub struct MemoryDetailCache {
    sessions: RwLock<HashMap<String, CachedSession>>,
    ttl: Duration,
    max_sessions: usize,
}

impl Default for MemoryDetailCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), 1000)
    }
}

impl MemoryDetailCache {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every expired session, returning how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let ttl = self.ttl;
        sessions.retain(|_, cached| cached.stored_at.elapsed() < ttl);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Removed {} expired detail sessions", removed);
        }
        removed
    }
}

#[async_trait]
impl DetailCache for MemoryDetailCache {
    async fn store(&self, session: &str, index: &DetailIndex) -> Result<()> {
        self.cleanup_expired().await;

        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session.to_string(),
            CachedSession {
                index: index.clone(),
                stored_at: Instant::now(),
            },
        );

        while sessions.len() > self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, cached)| cached.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    debug!("Detail cache full, evicting session {}", key);
                    sessions.remove(&key);
                }
                None => break,
            }
        }

        debug!("Stored {} detail entries for session {}", index.len(), session);
        Ok(())
    }

    async fn lookup(&self, session: &str, position: usize) -> Result<Option<OperationDetail>> {
        let sessions = self.sessions.read().await;
        let detail = sessions
            .get(session)
            .filter(|cached| cached.stored_at.elapsed() < self.ttl)
            .and_then(|cached| cached.index.get(&position).cloned());
        Ok(detail)
    }

    async fn evict(&self, session: &str) -> Result<bool> {
        Ok(self.sessions.write().await.remove(session).is_some())
    }
}

/// Detail index stored as one JSON value per session with a Redis expiry
#[derive(Debug, Clone)]
pub struct RedisDetailCache {
    client: Client,
    key_prefix: String,
    ttl: Duration,
}

impl RedisDetailCache {
    /// Connections are opened lazily; use `ping` to check the server is reachable
    pub fn new(redis_url: &str, key_prefix: &str, ttl: Duration) -> Result<Self> {
        let client = Client::open(redis_url)?;

        Ok(Self {
            client,
            key_prefix: key_prefix.to_string(),
            ttl,
        })
    }

    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(PersistenceError::from)
    }

    fn key(&self, session: &str) -> String {
        format!("{}:{}", self.key_prefix, session)
    }

    /// Test Redis connection
    pub async fn ping(&self) -> Result<String> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong)
    }
}

#[async_trait]
impl DetailCache for RedisDetailCache {
    async fn store(&self, session: &str, index: &DetailIndex) -> Result<()> {
        let json = serde_json::to_string(index)?;
        let mut conn = self.get_connection().await?;
        let _: () = conn.set_ex(self.key(session), json, self.ttl.as_secs().max(1)).await?;
        debug!("Stored {} detail entries for session {}", index.len(), session);
        Ok(())
    }

    async fn lookup(&self, session: &str, position: usize) -> Result<Option<OperationDetail>> {
        let mut conn = self.get_connection().await?;
        let cached: Option<String> = conn.get(self.key(session)).await?;

        match cached {
            Some(json) => match serde_json::from_str::<DetailIndex>(&json) {
                Ok(mut index) => Ok(index.remove(&position)),
                Err(e) => {
                    warn!("Discarding unreadable detail index for session {}: {}", session, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn evict(&self, session: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let removed: u64 = conn.del(self.key(session)).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use activity_core::{Direction, MemberReference, RawAmount, TokenTransferDetail};
    use rust_decimal::Decimal;

    fn detail(gas: i64) -> OperationDetail {
        OperationDetail {
            transfers: vec![TokenTransferDetail {
                token_symbol: "USDT".to_string(),
                contract_id: "usdt.tether-token.near".to_string(),
                raw_amount: RawAmount::parse("1000000"),
                direction: Direction::In,
            }],
            gas_fee: Decimal::new(gas, 4),
            references: vec![MemberReference {
                operation_id: "tx".to_string(),
                contract: "v2.ref-finance.near".to_string(),
                method: "swap".to_string(),
            }],
        }
    }

    fn index(entries: &[(usize, i64)]) -> DetailIndex {
        entries
            .iter()
            .map(|(position, gas)| (*position, detail(*gas)))
            .collect()
    }

    #[tokio::test]
    async fn test_store_and_lookup() {
        let cache = MemoryDetailCache::default();
        cache.store("chat-1", &index(&[(0, 5), (3, 7)])).await.unwrap();

        assert_eq!(cache.lookup("chat-1", 3).await.unwrap(), Some(detail(7)));
        assert_eq!(cache.lookup("chat-1", 1).await.unwrap(), None);
        assert_eq!(cache.lookup("chat-2", 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = MemoryDetailCache::default();
        cache.store("chat-1", &index(&[(0, 5), (3, 7)])).await.unwrap();
        cache.store("chat-1", &index(&[(1, 9)])).await.unwrap();

        assert_eq!(cache.lookup("chat-1", 3).await.unwrap(), None);
        assert_eq!(cache.lookup("chat-1", 1).await.unwrap(), Some(detail(9)));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_sessions_are_gone() {
        let cache = MemoryDetailCache::new(Duration::from_millis(20), 10);
        cache.store("chat-1", &index(&[(0, 1)])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.lookup("chat-1", 0).await.unwrap(), None);
        assert_eq!(cache.cleanup_expired().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_oldest_session_evicted_at_capacity() {
        let cache = MemoryDetailCache::new(Duration::from_secs(300), 2);
        cache.store("a", &index(&[(0, 1)])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.store("b", &index(&[(0, 2)])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.store("c", &index(&[(0, 3)])).await.unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.lookup("a", 0).await.unwrap(), None);
        assert_eq!(cache.lookup("c", 0).await.unwrap(), Some(detail(3)));
    }

    #[tokio::test]
    async fn test_evict() {
        let cache = MemoryDetailCache::default();
        cache.store("chat-1", &index(&[(0, 1)])).await.unwrap();
        assert!(cache.evict("chat-1").await.unwrap());
        assert!(!cache.evict("chat-1").await.unwrap());
        assert_eq!(cache.lookup("chat-1", 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_backend_from_config() {
        let cache_config = CacheConfig {
            backend: "memory".to_string(),
            ttl_seconds: 60,
            max_sessions: 5,
        };
        let redis_config = RedisConfig {
            url: String::new(),
            key_prefix: "details".to_string(),
        };
        let cache = detail_cache_from_config(&cache_config, &redis_config).await.unwrap();
        cache.store("s", &index(&[(2, 4)])).await.unwrap();
        assert_eq!(cache.lookup("s", 2).await.unwrap(), Some(detail(4)));

        let unknown = CacheConfig {
            backend: "memcached".to_string(),
            ..cache_config
        };
        assert!(matches!(
            detail_cache_from_config(&unknown, &redis_config).await,
            Err(PersistenceError::UnsupportedBackend(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_at_startup() {
        let cache_config = CacheConfig {
            backend: "redis".to_string(),
            ttl_seconds: 60,
            max_sessions: 5,
        };
        let redis_config = RedisConfig {
            url: "redis://127.0.0.1:1/".to_string(),
            key_prefix: "details".to_string(),
        };
        assert!(matches!(
            detail_cache_from_config(&cache_config, &redis_config).await,
            Err(PersistenceError::Connection(_))
        ));

        let malformed = RedisConfig {
            url: "not a redis url".to_string(),
            ..redis_config
        };
        assert!(matches!(
            detail_cache_from_config(&cache_config, &malformed).await,
            Err(PersistenceError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_redis_round_trip() {
        // This test requires a running Redis instance
        // Skip if REDIS_URL is not set
        let Ok(redis_url) = std::env::var("REDIS_URL") else {
            return;
        };

        let cache = RedisDetailCache::new(&redis_url, "details-test", Duration::from_secs(30)).unwrap();
        assert_eq!(cache.ping().await.unwrap(), "PONG");

        cache.store("session", &index(&[(1, 6)])).await.unwrap();
        assert_eq!(cache.lookup("session", 1).await.unwrap(), Some(detail(6)));
        assert!(cache.evict("session").await.unwrap());
        assert_eq!(cache.lookup("session", 1).await.unwrap(), None);
    }
}
