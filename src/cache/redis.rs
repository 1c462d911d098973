//! # Redis 响应缓存
//!
//! 条目以 JSON 存储，过期交给 Redis `SETEX`

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::time::Duration;

use super::gateway::{CacheEntry, CacheGateway};
use crate::config::RedisConfig;
use crate::error::CacheError;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

/// Redis 缓存网关
pub struct RedisCacheGateway {
    connection_manager: ConnectionManager,
    key_prefix: String,
}

impl RedisCacheGateway {
    /// 建立连接
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Cache,
            "connect_to_redis",
            "Connecting to Redis response cache",
            key_prefix = config.key_prefix.as_str()
        );

        let client = Client::open(config.url.as_str())?;
        let connection_manager = ConnectionManager::new(client).await?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Cache,
            "redis_connected",
            "Redis connection established"
        );

        Ok(Self {
            connection_manager,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

#[async_trait]
impl CacheGateway for RedisCacheGateway {
    async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = conn.get(self.full_key(key)).await?;

        match raw {
            Some(raw) => {
                ldebug!("system", LogStage::Cache, LogComponent::Cache, "cache_hit", "Redis cache hit", key = key);
                Ok(Some(CacheEntry::from_json(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, key: &str, mut entry: CacheEntry, ttl: Duration) -> Result<(), CacheError> {
        let ttl_seconds = ttl.as_secs();
        if ttl_seconds == 0 {
            return Err(CacheError::operation("Redis SETEX requires a TTL of at least one second"));
        }
        entry.ttl_seconds = ttl_seconds;
        let payload = entry.to_json()?;

        let mut conn = self.connection_manager.clone();
        conn.set_ex::<_, _, ()>(self.full_key(key), payload, ttl_seconds)
            .await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
