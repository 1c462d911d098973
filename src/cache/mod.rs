//! # 缓存模块
//!
//! 响应缓存的键生成、统一接口以及内存/Redis 实现

pub mod gateway;
pub mod keys;
pub mod memory;
pub mod redis;

use std::sync::Arc;

pub use gateway::{CACHE_STATUS_HEADER, CacheEntry, CacheGateway, CacheStatus};
pub use keys::{CacheKeyDeriver, derive_key};
pub use memory::{CacheStats, MemoryCacheGateway};
pub use self::redis::RedisCacheGateway;

use crate::config::{CacheConfig, CacheType};
use crate::error::{ProxyError, Result};

/// 按配置创建缓存网关，`Disabled` 时返回 `None`
pub async fn build_cache_gateway(config: &CacheConfig) -> Result<Option<Arc<dyn CacheGateway>>> {
    match config.cache_type {
        CacheType::Memory => Ok(Some(Arc::new(MemoryCacheGateway::new(
            config.memory_max_entries,
        )))),
        CacheType::Redis => {
            let redis = config
                .redis
                .as_ref()
                .ok_or_else(|| ProxyError::config("Redis cache configuration must be provided"))?;
            Ok(Some(Arc::new(RedisCacheGateway::connect(redis).await?)))
        }
        CacheType::Disabled => Ok(None),
    }
}
