//! # 内存响应缓存
//!
//! 基于 moka 的进程内缓存，每个条目按自身 TTL 过期

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::gateway::{CacheEntry, CacheGateway};
use crate::error::CacheError;

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_keys: u64,
    pub hit_count: u64,
    pub miss_count: u64,
}

impl CacheStats {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

struct EntryExpiry;

impl Expiry<String, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(Duration::from_secs(value.ttl_seconds))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(Duration::from_secs(value.ttl_seconds))
    }
}

/// 内存缓存网关
pub struct MemoryCacheGateway {
    cache: Cache<String, Arc<CacheEntry>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl MemoryCacheGateway {
    #[must_use]
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryExpiry)
            .build();
        Self {
            cache,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    /// 获取缓存统计信息
    pub async fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks().await;
        CacheStats {
            total_keys: self.cache.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl CacheGateway for MemoryCacheGateway {
    async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        match self.cache.get(key).await {
            Some(entry) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.as_ref().clone()))
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn store(&self, key: &str, mut entry: CacheEntry, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Ok(());
        }
        entry.ttl_seconds = ttl.as_secs();
        self.cache.insert(key.to_string(), Arc::new(entry)).await;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
