//! # 轮换计数器存储
//!
//! 每个服务一个 1 基计数器，`next_index` 原子地插入 1 或推进为 `(current % N) + 1`

use async_trait::async_trait;
use dashmap::DashMap;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement, Value};
use std::sync::Arc;

use crate::error::CounterStoreError;

const SQLITE_NEXT_INDEX: &str = "INSERT INTO key_rotation_state (service, next_index, updated_at) \
     VALUES (?, 1, ?) \
     ON CONFLICT(service) DO UPDATE SET \
     next_index = (key_rotation_state.next_index % ?) + 1, \
     updated_at = excluded.updated_at \
     RETURNING next_index";

const POSTGRES_NEXT_INDEX: &str = "INSERT INTO key_rotation_state (service, next_index, updated_at) \
     VALUES ($1, 1, $2) \
     ON CONFLICT(service) DO UPDATE SET \
     next_index = (key_rotation_state.next_index % $3) + 1, \
     updated_at = excluded.updated_at \
     RETURNING next_index";

/// 轮换计数器存储
///
/// 实现必须保证同一服务的并发调用得到互不相同的连续值。
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// 推进并返回服务的计数器，取值范围 `[1, modulus]`
    async fn next_index(&self, service: &str, modulus: usize) -> Result<i64, CounterStoreError>;
}

fn modulus_as_i64(modulus: usize) -> Result<i64, CounterStoreError> {
    if modulus == 0 {
        return Err(CounterStoreError::InvalidModulus(modulus));
    }
    i64::try_from(modulus).map_err(|_| CounterStoreError::InvalidModulus(modulus))
}

/// 进程内计数器，依赖 dashmap 的分片写锁保证原子性
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, i64>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前计数器值（未使用过的服务返回 `None`）
    #[must_use]
    pub fn current(&self, service: &str) -> Option<i64> {
        self.counters.get(service).map(|value| *value)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn next_index(&self, service: &str, modulus: usize) -> Result<i64, CounterStoreError> {
        let n = modulus_as_i64(modulus)?;
        let entry = self
            .counters
            .entry(service.to_string())
            .and_modify(|value| *value = (*value % n) + 1)
            .or_insert(1);
        Ok(*entry)
    }
}

/// 基于数据库 `key_rotation_state` 表的计数器
///
/// 单条 `INSERT ... ON CONFLICT DO UPDATE ... RETURNING` 完成读改写，多实例部署共享同一序列。
#[derive(Clone)]
pub struct DatabaseCounterStore {
    db: Arc<DatabaseConnection>,
}

impl DatabaseCounterStore {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn statement(
        backend: DbBackend,
        service: &str,
        modulus: i64,
    ) -> Result<Statement, CounterStoreError> {
        let now = chrono::Utc::now().naive_utc();
        let values: [Value; 3] = [service.into(), now.into(), modulus.into()];
        let sql = match backend {
            DbBackend::Sqlite => SQLITE_NEXT_INDEX,
            DbBackend::Postgres => POSTGRES_NEXT_INDEX,
            other => return Err(CounterStoreError::UnsupportedBackend(format!("{other:?}"))),
        };
        Ok(Statement::from_sql_and_values(backend, sql, values))
    }
}

#[async_trait]
impl CounterStore for DatabaseCounterStore {
    async fn next_index(&self, service: &str, modulus: usize) -> Result<i64, CounterStoreError> {
        let n = modulus_as_i64(modulus)?;
        let statement = Self::statement(self.db.get_database_backend(), service, n)?;

        let row = self
            .db
            .query_one(statement)
            .await?
            .ok_or_else(|| CounterStoreError::MissingRow {
                service: service.to_string(),
            })?;

        Ok(row.try_get::<i64>("", "next_index")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{file_database, memory_database};

    #[tokio::test]
    async fn test_memory_store_cycles() {
        let store = MemoryCounterStore::new();
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(store.next_index("openai", 3).await.unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3, 1, 2, 3, 1]);
        assert_eq!(store.current("openai"), Some(1));
        assert_eq!(store.current("claude"), None);
    }

    #[tokio::test]
    async fn test_memory_store_services_are_independent() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.next_index("openai", 2).await.unwrap(), 1);
        assert_eq!(store.next_index("claude", 2).await.unwrap(), 1);
        assert_eq!(store.next_index("openai", 2).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_zero_modulus_rejected() {
        let store = MemoryCounterStore::new();
        let err = store.next_index("openai", 0).await.unwrap_err();
        assert!(matches!(err, CounterStoreError::InvalidModulus(0)));
    }

    #[tokio::test]
    async fn test_pool_shrink_stays_in_range() {
        let store = MemoryCounterStore::new();
        for _ in 0..5 {
            store.next_index("openai", 5).await.unwrap();
        }
        assert_eq!(store.next_index("openai", 2).await.unwrap(), 2);
        assert_eq!(store.next_index("openai", 2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_database_store_upserts() {
        let db = Arc::new(memory_database().await.unwrap());
        let store = DatabaseCounterStore::new(db);

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(store.next_index("gemini", 2).await.unwrap());
        }
        assert_eq!(seen, vec![1, 2, 1, 2, 1]);
        assert_eq!(store.next_index("claude", 4).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_database_store_concurrent_connections() {
        let (_dir, db) = file_database(5).await.unwrap();
        let store = Arc::new(DatabaseCounterStore::new(Arc::new(db)));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.next_index("openai", 4).await })
            })
            .collect();

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap().unwrap());
        }
        seen.sort_unstable();

        // 20 次推进恰好覆盖 4 个索引各 5 次，没有重复或丢失
        let expected: Vec<i64> = (1..=4).flat_map(|i| std::iter::repeat_n(i, 5)).collect();
        assert_eq!(seen, expected);
        assert_eq!(store.next_index("openai", 4).await.unwrap(), 1);
    }
}
