//! # 凭证轮换协调器
//!
//! 调用方出示主密钥时，从服务的密钥池中按轮询顺序取出一个上游凭证

use std::sync::Arc;

use super::counter_store::CounterStore;
use crate::config::GatewaySecrets;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage, sanitize_credential};
use crate::{ldebug, lerror};

/// 解析密钥池配置
///
/// 池必须是非空的 JSON 字符串数组。
pub fn parse_pool(key: &str, raw: Option<&str>) -> Result<Vec<String>> {
    let raw = raw.ok_or_else(|| ProxyError::not_configured(key, "pool is missing"))?;
    let pool: Vec<String> = serde_json::from_str(raw)
        .map_err(|_| ProxyError::not_configured(key, "pool must be a JSON array of strings"))?;
    if pool.is_empty() {
        return Err(ProxyError::not_configured(key, "pool is empty"));
    }
    Ok(pool)
}

/// 将计数器返回的 1 基索引折算为 0 基偏移
#[must_use]
#[allow(
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub const fn normalize_index(raw: i64, pool_size: usize) -> usize {
    let n = pool_size as i64;
    (raw - 1 + n).rem_euclid(n) as usize
}

/// 凭证轮换协调器
pub struct RotationCoordinator {
    secrets: Arc<GatewaySecrets>,
    counter: Arc<dyn CounterStore>,
}

impl RotationCoordinator {
    #[must_use]
    pub fn new(secrets: Arc<GatewaySecrets>, counter: Arc<dyn CounterStore>) -> Self {
        Self { secrets, counter }
    }

    /// 是否启用轮换：配置了主密钥且调用方凭证与之相同
    #[must_use]
    pub fn is_activated(&self, incoming: Option<&str>) -> bool {
        self.secrets.matches_master(incoming)
    }

    /// 选择本次请求使用的上游凭证
    ///
    /// 未启用轮换时返回 `None`，调用方凭证原样转发。
    /// 计数器不可用时返回 `StoreFailure`，不会退回到调用方凭证。
    pub async fn select_credential(
        &self,
        request_id: &str,
        service: &str,
        incoming: Option<&str>,
    ) -> Result<Option<String>> {
        if !self.is_activated(incoming) {
            return Ok(None);
        }

        let (key, raw) = self.secrets.pool_for(service);
        let pool = parse_pool(&key, raw)?;

        let raw_index = self
            .counter
            .next_index(service, pool.len())
            .await
            .map_err(|e| {
                lerror!(
                    request_id,
                    LogStage::Authentication,
                    LogComponent::KeyPool,
                    "counter_failed",
                    "Rotation counter store failed",
                    service = service,
                    error = %e
                );
                ProxyError::from(e)
            })?;

        let offset = normalize_index(raw_index, pool.len());
        let credential = pool[offset].clone();

        ldebug!(
            request_id,
            LogStage::Authentication,
            LogComponent::KeyPool,
            "credential_selected",
            "Selected pooled credential",
            service = service,
            pool_size = pool.len(),
            offset = offset,
            credential = %sanitize_credential(&credential)
        );

        Ok(Some(credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::pool_key_name;
    use crate::key_pool::MemoryCounterStore;
    use crate::testing::FailingCounterStore;
    use rstest::rstest;
    use std::collections::{HashMap, HashSet};

    const MASTER: &str = "relay-master";

    fn coordinator_with(pools: &[(&str, &str)], counter: Arc<dyn CounterStore>) -> RotationCoordinator {
        let key_pools: HashMap<String, String> = pools
            .iter()
            .map(|(service, raw)| (pool_key_name(service), (*raw).to_string()))
            .collect();
        let secrets = Arc::new(GatewaySecrets::new(Some(MASTER.to_string()), key_pools));
        RotationCoordinator::new(secrets, counter)
    }

    #[rstest]
    #[case(1, 3, 0)]
    #[case(3, 3, 2)]
    #[case(4, 3, 0)]
    #[case(0, 3, 2)]
    #[case(1, 1, 0)]
    fn test_normalize_index(#[case] raw: i64, #[case] n: usize, #[case] expected: usize) {
        assert_eq!(normalize_index(raw, n), expected);
    }

    #[tokio::test]
    async fn test_sequential_round_robin() {
        let rotation = coordinator_with(
            &[("openai", r#"["k0","k1","k2"]"#)],
            Arc::new(MemoryCounterStore::new()),
        );

        let mut picked = Vec::new();
        for _ in 0..4 {
            picked.push(
                rotation
                    .select_credential("req", "openai", Some(MASTER))
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        assert_eq!(picked, vec!["k0", "k1", "k2", "k0"]);
    }

    #[tokio::test]
    async fn test_not_activated_without_master() {
        let rotation = coordinator_with(
            &[("openai", r#"["k0"]"#)],
            Arc::new(MemoryCounterStore::new()),
        );
        assert_eq!(
            rotation.select_credential("req", "openai", Some("sk-own")).await.unwrap(),
            None
        );
        assert_eq!(rotation.select_credential("req", "openai", None).await.unwrap(), None);
    }

    #[rstest]
    #[case(None)]
    #[case(Some("[]"))]
    #[case(Some("k0,k1"))]
    #[case(Some(r#"[1, 2]"#))]
    #[tokio::test]
    async fn test_pool_not_configured(#[case] raw: Option<&str>) {
        let pools: Vec<(&str, &str)> = raw.map(|r| vec![("claude", r)]).unwrap_or_default();
        let rotation = coordinator_with(&pools, Arc::new(MemoryCounterStore::new()));

        let err = rotation
            .select_credential("req", "claude", Some(MASTER))
            .await
            .unwrap_err();
        let ProxyError::NotConfigured { key, .. } = &err else {
            panic!("expected NotConfigured, got {err:?}");
        };
        assert_eq!(key, "CLAUDE_API_KEYS");
        assert_eq!(err.status_code().as_u16(), 500);
    }

    #[tokio::test]
    async fn test_store_failure_is_not_masked() {
        let rotation = coordinator_with(&[("openai", r#"["k0"]"#)], Arc::new(FailingCounterStore));
        let err = rotation
            .select_credential("req", "openai", Some(MASTER))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::StoreFailure { .. }));
        assert_eq!(err.status_code().as_u16(), 503);
    }

    #[tokio::test]
    async fn test_concurrent_selection_is_even() {
        let rotation = Arc::new(coordinator_with(
            &[("openai", r#"["k0","k1","k2"]"#)],
            Arc::new(MemoryCounterStore::new()),
        ));

        let handles: Vec<_> = (0..30)
            .map(|_| {
                let rotation = Arc::clone(&rotation);
                tokio::spawn(async move {
                    rotation
                        .select_credential("req", "openai", Some(MASTER))
                        .await
                        .unwrap()
                        .unwrap()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            *counts.entry(handle.await.unwrap()).or_default() += 1;
        }
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|count| *count == 10));
        let keys: HashSet<_> = counts.keys().cloned().collect();
        assert!(keys.contains("k2"));
    }
}
