//! # 网关密钥
//!
//! 主密钥比对与按服务查找密钥池原始配置

use std::collections::HashMap;
use subtle::ConstantTimeEq;

use super::app_config::SecretsConfig;

/// 服务对应的密钥池配置键名，例如 `openai` -> `OPENAI_API_KEYS`
#[must_use]
pub fn pool_key_name(service: &str) -> String {
    format!("{}_API_KEYS", service.to_ascii_uppercase().replace('-', "_"))
}

/// 加载后不可变的密钥集合
#[derive(Clone, Default)]
pub struct GatewaySecrets {
    master_secret: Option<String>,
    key_pools: HashMap<String, String>,
}

impl std::fmt::Debug for GatewaySecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySecrets")
            .field("master_secret", &self.master_secret.as_ref().map(|_| "***"))
            .field("key_pools", &self.key_pools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl GatewaySecrets {
    #[must_use]
    pub const fn new(master_secret: Option<String>, key_pools: HashMap<String, String>) -> Self {
        Self {
            master_secret,
            key_pools,
        }
    }

    #[must_use]
    pub fn from_config(config: &SecretsConfig) -> Self {
        let master_secret = config
            .master_secret
            .as_ref()
            .filter(|secret| !secret.is_empty())
            .cloned();
        Self::new(master_secret, config.key_pools.clone())
    }

    /// 是否配置了主密钥
    #[must_use]
    pub const fn has_master_secret(&self) -> bool {
        self.master_secret.is_some()
    }

    /// 调用方凭证是否与主密钥完全一致（常量时间比较）
    #[must_use]
    pub fn matches_master(&self, credential: Option<&str>) -> bool {
        match (self.master_secret.as_deref(), credential) {
            (Some(master), Some(candidate)) => {
                master.as_bytes().ct_eq(candidate.as_bytes()).into()
            }
            _ => false,
        }
    }

    /// 返回 (配置键名, 原始 JSON)
    #[must_use]
    pub fn pool_for(&self, service: &str) -> (String, Option<&str>) {
        let key = pool_key_name(service);
        let raw = self.key_pools.get(&key).map(String::as_str);
        (key, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_key_name() {
        assert_eq!(pool_key_name("openai"), "OPENAI_API_KEYS");
        assert_eq!(pool_key_name("open-router"), "OPEN_ROUTER_API_KEYS");
    }

    #[test]
    fn test_matches_master() {
        let secrets = GatewaySecrets::new(Some("relay-master".to_string()), HashMap::new());
        assert!(secrets.matches_master(Some("relay-master")));
        assert!(!secrets.matches_master(Some("relay-master2")));
        assert!(!secrets.matches_master(None));
    }

    #[test]
    fn test_no_master_never_matches() {
        let secrets = GatewaySecrets::default();
        assert!(!secrets.has_master_secret());
        assert!(!secrets.matches_master(Some("")));
    }

    #[test]
    fn test_empty_master_treated_as_unset() {
        let config = SecretsConfig {
            master_secret: Some(String::new()),
            key_pools: HashMap::new(),
        };
        assert!(!GatewaySecrets::from_config(&config).has_master_secret());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut pools = HashMap::new();
        pools.insert("OPENAI_API_KEYS".to_string(), r#"["sk-1"]"#.to_string());
        let secrets = GatewaySecrets::new(Some("relay-master".to_string()), pools);
        let rendered = format!("{secrets:?}");
        assert!(!rendered.contains("relay-master"));
        assert!(!rendered.contains("sk-1"));
    }
}
