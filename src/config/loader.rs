//! # 配置加载器
//!
//! 读取 TOML 配置文件并应用环境变量覆盖

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use super::app_config::{AppConfig, RedisConfig, default_routes};
use super::secrets::pool_key_name;
use crate::error::{ConfigError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

const CONFIG_PATH_ENV: &str = "AI_RELAY_CONFIG_PATH";
const MASTER_SECRET_ENV: &str = "AI_RELAY_MASTER_SECRET";
const DATABASE_URL_ENV: &str = "AI_RELAY_DATABASE_URL";
const REDIS_URL_ENV: &str = "AI_RELAY_REDIS_URL";

/// 解析配置文件路径：命令行参数 > 环境变量 > `config/config.{RUST_ENV}.toml`
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    PathBuf::from(format!("config/config.{env_name}.toml"))
}

/// 加载、覆盖并验证配置
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = resolve_config_path(explicit);
    if !path.exists() {
        return Err(ConfigError::Load(format!("配置文件不存在: {}", path.display())).into());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| ConfigError::Load(format!("读取配置文件失败 {}: {e}", path.display())))?;

    let mut config: AppConfig = toml::from_str(&content).map_err(ConfigError::from)?;

    if config.routes.is_empty() {
        config.routes = default_routes();
    }

    let overrides = build_env_overrides(&config);
    apply_env_overrides(&mut config, &overrides);

    config.validate().map_err(ConfigError::Invalid)?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Config,
        "config_loaded",
        "Gateway configuration loaded",
        path = %path.display(),
        routes = config.routes.len(),
        overrides = overrides.len()
    );

    Ok(config)
}

/// 收集与当前配置相关的环境变量覆盖
#[must_use]
pub fn build_env_overrides(config: &AppConfig) -> HashMap<String, String> {
    let mut wanted: Vec<String> = vec![
        MASTER_SECRET_ENV.to_string(),
        DATABASE_URL_ENV.to_string(),
        REDIS_URL_ENV.to_string(),
    ];
    wanted.extend(config.routes.keys().map(|token| pool_key_name(token)));

    wanted
        .into_iter()
        .filter_map(|name| env::var(&name).ok().map(|value| (name, value)))
        .collect()
}

/// 应用环境变量覆盖
pub fn apply_env_overrides(config: &mut AppConfig, overrides: &HashMap<String, String>) {
    for (name, value) in overrides {
        ldebug!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "env_override",
            "Applying environment override",
            variable = name.as_str()
        );

        match name.as_str() {
            MASTER_SECRET_ENV => config.secrets.master_secret = Some(value.clone()),
            DATABASE_URL_ENV => config.database.url.clone_from(value),
            REDIS_URL_ENV => match config.cache.redis.as_mut() {
                Some(redis) => redis.url.clone_from(value),
                None => {
                    config.cache.redis = Some(RedisConfig {
                        url: value.clone(),
                        key_prefix: "relay:cache:".to_string(),
                    });
                }
            },
            pool_key if pool_key.ends_with("_API_KEYS") => {
                config
                    .secrets
                    .key_pools
                    .insert(pool_key.to_string(), value.clone());
            }
            _ => {}
        }
    }
}
