//! # 配置管理模块
//!
//! 处理网关配置的加载、环境变量覆盖与验证

mod app_config;
mod database;
mod loader;
mod secrets;

pub use app_config::{
    AppConfig, CacheConfig, CacheType, RedisConfig, RouteConfig, ServerConfig, default_routes,
};
pub use database::DatabaseConfig;
pub use loader::{apply_env_overrides, build_env_overrides, load_config, resolve_config_path};
pub use secrets::{GatewaySecrets, pool_key_name};
