//! # 应用配置结构定义

use super::DatabaseConfig;
use crate::proxy::route_table::AuthScheme;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 入站服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 数据库配置（轮换计数器与请求日志）
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 响应缓存配置
    #[serde(default)]
    pub cache: CacheConfig,
    /// 路由表：服务令牌 -> 上游
    #[serde(default)]
    pub routes: BTreeMap<String, RouteConfig>,
    /// 主密钥与密钥池
    #[serde(default)]
    pub secrets: SecretsConfig,
}

/// 入站服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub bind_address: String,
    /// 监听端口
    pub port: u16,
    /// 请求体最大字节数
    pub max_body_bytes: usize,
    /// 上游请求超时（秒）
    pub upstream_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 32 * 1024 * 1024,
            upstream_timeout_seconds: 300,
        }
    }
}

/// 缓存类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// 内存缓存
    #[default]
    Memory,
    /// Redis缓存
    Redis,
    /// 关闭响应缓存
    Disabled,
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 缓存类型
    pub cache_type: CacheType,
    /// 响应缓存过期时间（秒）
    pub ttl_seconds: u64,
    /// 内存缓存最大条目数
    pub memory_max_entries: u64,
    /// Redis 缓存配置
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
    /// 不可缓存的路径片段（子串匹配）
    pub non_cacheable_paths: Vec<String>,
    /// 不可缓存的模型关键字（对小写模型名做子串匹配）
    pub non_cacheable_keywords: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: CacheType::Memory,
            ttl_seconds: 1800,
            memory_max_entries: 10_000,
            redis: None,
            non_cacheable_paths: [
                "streamGenerateContent",
                "/audio/",
                "/images/",
                "/files",
                "/batches",
                "/realtime",
                "/fine_tuning",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            non_cacheable_keywords: [
                "image",
                "vision",
                "multimodal",
                "dall-e",
                "imagen",
                "flux",
                "stable-diffusion",
                "sora",
                "veo",
                "tts",
                "whisper",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Redis配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis连接URL
    pub url: String,
    /// 缓存键前缀
    #[serde(default = "default_redis_prefix")]
    pub key_prefix: String,
}

fn default_redis_prefix() -> String {
    "relay:cache:".to_string()
}

/// 单个路由的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// 上游主机名（可带端口）
    pub host: String,
    /// 上游的凭证注入方式
    #[serde(default)]
    pub auth: AuthScheme,
    /// 智能路由模式下使用的上游路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_completions_path: Option<String>,
    /// 请求体没有 model 时是否从路径第 4 段提取
    #[serde(default)]
    pub model_from_path: bool,
}

impl RouteConfig {
    fn bearer(host: &str) -> Self {
        Self {
            host: host.to_string(),
            auth: AuthScheme::Bearer,
            chat_completions_path: None,
            model_from_path: false,
        }
    }

    fn with_chat_path(mut self, path: &str) -> Self {
        self.chat_completions_path = Some(path.to_string());
        self
    }
}

/// 主密钥与密钥池原始配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// 主密钥；调用方出示它时启用密钥轮换
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_secret: Option<String>,
    /// `<SERVICE>_API_KEYS` -> JSON 字符串数组
    #[serde(default)]
    pub key_pools: HashMap<String, String>,
}

/// 内置路由表，配置文件未声明 `[routes]` 时使用
#[must_use]
pub fn default_routes() -> BTreeMap<String, RouteConfig> {
    let mut routes = BTreeMap::new();
    routes.insert("openai".to_string(), RouteConfig::bearer("api.openai.com"));
    routes.insert(
        "claude".to_string(),
        RouteConfig {
            host: "api.anthropic.com".to_string(),
            auth: AuthScheme::Header {
                name: "x-api-key".to_string(),
            },
            chat_completions_path: None,
            model_from_path: false,
        },
    );
    routes.insert(
        "gemini".to_string(),
        RouteConfig {
            host: "generativelanguage.googleapis.com".to_string(),
            auth: AuthScheme::Query {
                name: "key".to_string(),
            },
            chat_completions_path: Some("/v1beta/openai/chat/completions".to_string()),
            model_from_path: true,
        },
    );
    routes.insert(
        "elevenlabs".to_string(),
        RouteConfig {
            host: "api.elevenlabs.io".to_string(),
            auth: AuthScheme::Header {
                name: "xi-api-key".to_string(),
            },
            chat_completions_path: None,
            model_from_path: false,
        },
    );
    routes.insert(
        "groq".to_string(),
        RouteConfig::bearer("api.groq.com").with_chat_path("/openai/v1/chat/completions"),
    );
    routes.insert("xai".to_string(), RouteConfig::bearer("api.x.ai"));
    routes.insert("mistral".to_string(), RouteConfig::bearer("api.mistral.ai"));
    routes.insert(
        "deepseek".to_string(),
        RouteConfig::bearer("api.deepseek.com").with_chat_path("/chat/completions"),
    );
    routes.insert(
        "openrouter".to_string(),
        RouteConfig::bearer("openrouter.ai").with_chat_path("/api/v1/chat/completions"),
    );
    routes.insert("cerebras".to_string(), RouteConfig::bearer("api.cerebras.ai"));
    routes
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        if self.routes.is_empty() {
            return Err("At least one route must be configured".to_string());
        }

        for (token, route) in &self.routes {
            if token.is_empty() || token.contains('/') {
                return Err(format!("Invalid route token: '{token}'"));
            }
            if token.chars().any(char::is_uppercase) {
                return Err(format!("Route token must be lowercase: '{token}'"));
            }
            if route.host.trim().is_empty() {
                return Err(format!("Route '{token}' has an empty host"));
            }
            if let Some(path) = &route.chat_completions_path {
                if !path.starts_with('/') {
                    return Err(format!(
                        "Route '{token}' chat_completions_path must start with '/'"
                    ));
                }
            }
        }

        if self.server.max_body_bytes == 0 {
            return Err("server.max_body_bytes must be greater than 0".to_string());
        }

        if self.cache.cache_type != CacheType::Disabled && self.cache.ttl_seconds == 0 {
            return Err("cache.ttl_seconds must be greater than 0".to_string());
        }

        if self.cache.cache_type == CacheType::Redis {
            let redis = self
                .cache
                .redis
                .as_ref()
                .ok_or_else(|| "Redis cache configuration must be provided".to_string())?;
            if redis.url.is_empty() {
                return Err("Redis URL cannot be empty".to_string());
            }
        }

        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        Ok(())
    }

    /// 获取监听地址
    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}
