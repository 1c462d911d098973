//! # 路由表
//!
//! 服务令牌到上游主机的静态映射，加载后不可变

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::RouteConfig;

/// 智能路由模式的入站端点，同时也是默认的上游路径
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// 上游的凭证注入方式
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    #[default]
    Bearer,
    /// 专用请求头，例如 `x-api-key: <key>`
    Header { name: String },
    /// 查询参数，例如 `?key=<key>`
    Query { name: String },
}

/// 单个上游路由
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub host: String,
    pub auth: AuthScheme,
    pub chat_completions_path: String,
    pub model_from_path: bool,
}

impl From<&RouteConfig> for RouteEntry {
    fn from(config: &RouteConfig) -> Self {
        Self {
            host: config.host.trim().trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
            chat_completions_path: config
                .chat_completions_path
                .clone()
                .unwrap_or_else(|| CHAT_COMPLETIONS_PATH.to_string()),
            model_from_path: config.model_from_path,
        }
    }
}

/// 路由表
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: BTreeMap<String, RouteEntry>,
}

impl RouteTable {
    #[must_use]
    pub fn new(routes: BTreeMap<String, RouteEntry>) -> Self {
        Self { routes }
    }

    #[must_use]
    pub fn from_config(routes: &BTreeMap<String, RouteConfig>) -> Self {
        Self::new(
            routes
                .iter()
                .map(|(token, route)| (token.to_ascii_lowercase(), RouteEntry::from(route)))
                .collect(),
        )
    }

    #[must_use]
    pub fn get(&self, token: &str) -> Option<&RouteEntry> {
        self.routes.get(token)
    }

    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.routes.contains_key(token)
    }

    /// 已配置的全部服务令牌（有序）
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
