//! # 请求上下文
//!
//! 分类阶段为每个入站请求创建一次，请求结束后丢弃

use bytes::Bytes;
use std::fmt;

/// 寻址模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// 由路径前缀决定上游
    Transparent,
    /// 由请求体中的 `provider/model` 决定上游
    Intelligent,
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transparent => f.write_str("transparent"),
            Self::Intelligent => f.write_str("intelligent"),
        }
    }
}

/// 请求上下文
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// 请求ID
    pub request_id: String,
    /// 寻址模式
    pub mode: RoutingMode,
    /// 服务令牌（路由表键）
    pub service: String,
    /// 解析出的模型名，无法解析时为 `unknown`
    pub model: String,
    /// 是否可缓存（由流水线在分类之后判定）
    pub cacheable: bool,
    /// 智能模式下改写过 `model` 字段的请求体
    pub rewritten_body: Option<Bytes>,
    /// 轮换得到的上游凭证
    pub override_credential: Option<String>,
    /// 调用方出示的凭证
    pub incoming_credential: Option<String>,
    /// 改写后的上游路径（不含查询串）
    pub upstream_path: String,
}

impl RequestContext {
    /// 是否启用了凭证轮换
    #[must_use]
    pub const fn is_rotated(&self) -> bool {
        self.override_credential.is_some()
    }
}
