use thiserror::Error;

/// 描述缓存及 Redis 相关的错误。
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("缓存操作失败: {0}")]
    Operation(String),

    #[error("缓存条目编码失败: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Redis 客户端错误: {0}")]
    Redis(#[from] redis::RedisError),
}

impl CacheError {
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }
}

impl From<CacheError> for super::ProxyError {
    fn from(err: CacheError) -> Self {
        let message = err.to_string();
        Self::cache_with_source(message, err)
    }
}
