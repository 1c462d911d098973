use thiserror::Error;

/// 轮换计数器存储的错误
#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("计数器查询失败: {0}")]
    Query(#[from] sea_orm::DbErr),

    #[error("计数器未返回结果: {service}")]
    MissingRow { service: String },

    #[error("无效的密钥池大小: {0}")]
    InvalidModulus(usize),

    #[error("不支持的数据库后端: {0}")]
    UnsupportedBackend(String),
}

impl From<CounterStoreError> for super::ProxyError {
    fn from(err: CounterStoreError) -> Self {
        let message = err.to_string();
        Self::store_failure_with_source(message, err)
    }
}
