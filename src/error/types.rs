//! # 错误类型定义

use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode, header};
use serde_json::json;
use thiserror::Error;

/// 结构性畸形请求（无任何路径段）使用的非标准状态码
pub const MALFORMED_REQUEST_STATUS: u16 = 444;

/// 网关主要错误类型
#[derive(Debug, Error)]
pub enum ProxyError {
    /// 路径首段不是已配置的服务，也不是智能路由端点
    #[error("No route matches '{path}'. Configured routes: {}", .routes.join(", "))]
    InvalidRoute { path: String, routes: Vec<String> },

    /// 结构性畸形请求，在分类之前拒绝
    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },

    /// 请求体超过入站上限
    #[error("Request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// 请求体读取失败
    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 智能路由模式下调用方凭证与主密钥不符
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// `model` 字段缺少提供商前缀或提供商未知
    #[error("Invalid model '{model}': expected '<provider>/<model>' with a configured provider")]
    InvalidModel { model: String },

    /// 需要轮换但密钥池缺失、为空或格式错误
    #[error("Credential pool {key} is not configured: {reason}")]
    NotConfigured { key: String, reason: String },

    /// 轮换计数器存储不可用
    #[error("Rotation counter store failure: {message}")]
    StoreFailure {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 上游传输层失败（连接、解析等）
    #[error("Upstream unreachable: {message}")]
    UpstreamUnreachable {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 配置相关错误
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 缓存相关错误
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 数据库相关错误
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 系统内部错误
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl ProxyError {
    /// 将错误转换为HTTP状态码和错误代码
    #[must_use]
    pub fn to_http_response_parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidRoute { .. } => (StatusCode::NOT_FOUND, "invalid_route"),
            Self::MalformedRequest { .. } => (
                StatusCode::from_u16(MALFORMED_REQUEST_STATUS).unwrap_or(StatusCode::BAD_REQUEST),
                "malformed_request",
            ),
            Self::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Self::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
            Self::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::InvalidModel { .. } => (StatusCode::BAD_REQUEST, "invalid_model"),
            Self::NotConfigured { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "not_configured"),
            Self::StoreFailure { .. } => (StatusCode::SERVICE_UNAVAILABLE, "store_failure"),
            Self::UpstreamUnreachable { .. } => (StatusCode::BAD_GATEWAY, "upstream_unreachable"),
            Self::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Self::Cache { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "cache_error"),
            Self::Database { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    /// HTTP 状态码
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.to_http_response_parts().0
    }

    /// 是否应当生成遥测记录（畸形请求属于预检拒绝，不记录）
    #[must_use]
    pub const fn is_logged(&self) -> bool {
        !matches!(self, Self::MalformedRequest { .. })
    }

    /// 生成返回给调用方的响应体
    ///
    /// 畸形请求返回纯文本，其余错误返回 JSON：
    /// `{"error": {"message", "type", "code"}}`
    #[must_use]
    pub fn to_response(&self) -> Response<Body> {
        let (status, code) = self.to_http_response_parts();

        if matches!(self, Self::MalformedRequest { .. }) {
            let mut response = Response::new(Body::from(self.to_string()));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            return response;
        }

        let payload = json!({
            "error": {
                "message": self.to_string(),
                "type": code,
                "code": status.as_u16(),
            }
        });

        let mut response = Response::new(Body::from(payload.to_string()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// 创建路由无效错误
    pub fn invalid_route<P: Into<String>>(path: P, routes: Vec<String>) -> Self {
        Self::InvalidRoute {
            path: path.into(),
            routes,
        }
    }

    /// 创建畸形请求错误
    pub fn malformed_request<T: Into<String>>(message: T) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// 创建请求体过大错误
    #[must_use]
    pub const fn payload_too_large(limit: usize) -> Self {
        Self::PayloadTooLarge { limit }
    }

    /// 创建带来源的请求无效错误
    pub fn invalid_request_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建未授权错误
    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// 创建模型无效错误
    pub fn invalid_model<T: Into<String>>(model: T) -> Self {
        Self::InvalidModel {
            model: model.into(),
        }
    }

    /// 创建密钥池未配置错误
    pub fn not_configured<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        Self::NotConfigured {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// 创建计数器存储错误
    pub fn store_failure<T: Into<String>>(message: T) -> Self {
        Self::StoreFailure {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的计数器存储错误
    pub fn store_failure_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::StoreFailure {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建上游不可达错误
    pub fn upstream_unreachable<T: Into<String>>(message: T) -> Self {
        Self::UpstreamUnreachable {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的上游不可达错误
    pub fn upstream_unreachable_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::UpstreamUnreachable {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建配置错误
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的配置错误
    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建带来源的缓存错误
    pub fn cache_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Cache {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建带来源的数据库错误
    pub fn database_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建内部错误
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的内部错误
    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<sea_orm::DbErr> for ProxyError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::database_with_source("database operation failed", err)
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        Self::internal_with_source("io operation failed", err)
    }
}
