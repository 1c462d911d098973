//! # 缓存网关抽象
//!
//! 响应缓存的统一接口，以及可序列化的缓存条目

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::CacheError;

/// 响应头中的缓存标注
pub const CACHE_STATUS_HEADER: &str = "x-cache-status";

/// 不写入缓存条目的响应头
const UNCACHED_HEADERS: [&str; 4] = [
    "content-length",
    "transfer-encoding",
    "connection",
    "set-cookie",
];

/// 单次请求的缓存结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    NotApplicable,
}

impl CacheStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::NotApplicable => "N/A",
        }
    }

    #[must_use]
    pub fn header_value(&self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 缓存的上游响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// 从上游响应构建条目，跳过逐跳头与长度头
    #[must_use]
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: Bytes, ttl: Duration) -> Self {
        let headers = headers
            .iter()
            .filter(|(name, _)| !UNCACHED_HEADERS.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        Self {
            status: status.as_u16(),
            headers,
            body,
            stored_at: Utc::now(),
            ttl_seconds: ttl.as_secs(),
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK)
    }

    /// 还原响应头，无法解析的条目被忽略
    #[must_use]
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                map.append(name, value);
            }
        }
        map
    }

    pub fn to_json(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, CacheError> {
        Ok(serde_json::from_str(raw)?)
    }
}

mod body_base64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

/// 响应缓存
///
/// 写入采用后写覆盖，同一键的并发写入互不协调。
#[async_trait]
pub trait CacheGateway: Send + Sync {
    /// 查找缓存条目
    async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// 写入缓存条目
    async fn store(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<(), CacheError>;

    /// 后端名称，用于日志
    fn backend(&self) -> &'static str;
}
