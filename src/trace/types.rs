//! 遥测记录类型

use chrono::{DateTime, Utc};

use crate::cache::CacheStatus;

/// 单个请求的遥测记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub request_id: String,
    pub service: String,
    pub model: String,
    pub status_code: u16,
    pub latency_ms: u64,
    pub cache_status: CacheStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TelemetryRecord {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }
}
