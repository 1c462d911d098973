//! # 遥测输出
//!
//! 遥测记录的最终去向：结构化日志或 `request_logs` 表

use async_trait::async_trait;
use entity::request_logs;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;

use super::types::TelemetryRecord;
use crate::error::{ProxyError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};

/// 遥测输出
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record(&self, record: &TelemetryRecord) -> Result<()>;
}

/// 以结构化日志输出遥测
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetrySink;

#[async_trait]
impl TelemetrySink for LogTelemetrySink {
    async fn record(&self, record: &TelemetryRecord) -> Result<()> {
        linfo!(
            record.request_id,
            LogStage::Telemetry,
            LogComponent::Telemetry,
            "request_completed",
            "Request completed",
            service = record.service.as_str(),
            model = record.model.as_str(),
            status = record.status_code,
            latency_ms = record.latency_ms,
            cache = record.cache_status.as_str(),
            error = record.error_message.as_deref().unwrap_or("")
        );
        Ok(())
    }
}

/// 写入 `request_logs` 表
#[derive(Clone)]
pub struct DatabaseTelemetrySink {
    db: Arc<DatabaseConnection>,
}

impl DatabaseTelemetrySink {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TelemetrySink for DatabaseTelemetrySink {
    async fn record(&self, record: &TelemetryRecord) -> Result<()> {
        let latency_ms = i64::try_from(record.latency_ms).unwrap_or(i64::MAX);
        let row = request_logs::ActiveModel {
            service: Set(record.service.clone()),
            model: Set(record.model.clone()),
            status_code: Set(i32::from(record.status_code)),
            latency_ms: Set(latency_ms),
            cache_status: Set(record.cache_status.as_str().to_string()),
            error_message: Set(record.error_message.clone()),
            created_at: Set(record.created_at.naive_utc()),
            ..Default::default()
        };

        row.insert(self.db.as_ref())
            .await
            .map_err(|e| ProxyError::database_with_source("failed to insert request log", e))?;
        Ok(())
    }
}

/// 同时写入多个输出，任一失败不影响其余
pub struct FanoutTelemetrySink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutTelemetrySink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl TelemetrySink for FanoutTelemetrySink {
    async fn record(&self, record: &TelemetryRecord) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(record).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
