//! # 遥测发射器
//!
//! 请求路径只把记录放进无界队列，后台任务负责写入输出

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::sink::TelemetrySink;
use super::types::TelemetryRecord;
use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};

/// 遥测发射器，可廉价克隆
#[derive(Clone)]
pub struct TelemetryEmitter {
    sender: mpsc::UnboundedSender<TelemetryRecord>,
}

impl TelemetryEmitter {
    /// 启动后台写入任务
    ///
    /// 所有发射器被丢弃后任务会清空队列并退出。
    #[must_use]
    pub fn spawn(sink: Arc<dyn TelemetrySink>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<TelemetryRecord>();

        let handle = tokio::spawn(async move {
            while let Some(record) = receiver.recv().await {
                if let Err(e) = sink.record(&record).await {
                    lwarn!(
                        record.request_id,
                        LogStage::Telemetry,
                        LogComponent::Telemetry,
                        "sink_failed",
                        "Telemetry sink failed, record dropped",
                        error = %e
                    );
                }
            }
            linfo!(
                "system",
                LogStage::Shutdown,
                LogComponent::Telemetry,
                "worker_stopped",
                "Telemetry worker stopped"
            );
        });

        (Self { sender }, handle)
    }

    /// 提交记录，不阻塞；worker 已退出时静默丢弃
    pub fn emit(&self, record: TelemetryRecord) {
        if self.sender.send(record).is_err() {
            lwarn!(
                "system",
                LogStage::Telemetry,
                LogComponent::Telemetry,
                "emit_dropped",
                "Telemetry worker is gone, record dropped"
            );
        }
    }
}
