//! # 请求遥测
//!
//! 每个完成分类的请求产生一条记录，经后台队列写入日志或数据库

pub mod emitter;
pub mod sink;
pub mod types;

pub use emitter::TelemetryEmitter;
pub use sink::{DatabaseTelemetrySink, FanoutTelemetrySink, LogTelemetrySink, TelemetrySink};
pub use types::TelemetryRecord;
