//! # 测试支持模块
//!
//! 供单元测试与 `tests/` 集成测试共用的内存数据库与协作者替身

mod fakes;
mod helpers;

pub use fakes::{
    CollectingTelemetrySink, FailingCacheGateway, FailingCounterStore, FailingTelemetrySink,
    RecordingTransport,
};
pub use helpers::{file_database, init_test_env, memory_database};
