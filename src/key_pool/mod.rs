//! # 密钥池模块
//!
//! 主密钥触发的上游凭证轮换，以及支撑轮换的原子计数器存储

pub mod counter_store;
pub mod rotation;

pub use counter_store::{CounterStore, DatabaseCounterStore, MemoryCounterStore};
pub use rotation::{RotationCoordinator, normalize_index, parse_pool};
