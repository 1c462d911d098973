//! # Entity 模块
//!
//! 包含网关持久化使用的 Sea-ORM 实体定义

pub mod key_rotation_state;
pub mod request_logs;

pub use key_rotation_state::Entity as KeyRotationState;
pub use request_logs::Entity as RequestLogs;
