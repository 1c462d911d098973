//! # AI Relay Library
//!
//! 面向多个 AI 服务上游的请求路由网关：透明/智能两种寻址、主密钥触发的凭证轮换、内容寻址的响应缓存

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod key_pool;
pub mod logging;
pub mod proxy;
#[cfg(any(test, feature = "testing"))]
#[doc(hidden)]
pub mod testing;
pub mod trace;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{ProxyError, Result};
