//! # 日志配置模块
//!
//! 提供日志初始化、结构化日志宏以及阶段/组件标签

use std::env;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 请求处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    Startup,
    Shutdown,
    RequestStart,
    Routing,
    Cache,
    Authentication,
    UpstreamRequest,
    Response,
    Telemetry,
    Db,
    Error,
}

impl LogStage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::RequestStart => "request_start",
            Self::Routing => "routing",
            Self::Cache => "cache",
            Self::Authentication => "authentication",
            Self::UpstreamRequest => "upstream_request",
            Self::Response => "response",
            Self::Telemetry => "telemetry",
            Self::Db => "db",
            Self::Error => "error",
        }
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    Main,
    Config,
    Server,
    Pipeline,
    Classifier,
    Cache,
    KeyPool,
    Dispatcher,
    Transport,
    Telemetry,
    Database,
}

impl LogComponent {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::Server => "server",
            Self::Pipeline => "pipeline",
            Self::Classifier => "classifier",
            Self::Cache => "cache",
            Self::KeyPool => "key_pool",
            Self::Dispatcher => "dispatcher",
            Self::Transport => "transport",
            Self::Telemetry => "telemetry",
            Self::Database => "database",
        }
    }
}

/// 结构化 info 日志：`linfo!(request_id, stage, component, operation, message, fields...)`
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)+)?) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            $($($field)+ ,)?
            "{}", $message
        )
    };
}

/// 结构化 debug 日志
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)+)?) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            $($($field)+ ,)?
            "{}", $message
        )
    };
}

/// 结构化 warn 日志
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)+)?) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            $($($field)+ ,)?
            "{}", $message
        )
    };
}

/// 结构化 error 日志
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)+)?) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            $($($field)+ ,)?
            "{}", $message
        )
    };
}

/// 脱敏凭证，仅保留首尾各 4 个字符
#[must_use]
pub fn sanitize_credential(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// 初始化日志系统
pub fn init_logging(log_level: Option<&str>) {
    let level = log_level.unwrap_or("info");

    // 默认关闭 sqlx 查询明细，避免每次轮换都打印 SQL
    let default_filter = format!("{level},ai_relay=debug,sqlx::query=off,sea_orm::query=warn,sqlx=warn");

    let log_filter = env::var("RUST_LOG").unwrap_or(default_filter);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// 环境变量设置指南
pub fn print_logging_help() {
    println!("📋 日志配置指南:");
    println!("  RUST_LOG=info                      # 标准日志级别");
    println!("  RUST_LOG=debug                     # 调试级别");
    println!("  RUST_LOG=info,sqlx::query=info     # 打印轮换计数器 SQL");
    println!("  RUST_LOG=ai_relay=trace            # 网关详细追踪");
}
