//! # 测试辅助函数

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::sync::Once;
use tempfile::TempDir;
use tracing::Level;

use crate::config::DatabaseConfig;
use crate::database::{init_database, run_migrations};

static INIT: Once = Once::new();

/// 初始化测试日志（只执行一次）
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 已执行迁移的内存 SQLite 数据库
///
/// 连接池固定为 1，保证所有查询落在同一个内存库上。
pub async fn memory_database() -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// 临时目录中已执行迁移的 SQLite 文件数据库，连接池可以有多个连接
///
/// 返回的 `TempDir` 被释放时数据库文件一并删除。
pub async fn file_database(max_connections: u32) -> Result<(TempDir, DatabaseConnection), DbErr> {
    let dir = tempfile::tempdir()
        .map_err(|e| DbErr::Custom(format!("无法创建临时目录: {e}")))?;
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("relay.db").display()),
        max_connections,
        ..DatabaseConfig::default()
    };
    let db = init_database(&config).await?;
    run_migrations(&db).await?;
    Ok((dir, db))
}
