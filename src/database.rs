//! # 数据库模块
//!
//! 数据库连接和迁移管理

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo, lwarn};

/// 初始化数据库连接
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let database_url = config.url.as_str();
    let display_url: String = database_url.chars().take(50).collect();
    linfo!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "connect",
        "Connecting to database",
        url = %display_url
    );

    // 对于SQLite数据库，确保数据库文件的目录和文件存在
    if database_url.starts_with("sqlite:") && !config.is_in_memory() {
        ensure_sqlite_file(database_url)?;
    }

    // 内存库的每个连接都是独立的数据库
    let max_connections = if config.is_in_memory() {
        1
    } else {
        config.max_connections
    };

    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(max_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;

    linfo!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "connected",
        "Database connected",
        max_connections = max_connections
    );
    Ok(db)
}

fn ensure_sqlite_file(database_url: &str) -> Result<(), DbErr> {
    let db_path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    // 去掉 `?mode=rwc` 之类的查询参数
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    let db_file_path = Path::new(db_path);

    if let Some(parent_dir) = db_file_path.parent()
        && !parent_dir.as_os_str().is_empty()
        && !parent_dir.exists()
    {
        std::fs::create_dir_all(parent_dir).map_err(|e| {
            DbErr::Custom(format!(
                "无法创建数据库目录 {}: {e}",
                parent_dir.display()
            ))
        })?;
        ldebug!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "create_dir",
            "Created database directory",
            path = %parent_dir.display()
        );
    }

    if !db_file_path.exists() {
        std::fs::File::create(db_file_path).map_err(|e| {
            DbErr::Custom(format!(
                "无法创建数据库文件 {}: {e}",
                db_file_path.display()
            ))
        })?;
        ldebug!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "create_file",
            "Created database file",
            path = %db_file_path.display()
        );
    }
    Ok(())
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    let pending = ::migration::Migrator::get_pending_migrations(db).await?;
    if pending.is_empty() {
        ldebug!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "migrations_up_to_date",
            "All migrations already applied"
        );
        return Ok(());
    }

    lwarn!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "migrations_pending",
        "Applying pending migrations",
        count = pending.len()
    );

    if let Err(e) = ::migration::Migrator::up(db, None).await {
        lerror!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "migration_failed",
            "Database migration failed",
            error = %e
        );
        return Err(e);
    }

    linfo!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "migrations_applied",
        "Database migrations applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity::key_rotation_state;
    use sea_orm::{EntityTrait, PaginatorTrait};

    #[tokio::test]
    async fn test_file_database_is_created_and_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            ..DatabaseConfig::default()
        };

        let db = init_database(&config).await.unwrap();
        run_migrations(&db).await.unwrap();
        // 第二次迁移不做任何事
        run_migrations(&db).await.unwrap();

        assert!(path.exists());
        let rows = key_rotation_state::Entity::find().count(&db).await.unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        };
        let db = init_database(&config).await.unwrap();
        run_migrations(&db).await.unwrap();
        assert!(::migration::Migrator::get_pending_migrations(&db)
            .await
            .unwrap()
            .is_empty());
    }
}
