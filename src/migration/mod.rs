use anyhow::Context;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::prelude::*;
use std::fs;
use std::path::Path;

mod m20250301_000001_init;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250301_000001_init::Migration)]
    }
}

/// 以只读方式打开面板数据库，文件不存在时报错
pub async fn open_readonly(db_path: &str) -> anyhow::Result<DatabaseConnection> {
    let path = Path::new(db_path);
    anyhow::ensure!(path.is_file(), "数据库文件不存在: {}", path.display());

    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=ro", db_path));
    options.sqlx_logging(false);

    Database::connect(options)
        .await
        .with_context(|| format!("连接数据库失败: {}", db_path))
}

/// 创建数据库文件并补齐缺失的表（仅 `--init-db` 使用）
pub async fn init_sqlite(db_path: &str) -> anyhow::Result<DatabaseConnection> {
    let path = Path::new(db_path);
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("无法创建数据库目录: {}", parent.display()))?;
        }
        fs::write(path, "").with_context(|| format!("无法创建数据库文件: {}", path.display()))?;
    }

    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", db_path));
    options.sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .with_context(|| format!("连接数据库失败: {}", db_path))?;
    Migrator::up(&db, None).await.context("数据库迁移失败")?;
    Ok(db)
}

/// 内存数据库（测试用）
#[cfg(test)]
pub async fn init_memory() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}
