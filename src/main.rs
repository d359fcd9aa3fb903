mod api;
mod config;
mod entity;
mod host;
mod migration;
mod store;
mod sub;
mod traffic;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{ensure, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::migration::{init_sqlite, open_readonly};
use crate::store::DbStore;
use crate::sub::{SubJsonService, SubService};

#[derive(Parser)]
#[command(name = "subserver", version, about = "订阅服务 - 为面板入站客户端生成订阅链接")]
struct Cli {
    /// 配置文件路径（默认在程序目录和当前目录查找 subserver.toml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 日志目录，指定后按天轮转写入文件
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// 创建数据库并补齐缺失的表后退出
    #[arg(long)]
    init_db: bool,
}

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sub_service: SubService,
    pub sub_json_service: SubJsonService,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_dir.as_deref());

    // 读取配置
    let config = Arc::new(Config::load(cli.config.as_deref())?);
    ensure!(
        api::route_path(&config.sub_path) != api::route_path(&config.sub_json_path),
        "sub_path 与 sub_json_path 不能相同"
    );
    info!("📋 subserver 启动");
    info!("🌐 订阅端口: {}", config.web_port);
    info!("🔗 链接订阅路径: {}，JSON 订阅路径: {}", config.sub_path, config.sub_json_path);

    if cli.init_db {
        init_sqlite(&config.db_path).await?;
        info!("✅ 数据库初始化完成: {}", config.db_path);
        return Ok(());
    }

    // 面板数据库只读
    let db = open_readonly(&config.db_path).await?;
    info!("✅ 已打开数据库（只读）: {}", config.db_path);

    let store = Arc::new(DbStore::new(db));
    let sub_service = SubService::new(Arc::new(config.sub_settings()), store.clone(), store);
    let sub_json_service = SubJsonService::new(sub_service.clone());

    let app_state = AppState {
        config,
        sub_service,
        sub_json_service,
    };

    let web_handle = api::start_web_server(app_state);

    info!("✅ 所有服务已启动，等待终止信号...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C 信号，正在关闭服务...");
        }
        _ = wait_sigterm() => {
            info!("收到 SIGTERM 信号，正在关闭服务...");
        }
        _ = web_handle => {
            warn!("订阅服务已退出");
        }
    }

    Ok(())
}

/// 初始化 tracing 日志系统
fn init_tracing(log_dir: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx::query=warn"));

    // 指定目录时按天轮转文件日志，否则输出到控制台
    if let Some(dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, "subserver.log");
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(file_appender).with_ansi(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

async fn wait_sigterm() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
