//! 订单对账 Worker 入口
//!
//! 装配配置、可观测性、数据库与处理器，运行至收到停机信号。

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use loyalty_shared::config::AppConfig;
use loyalty_shared::database::Database;
use loyalty_shared::observability;

use accrual_worker::client::AccrualClient;
use accrual_worker::processor::OrderProcessor;
use accrual_worker::store::PgOrderStore;

const SERVICE_NAME: &str = "accrual-worker";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    // 2. 初始化可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(SERVICE_NAME);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting accrual worker...");
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 连接数据库
    info!("Connecting to database...");
    let db = Database::connect(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }
    info!("Database connection established");

    // 4. 装配处理器
    let store = Arc::new(PgOrderStore::new(db.pool().clone()));
    let accrual = Arc::new(AccrualClient::new(&config.accrual.base_url));
    let processor = OrderProcessor::new(&config.processor, store, accrual);

    // 5. 停机信号转发
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // 6. 运行至停机并排空队列
    processor.run(shutdown_rx).await?;

    db.close().await;
    info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
