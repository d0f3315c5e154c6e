//! Mock 积分服务入口
//!
//! 启动 HTTP 服务器模拟外部积分服务，供 accrual-worker 本地联调使用。

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use mock_accrual::routes::accrual_routes;
use mock_accrual::state::AccrualServiceState;

/// Mock 积分服务命令行工具
#[derive(Parser, Debug)]
#[command(name = "mock-accrual")]
#[command(version, about = "积分服务模拟器")]
struct Cli {
    /// 服务端口
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// 启动时预填充随机计分结果
    #[arg(long)]
    populate: bool,

    /// 预填充数量
    #[arg(long, default_value = "50")]
    order_count: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 优先使用环境变量 RUST_LOG，否则使用命令行参数指定的级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    let state = Arc::new(AccrualServiceState::new());

    if cli.populate {
        state.populate(cli.order_count);
        info!(count = state.count(), "预填充计分结果完成");
    }

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(accrual_routes().with_state(state))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(addr).await.context("绑定端口失败")?;

    info!("Mock 积分服务已启动: http://{}", addr);
    info!("可用端点:");
    info!("  GET  /health - 健康检查");
    info!("  GET  /api/orders/{{order_number}} - 查询计分结果");
    info!("  POST /api/orders - 登记计分结果");
    info!("按 Ctrl+C 停止服务");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务器运行失败")?;

    info!("Mock 积分服务已停止");
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("Shutdown signal received");
}

// ==================== 测试 ====================
