//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    // 构建 Prometheus recorder
    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    // 保存到全局，供其他地方获取指标快照
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    // 注册服务级别的指标描述
    register_common_metrics(&config.service_name);

    // 启动指标 HTTP 服务器
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标（预定义的业务指标）
fn register_common_metrics(service_name: &str) {
    // 使用 metrics crate 的宏来描述指标
    // 这些描述会出现在 /metrics 端点的 HELP 注释中

    metrics::describe_counter!(
        "orders_claimed_total",
        "Total number of NEW orders claimed for processing"
    );
    metrics::describe_counter!(
        "orders_reclaimed_total",
        "Total number of stale PROCESSING orders re-enqueued"
    );
    metrics::describe_counter!(
        "dispatch_errors_total",
        "Store fetch failures during dispatch, by stage"
    );
    metrics::describe_counter!(
        "accrual_queries_total",
        "Total number of accrual service queries"
    );
    metrics::describe_counter!(
        "orders_finalized_total",
        "Total number of order resolutions by outcome"
    );
    metrics::describe_histogram!(
        "order_resolution_duration_seconds",
        "End-to-end resolution time for one order"
    );
    metrics::describe_histogram!(
        "accrual_points_credited",
        "Points credited per finalized order"
    );
    metrics::describe_gauge!("work_queue_depth", "Items currently pending in the work queue");
    metrics::describe_gauge!(
        "worker_last_run_timestamp_seconds",
        "Unix timestamp of each worker's last completed cycle"
    );

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一轮调度中领取的新订单数
#[inline]
pub fn record_orders_claimed(count: u64) {
    metrics::counter!("orders_claimed_total").increment(count);
}

/// 记录一轮调度中重新入队的滞留订单数
#[inline]
pub fn record_orders_reclaimed(count: u64) {
    metrics::counter!("orders_reclaimed_total").increment(count);
}

/// 记录一次调度阶段的存储查询失败（stage 为 claim 或 stale）
#[inline]
pub fn record_dispatch_error(stage: &str) {
    metrics::counter!(
        "dispatch_errors_total",
        "stage" => stage.to_string()
    )
    .increment(1);
}

/// 记录一次积分服务查询及其结果
#[inline]
pub fn record_accrual_query(outcome: &str) {
    metrics::counter!(
        "accrual_queries_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录一次订单处理结束及耗时
#[inline]
pub fn record_order_finalized(outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "orders_finalized_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "order_resolution_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// 记录一笔积分入账
#[inline]
pub fn record_points_credited(points: f64) {
    metrics::histogram!("accrual_points_credited").record(points);
}

/// 更新工作队列当前深度
#[inline]
pub fn set_queue_depth(depth: f64) {
    metrics::gauge!("work_queue_depth").set(depth);
}

/// 记录 Worker 健康心跳（最近一次完整循环的时间戳）
#[inline]
pub fn set_worker_last_run(worker: &str) {
    metrics::gauge!(
        "worker_last_run_timestamp_seconds",
        "worker" => worker.to_string()
    )
    .set(chrono::Utc::now().timestamp() as f64);
}
