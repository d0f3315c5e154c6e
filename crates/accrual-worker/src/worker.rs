//! 订单解析工作协程
//!
//! 从共享工作队列取出订单号，查询积分服务，按结果提交终态：
//! PROCESSED 入账、INVALID 置终态、未出分或查询失败则放弃本次，
//! 订单保持 PROCESSING，由调度循环的滞留回收兜底重新入队。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use loyalty_shared::observability::metrics;

use crate::client::{AccrualService, AccrualStatus};
use crate::store::{OrderStatus, OrderStore};

/// 工作协程共享的依赖与重查参数
pub struct WorkerContext {
    pub store: Arc<dyn OrderStore>,
    pub accrual: Arc<dyn AccrualService>,
    /// 积分服务未出分时的追加查询次数上限
    pub retry_count: u32,
    /// 追加查询之间的固定等待
    pub retry_backoff: Duration,
}

/// 单个订单的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    /// 已写入 PROCESSED 终态并入账
    Finalized,
    /// 已写入 INVALID 终态
    Invalid,
    /// 本次放弃，订单保持 PROCESSING 等待滞留回收
    Deferred(DeferReason),
}

/// 放弃原因，用于日志与指标口径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// 查询积分服务失败（网络或协议层）
    Fetch,
    /// 重查预算耗尽时积分服务仍未出分
    NotReady,
    /// 终态写入失败
    Store,
}

/// 工作协程主循环
///
/// 多个协程共享同一个接收端，队列关闭且取空后各自退出。
/// 锁只覆盖取元素本身，订单处理期间其他协程可以继续消费队列。
pub async fn worker_loop(
    worker_id: usize,
    ctx: Arc<WorkerContext>,
    queue: Arc<Mutex<mpsc::Receiver<String>>>,
) {
    info!(worker_id, "订单处理协程已启动");

    loop {
        let next = { queue.lock().await.recv().await };
        let Some(order_number) = next else {
            break;
        };

        let started = Instant::now();
        let outcome = resolve_order(&ctx, &order_number).await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            OrderOutcome::Finalized => metrics::record_order_finalized("processed", elapsed),
            OrderOutcome::Invalid => metrics::record_order_finalized("invalid", elapsed),
            OrderOutcome::Deferred(_) => metrics::record_order_finalized("deferred", elapsed),
        }
    }

    info!(worker_id, "订单处理协程已退出");
}

/// 解析单个订单：查询积分服务、按需重查、提交终态
///
/// 拆分为独立函数而非方法，便于在测试中直接调用而无需搭建完整队列。
/// 自身不返回错误，失败都记日志并转化为 [`OrderOutcome::Deferred`]。
pub async fn resolve_order(ctx: &WorkerContext, order_number: &str) -> OrderOutcome {
    let mut attempt: u32 = 0;

    loop {
        let reply = match ctx.accrual.fetch_order(order_number).await {
            Ok(reply) => reply,
            Err(e) => {
                // 依赖不可用时不做本地重试，避免对故障服务持续施压
                warn!(order_number, error = %e, "查询积分服务失败，放弃本次处理");
                metrics::record_accrual_query(e.outcome_label());
                return OrderOutcome::Deferred(DeferReason::Fetch);
            }
        };

        match reply.status {
            AccrualStatus::Registered | AccrualStatus::Processing => {
                metrics::record_accrual_query("pending");
                if attempt >= ctx.retry_count {
                    debug!(
                        order_number,
                        attempts = attempt + 1,
                        "重查预算耗尽，积分服务仍未出分"
                    );
                    return OrderOutcome::Deferred(DeferReason::NotReady);
                }
                attempt += 1;
                debug!(order_number, attempt, "积分服务未出分，等待后重查");
                tokio::time::sleep(ctx.retry_backoff).await;
            }
            AccrualStatus::Invalid => {
                metrics::record_accrual_query("invalid");
                if let Err(e) = ctx.store.mark_invalid(order_number).await {
                    error!(order_number, error = %e, "INVALID 终态写入失败");
                    return OrderOutcome::Deferred(DeferReason::Store);
                }
                return OrderOutcome::Invalid;
            }
            AccrualStatus::Processed => {
                metrics::record_accrual_query("processed");
                let points = reply.accrual.unwrap_or(0.0);
                if let Err(e) = ctx
                    .store
                    .finalize_scored(order_number, OrderStatus::Processed, points)
                    .await
                {
                    error!(order_number, error = %e, "计分终态写入失败");
                    return OrderOutcome::Deferred(DeferReason::Store);
                }
                metrics::record_points_credited(points);
                info!(order_number, points, "订单计分完成");
                return OrderOutcome::Finalized;
            }
        }
    }
}

// ==================== 测试 ====================
