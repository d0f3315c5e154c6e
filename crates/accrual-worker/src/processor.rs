//! 订单对账处理器
//!
//! 子系统的组装点：固定间隔的调度循环领取 NEW 订单、回收滞留的
//! PROCESSING 订单，经由有界工作队列分发给固定数量的工作协程。
//! 队列满时入队阻塞，调度循环随之放慢，形成对上游的背压而不丢任务。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use loyalty_shared::config::ProcessorConfig;
use loyalty_shared::observability::metrics;

use crate::client::AccrualService;
use crate::error::AccrualError;
use crate::store::OrderStore;
use crate::worker::{worker_loop, WorkerContext};

/// 订单对账处理器
pub struct OrderProcessor {
    store: Arc<dyn OrderStore>,
    accrual: Arc<dyn AccrualService>,
    poll_interval: Duration,
    stale_after: Duration,
    retry_count: u32,
    retry_backoff: Duration,
    worker_count: usize,
    queue_capacity: usize,
}

impl OrderProcessor {
    pub fn new(
        config: &ProcessorConfig,
        store: Arc<dyn OrderStore>,
        accrual: Arc<dyn AccrualService>,
    ) -> Self {
        Self {
            store,
            accrual,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            stale_after: Duration::from_secs(config.stale_after_seconds),
            retry_count: config.retry_count,
            retry_backoff: Duration::from_secs(config.retry_backoff_seconds),
            // mpsc 不接受零容量，协程数为零则整个子系统空转
            worker_count: config.worker_count.max(1),
            queue_capacity: config.queue_capacity.max(1),
        }
    }

    /// 运行处理器直至收到停机信号
    ///
    /// 停机顺序：停止调度、关闭队列、等工作协程取空队列后返回。
    /// 已入队的订单都会被处理完，不会半途丢弃。
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), AccrualError> {
        info!(
            poll_interval = ?self.poll_interval,
            worker_count = self.worker_count,
            queue_capacity = self.queue_capacity,
            stale_after = ?self.stale_after,
            "订单对账处理器已启动"
        );

        let (tx, rx) = mpsc::channel::<String>(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let ctx = Arc::new(WorkerContext {
            store: self.store.clone(),
            accrual: self.accrual.clone(),
            retry_count: self.retry_count,
            retry_backoff: self.retry_backoff,
        });

        let mut workers = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            workers.push(tokio::spawn(worker_loop(worker_id, ctx.clone(), rx.clone())));
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        // 背压可能让单轮调度超过一个间隔，错过的 tick 顺延而不是突发补齐
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("收到停机信号，调度循环停止");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.dispatch_cycle(&tx).await;
                    metrics::set_worker_last_run("dispatch_loop");
                    metrics::set_queue_depth((self.queue_capacity - tx.capacity()) as f64);
                }
            }
        }

        // 丢弃发送端即关闭队列，工作协程取空后得到 None 退出
        drop(tx);

        info!("等待工作协程处理完队内剩余订单");
        for (worker_id, handle) in workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker_id, error = %e, "工作协程异常退出");
            }
        }

        info!("订单对账处理器已停止");
        Ok(())
    }

    /// 单轮调度：领取 NEW 订单，回收滞留的 PROCESSING 订单，统一入队
    ///
    /// 存储故障只影响当轮，记日志后等下一轮重试。
    /// 队列满时 `send` 阻塞，这是有意的准入控制，不丢弃任何订单号。
    async fn dispatch_cycle(&self, tx: &mpsc::Sender<String>) {
        match self.store.claim_new_orders().await {
            Ok(claimed) => {
                if !claimed.is_empty() {
                    info!(count = claimed.len(), "领取到新订单");
                    metrics::record_orders_claimed(claimed.len() as u64);
                }
                for order_number in claimed {
                    if tx.send(order_number).await.is_err() {
                        warn!("工作队列已关闭，放弃本轮剩余任务");
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "领取新订单失败，下一轮重试");
                metrics::record_dispatch_error("claim");
            }
        }

        match self.store.find_stale_processing(self.stale_after).await {
            Ok(stale) => {
                if !stale.is_empty() {
                    warn!(
                        count = stale.len(),
                        threshold = ?self.stale_after,
                        "发现滞留订单，重新入队"
                    );
                    metrics::record_orders_reclaimed(stale.len() as u64);
                }
                for order_number in stale {
                    if tx.send(order_number).await.is_err() {
                        warn!("工作队列已关闭，放弃本轮剩余任务");
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "查询滞留订单失败，下一轮重试");
                metrics::record_dispatch_error("stale");
            }
        }
    }
}

// ==================== 测试 ====================
