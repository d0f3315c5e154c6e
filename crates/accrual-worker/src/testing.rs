//! 测试替身
//!
//! 手写的内存订单存储与脚本化积分服务，供本 crate 的单元测试使用。
//! 内存存储实现与 PostgreSQL 实现相同的原子领取和幂等终态语义，
//! 这样流程级测试不依赖数据库也能覆盖并发正确性。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use loyalty_shared::error::LoyaltyError;

use crate::client::{AccrualReply, AccrualService, AccrualStatus};
use crate::error::AccrualError;
use crate::store::{OrderStatus, OrderStore};

// ==================== 内存订单存储 ====================

struct OrderRecord {
    status: OrderStatus,
    accrual: Option<f64>,
    user_login: String,
    last_changed_at: DateTime<Utc>,
}

/// 内存订单存储
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<String, OrderRecord>>,
    balances: Mutex<HashMap<String, f64>>,
    fail_writes: AtomicBool,
    claim_calls: AtomicU32,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
            claim_calls: AtomicU32::new(0),
        }
    }

    /// 录入一条 NEW 订单
    pub async fn insert_new(&self, order_number: &str, user_login: &str) {
        self.orders.lock().await.insert(
            order_number.to_string(),
            OrderRecord {
                status: OrderStatus::New,
                accrual: None,
                user_login: user_login.to_string(),
                last_changed_at: Utc::now(),
            },
        );
    }

    /// 录入一条已处于 PROCESSING 的订单（模拟已被领取）
    pub async fn insert_processing(&self, order_number: &str, user_login: &str) {
        self.insert_new(order_number, user_login).await;
        if let Some(record) = self.orders.lock().await.get_mut(order_number) {
            record.status = OrderStatus::Processing;
        }
    }

    /// 回拨订单的变更时间，用于构造滞留场景
    pub async fn set_last_changed(&self, order_number: &str, at: DateTime<Utc>) {
        if let Some(record) = self.orders.lock().await.get_mut(order_number) {
            record.last_changed_at = at;
        }
    }

    /// 让后续的终态写入全部失败
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn status_of(&self, order_number: &str) -> Option<OrderStatus> {
        self.orders.lock().await.get(order_number).map(|r| r.status)
    }

    pub async fn accrual_of(&self, order_number: &str) -> Option<f64> {
        self.orders
            .lock()
            .await
            .get(order_number)
            .and_then(|r| r.accrual)
    }

    pub async fn balance_of(&self, login: &str) -> f64 {
        self.balances.lock().await.get(login).copied().unwrap_or(0.0)
    }

    pub fn claim_calls(&self) -> u32 {
        self.claim_calls.load(Ordering::SeqCst)
    }

    fn write_error() -> AccrualError {
        AccrualError::Shared(LoyaltyError::Internal("simulated write failure".to_string()))
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn claim_new_orders(&self) -> Result<Vec<String>, AccrualError> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);

        let mut orders = self.orders.lock().await;
        let mut claimed = Vec::new();
        for (number, record) in orders.iter_mut() {
            if record.status == OrderStatus::New {
                record.status = OrderStatus::Processing;
                record.last_changed_at = Utc::now();
                claimed.push(number.clone());
            }
        }
        claimed.sort();
        Ok(claimed)
    }

    async fn find_stale_processing(&self, threshold: Duration) -> Result<Vec<String>, AccrualError> {
        let cutoff = Utc::now() - chrono::Duration::milliseconds(threshold.as_millis() as i64);

        let orders = self.orders.lock().await;
        let mut stale: Vec<String> = orders
            .iter()
            .filter(|(_, r)| r.status == OrderStatus::Processing && r.last_changed_at < cutoff)
            .map(|(number, _)| number.clone())
            .collect();
        stale.sort();
        Ok(stale)
    }

    async fn finalize_scored(
        &self,
        order_number: &str,
        status: OrderStatus,
        points: f64,
    ) -> Result<(), AccrualError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::write_error());
        }

        let mut orders = self.orders.lock().await;
        let Some(record) = orders.get_mut(order_number) else {
            return Ok(());
        };
        // 与 PostgreSQL 实现相同的状态守卫
        if record.status != OrderStatus::Processing {
            return Ok(());
        }

        record.status = status;
        record.accrual = Some(points);
        record.last_changed_at = Utc::now();

        let mut balances = self.balances.lock().await;
        *balances.entry(record.user_login.clone()).or_insert(0.0) += points;
        Ok(())
    }

    async fn mark_invalid(&self, order_number: &str) -> Result<(), AccrualError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::write_error());
        }

        let mut orders = self.orders.lock().await;
        let Some(record) = orders.get_mut(order_number) else {
            return Ok(());
        };
        if record.status != OrderStatus::Processing {
            return Ok(());
        }

        record.status = OrderStatus::Invalid;
        record.last_changed_at = Utc::now();
        Ok(())
    }
}

// ==================== 脚本化积分服务 ====================

/// 固定应答的积分服务
pub struct FixedAccrual {
    status: AccrualStatus,
    accrual: Option<f64>,
    calls: AtomicU32,
}

impl FixedAccrual {
    pub fn new(status: AccrualStatus, accrual: Option<f64>) -> Self {
        Self {
            status,
            accrual,
            calls: AtomicU32::new(0),
        }
    }

    /// 累计被查询的次数
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccrualService for FixedAccrual {
    async fn fetch_order(&self, order_number: &str) -> Result<AccrualReply, AccrualError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AccrualReply {
            order: order_number.to_string(),
            status: self.status,
            accrual: self.accrual,
        })
    }
}

/// 始终查询失败的积分服务
pub struct FailingAccrual {
    calls: AtomicU32,
}

impl FailingAccrual {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccrualService for FailingAccrual {
    async fn fetch_order(&self, _order_number: &str) -> Result<AccrualReply, AccrualError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AccrualError::Transport("connection refused".to_string()))
    }
}

/// 前若干次返回 PROCESSING，之后出分的积分服务
pub struct EventualAccrual {
    pending_replies: u32,
    points: f64,
    calls: AtomicU32,
}

impl EventualAccrual {
    pub fn new(pending_replies: u32, points: f64) -> Self {
        Self {
            pending_replies,
            points,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccrualService for EventualAccrual {
    async fn fetch_order(&self, order_number: &str) -> Result<AccrualReply, AccrualError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.pending_replies {
            Ok(AccrualReply {
                order: order_number.to_string(),
                status: AccrualStatus::Processing,
                accrual: None,
            })
        } else {
            Ok(AccrualReply {
                order: order_number.to_string(),
                status: AccrualStatus::Processed,
                accrual: Some(self.points),
            })
        }
    }
}
