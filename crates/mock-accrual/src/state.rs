//! Mock 积分服务状态
//!
//! 使用 DashMap 存放已登记订单的计分结果，支持并发读写。

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use loyalty_shared::test_utils::luhn_check_digit;

/// 订单的计分状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScoreStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

/// 一条计分结果
///
/// 同时充当存储记录和查询响应体，accrual 缺省时不出现在 JSON 中。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredOrder {
    pub order: String,
    pub status: ScoreStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
}

/// Mock 积分服务共享状态
pub struct AccrualServiceState {
    orders: DashMap<String, ScoredOrder>,
}

impl AccrualServiceState {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
        }
    }

    /// 登记或覆盖一条计分结果
    pub fn upsert(&self, record: ScoredOrder) {
        self.orders.insert(record.order.clone(), record);
    }

    /// 查询计分结果，返回克隆不持有锁
    pub fn get(&self, order_number: &str) -> Option<ScoredOrder> {
        self.orders.get(order_number).map(|r| r.clone())
    }

    pub fn count(&self) -> usize {
        self.orders.len()
    }

    /// 预填充随机计分结果
    ///
    /// 订单号按 Luhn 规则生成，四种状态均匀分布，
    /// PROCESSED 的订单携带 0.1 到 1000.0 之间的积分值。
    pub fn populate(&self, count: usize) {
        let mut rng = rand::rng();
        for _ in 0..count {
            let body: String = (0..9).map(|_| rng.random_range(0..=9).to_string()).collect();
            let order = format!("{}{}", body, luhn_check_digit(&body));

            let (status, accrual) = match rng.random_range(0..4) {
                0 => (ScoreStatus::Registered, None),
                1 => (ScoreStatus::Processing, None),
                2 => (ScoreStatus::Invalid, None),
                _ => (
                    ScoreStatus::Processed,
                    Some(rng.random_range(1..=10_000) as f64 / 10.0),
                ),
            };

            self.upsert(ScoredOrder {
                order,
                status,
                accrual,
            });
        }
    }
}

impl Default for AccrualServiceState {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== 测试 ====================
