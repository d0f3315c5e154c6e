//! 订单存储
//!
//! 对账子系统依赖的订单存储契约及其 PostgreSQL 实现。
//! 领取必须原子（多实例部署时同一订单只被一个调度循环拿到），
//! 终态写入必须幂等（滞留回收可能让同一订单被处理两次）。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::error::AccrualError;

// ==================== 数据模型 ====================

/// 订单在本系统中的生命周期状态
///
/// NEW -> PROCESSING -> INVALID | PROCESSED，只进不退。
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Processing => "PROCESSING",
            Self::Invalid => "INVALID",
            Self::Processed => "PROCESSED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 订单行
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Order {
    pub order_number: String,
    pub status: OrderStatus,
    pub accrual: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
    pub last_changed_at: DateTime<Utc>,
    pub user_login: String,
}

// ==================== 存储契约 ====================

/// 订单存储接口
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 原子领取：把所有 NEW 订单置为 PROCESSING 并刷新变更时间，
    /// 返回本次领取的订单号。
    async fn claim_new_orders(&self) -> Result<Vec<String>, AccrualError>;

    /// 查询滞留订单：PROCESSING 且变更时间早于 `threshold` 之前的订单号。
    /// 只读查询，不改状态，调用方负责重新入队。
    async fn find_stale_processing(&self, threshold: Duration) -> Result<Vec<String>, AccrualError>;

    /// 计分完成：写入终态与积分值，并在同一事务中入账用户余额。
    /// 仅当订单当前仍为 PROCESSING 时生效，否则静默跳过（幂等）。
    async fn finalize_scored(
        &self,
        order_number: &str,
        status: OrderStatus,
        points: f64,
    ) -> Result<(), AccrualError>;

    /// 订单不参与计分：置为 INVALID。
    /// 仅当订单当前仍为 PROCESSING 时生效，否则静默跳过（幂等）。
    async fn mark_invalid(&self, order_number: &str) -> Result<(), AccrualError>;
}

// ==================== PostgreSQL 实现 ====================

/// 基于 PostgreSQL 的订单存储
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn claim_new_orders(&self) -> Result<Vec<String>, AccrualError> {
        // 单条语句完成筛选与改写，并发实例各自领到互斥的子集
        let claimed: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET status = 'PROCESSING', last_changed_at = NOW()
            WHERE status = 'NEW'
            RETURNING order_number
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(claimed)
    }

    async fn find_stale_processing(&self, threshold: Duration) -> Result<Vec<String>, AccrualError> {
        let cutoff = Utc::now() - chrono::Duration::milliseconds(threshold.as_millis() as i64);

        let stale: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT order_number
            FROM orders
            WHERE status = 'PROCESSING' AND last_changed_at < $1
            ORDER BY last_changed_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(stale)
    }

    async fn finalize_scored(
        &self,
        order_number: &str,
        status: OrderStatus,
        points: f64,
    ) -> Result<(), AccrualError> {
        let mut tx = self.pool.begin().await?;

        // 状态守卫：只有仍处于 PROCESSING 的订单才接受本次提交。
        // 滞留回收可能让两个协程先后提交同一订单，守卫保证余额只入账一次。
        let winner: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET status = $1, accrual = $2, last_changed_at = NOW()
            WHERE order_number = $3 AND status = 'PROCESSING'
            RETURNING user_login
            "#,
        )
        .bind(status)
        .bind(points)
        .bind(order_number)
        .fetch_optional(&mut *tx)
        .await?;

        match winner {
            Some(login) => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET current_balance = current_balance + $1
                    WHERE login = $2
                    "#,
                )
                .bind(points)
                .bind(&login)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                info!(order_number, %status, points, user = %login, "订单计分入账完成");
            }
            None => {
                tx.rollback().await?;
                info!(order_number, "订单已非 PROCESSING，跳过重复终态提交");
            }
        }

        Ok(())
    }

    async fn mark_invalid(&self, order_number: &str) -> Result<(), AccrualError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'INVALID', last_changed_at = NOW()
            WHERE order_number = $1 AND status = 'PROCESSING'
            "#,
        )
        .bind(order_number)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            info!(order_number, "订单已非 PROCESSING，跳过置为 INVALID");
        } else {
            info!(order_number, "订单不参与计分，已置为 INVALID");
        }

        Ok(())
    }
}

// ==================== 测试 ====================
