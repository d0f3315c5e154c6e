//! Mock 积分服务路由
//!
//! 对外提供与真实积分服务一致的查询接口，外加测试用的登记接口。

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::{info, warn};

use crate::state::{AccrualServiceState, ScoredOrder};

/// 构建积分服务路由
pub fn accrual_routes() -> Router<Arc<AccrualServiceState>> {
    Router::new()
        .route("/api/orders/{order_number}", get(get_order_score))
        .route("/api/orders", post(register_order))
}

/// 查询订单计分结果
///
/// GET /api/orders/:order_number
/// 未登记的订单返回 204，与真实积分服务的行为一致。
async fn get_order_score(
    State(state): State<Arc<AccrualServiceState>>,
    Path(order_number): Path<String>,
) -> Result<Json<ScoredOrder>, StatusCode> {
    state
        .get(&order_number)
        .map(|record| {
            info!(order_number = %record.order, status = ?record.status, "返回计分结果");
            Json(record)
        })
        .ok_or_else(|| {
            warn!(%order_number, "订单未登记");
            StatusCode::NO_CONTENT
        })
}

/// 登记一条计分结果
///
/// POST /api/orders
async fn register_order(
    State(state): State<Arc<AccrualServiceState>>,
    Json(record): Json<ScoredOrder>,
) -> StatusCode {
    info!(order_number = %record.order, status = ?record.status, "登记计分结果");
    state.upsert(record);
    StatusCode::ACCEPTED
}

// ==================== 测试 ====================
