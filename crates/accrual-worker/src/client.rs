//! 积分服务客户端
//!
//! 封装对外部积分服务的只读查询 `GET {base_url}/api/orders/{order_number}`。
//! 通过 `AccrualService` trait 抽象，测试时可注入脚本化实现。

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AccrualError;

// ==================== 响应模型 ====================

/// 积分服务报告的订单计分状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    /// 订单已登记，计分尚未开始
    Registered,
    /// 计分进行中
    Processing,
    /// 订单不参与计分
    Invalid,
    /// 计分完成，响应中携带积分值
    Processed,
}

/// 积分服务的查询响应
#[derive(Debug, Clone, Deserialize)]
pub struct AccrualReply {
    pub order: String,
    pub status: AccrualStatus,
    /// 仅在 status 为 PROCESSED 时有值
    pub accrual: Option<f64>,
}

// ==================== 服务抽象 ====================

/// 积分服务查询接口
///
/// 单次查询，不含重试。重查节奏由调用方掌握。
#[async_trait]
pub trait AccrualService: Send + Sync {
    async fn fetch_order(&self, order_number: &str) -> Result<AccrualReply, AccrualError>;
}

// ==================== HTTP 实现 ====================

/// 基于 reqwest 的积分服务客户端
pub struct AccrualClient {
    http: reqwest::Client,
    base_url: String,
}

impl AccrualClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn order_url(&self, order_number: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, order_number)
    }
}

#[async_trait]
impl AccrualService for AccrualClient {
    async fn fetch_order(&self, order_number: &str) -> Result<AccrualReply, AccrualError> {
        let url = self.order_url(order_number);
        debug!(order_number, url = %url, "查询积分服务");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AccrualError::Transport(e.to_string()))?;

        // 接口约定只有 200 携带计分结果，其余状态码一律按协议错误处理
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(
                order_number,
                status = status.as_u16(),
                "积分服务返回非预期状态码"
            );
            return Err(AccrualError::Protocol {
                status: status.as_u16(),
            });
        }

        response
            .json::<AccrualReply>()
            .await
            .map_err(|e| AccrualError::Decode(e.to_string()))
    }
}

// ==================== 测试 ====================
