//! 订单对账 Worker 错误类型
//!
//! 查询积分服务的三类失败（网络、协议、解析）各自独立成枚举项，
//! 工作协程根据类别决定放弃还是提交终态。

use loyalty_shared::error::LoyaltyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccrualError {
    /// 积分服务网络不可达或连接中断
    #[error("积分服务请求失败: {0}")]
    Transport(String),

    /// 积分服务返回了约定之外的状态码
    #[error("积分服务返回异常状态码: {status}")]
    Protocol { status: u16 },

    /// 响应体不是约定的 JSON 结构
    #[error("积分服务响应解析失败: {0}")]
    Decode(String),

    #[error(transparent)]
    Shared(#[from] LoyaltyError),
}

impl From<sqlx::Error> for AccrualError {
    fn from(err: sqlx::Error) -> Self {
        Self::Shared(LoyaltyError::Database(err))
    }
}

impl AccrualError {
    /// 指标用的失败分类标签
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Protocol { .. } => "protocol_error",
            Self::Decode(_) => "decode_error",
            Self::Shared(_) => "store_error",
        }
    }
}

// ==================== 测试 ====================
