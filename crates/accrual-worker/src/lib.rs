//! 订单对账 Worker
//!
//! 积分订单的后台对账子系统。调度循环周期性领取 NEW 订单并回收滞留的
//! PROCESSING 订单，经有界工作队列分发给固定数量的工作协程，协程向外部
//! 积分服务查询计分结果并把终态与余额入账写回订单存储。
//!
//! - `processor`: 调度循环、工作队列与停机排空
//! - `worker`: 工作协程与单订单解析
//! - `client`: 积分服务 HTTP 客户端
//! - `store`: 订单存储契约与 PostgreSQL 实现
//! - `error`: 错误类型

pub mod client;
pub mod error;
pub mod processor;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
