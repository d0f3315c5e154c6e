//! Mock 积分服务
//!
//! 外部积分服务的本地替身，供开发和集成测试使用。
//! 提供与真实服务一致的查询接口，计分结果可以在启动时随机预填充，
//! 也可以在运行期通过登记接口写入。

pub mod routes;
pub mod state;
