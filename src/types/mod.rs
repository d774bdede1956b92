//! 通用类型定义
//!
//! 数据值、调用形态等跨模块共享的类型

pub mod data_value;
pub mod invocation;

// 重新导出所有公共类型以保持API兼容性
pub use data_value::DataValue;
pub use invocation::{BoundSql, CallContext, CallParameter, ExecutionResult, SqlCommandType};
