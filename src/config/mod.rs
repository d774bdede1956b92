//! # 配置管理模块
//!
//! 提供统一的配置管理系统，支持构建器模式和链式配置

pub mod builders;
pub mod core;

// 重新导出所有公共类型以保持API兼容性
pub use builders::AutoCacheConfigBuilder;
pub use core::{AutoCacheConfig, IN_1HOUR, IN_1MINS, PredicateCapture};
