//! 错误类型定义
//!
//! 自动缓存层的统一错误类型。缓存本身是尽力而为的，
//! 这里的错误只会出现在启动期（配置、元数据校验）或显式的管理接口上，
//! 读写路径内部的存储故障会被吸收并记录日志。

use thiserror::Error;

/// 自动缓存错误类型
#[derive(Error, Debug)]
pub enum AutoCacheError {
    /// 缓存存储操作失败
    #[error("缓存操作失败: {message}")]
    CacheError { message: String },

    /// 配置错误
    #[error("配置错误: {message}")]
    ConfigError { message: String },

    /// 元数据/参数校验失败
    #[error("校验失败: {field} - {message}")]
    ValidationError { field: String, message: String },

    /// 序列化失败
    #[error("序列化失败: {message}")]
    SerializationError { message: String },

    /// SQL 改写失败
    #[error("SQL改写失败: {message}")]
    RewriteError { message: String },

    /// 主键反查等查询失败
    #[error("查询执行失败: {message}")]
    QueryError { message: String },

    /// 后台失效任务调度失败
    #[error("后台任务失败: {message}")]
    WorkerError { message: String },

    /// IO 错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 自动缓存结果类型
pub type AutoCacheResult<T> = Result<T, AutoCacheError>;

impl From<serde_json::Error> for AutoCacheError {
    fn from(e: serde_json::Error) -> Self {
        AutoCacheError::SerializationError {
            message: e.to_string(),
        }
    }
}

/// 快速构造错误的宏
///
/// ```ignore
/// autocache_error!(config, "至少需要一个实体");
/// autocache_error!(validation, "uniqueIndex", "返回类型不匹配");
/// ```
#[macro_export]
macro_rules! autocache_error {
    (cache, $msg:expr) => {
        $crate::error::AutoCacheError::CacheError {
            message: $msg.to_string(),
        }
    };
    (config, $msg:expr) => {
        $crate::error::AutoCacheError::ConfigError {
            message: $msg.to_string(),
        }
    };
    (validation, $field:expr, $msg:expr) => {
        $crate::error::AutoCacheError::ValidationError {
            field: $field.to_string(),
            message: $msg.to_string(),
        }
    };
    (serialization, $msg:expr) => {
        $crate::error::AutoCacheError::SerializationError {
            message: $msg.to_string(),
        }
    };
    (rewrite, $msg:expr) => {
        $crate::error::AutoCacheError::RewriteError {
            message: $msg.to_string(),
        }
    };
    (query, $msg:expr) => {
        $crate::error::AutoCacheError::QueryError {
            message: $msg.to_string(),
        }
    };
    (worker, $msg:expr) => {
        $crate::error::AutoCacheError::WorkerError {
            message: $msg.to_string(),
        }
    };
}
