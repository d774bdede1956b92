//! 数据访问适配器模块
//!
//! 定义真实数据访问层的统一接口，并提供带自动缓存的包装执行器

use crate::error::AutoCacheResult;
use crate::interceptor::Invocation;
use crate::types::DataValue;
use async_trait::async_trait;

mod cached;

pub use cached::CachedExecutor;

/// 数据访问trait，由真实的关系型数据访问层实现
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// 执行查询，返回结果行
    async fn query(&self, invocation: &Invocation) -> AutoCacheResult<Vec<DataValue>>;

    /// 执行变更，返回影响行数
    async fn execute(&self, invocation: &Invocation) -> AutoCacheResult<u64>;
}
