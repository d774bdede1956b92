//! 带缓存的数据访问执行器
//!
//! 在真实调用前后驱动拦截器管线：命中缓存时跳过真实调用，
//! 无论成功失败都会执行收尾处理（释放锁、提交失效任务）

use super::DataAccess;
use crate::error::AutoCacheResult;
use crate::interceptor::{InterceptorPipeline, Invocation};
use crate::types::{DataValue, ExecutionResult};
use rat_logger::debug;
use std::sync::Arc;

/// 带缓存功能的数据访问包装器
pub struct CachedExecutor {
    /// 内部真实的数据访问层
    inner: Box<dyn DataAccess>,
    /// 拦截器管线
    pipeline: Arc<InterceptorPipeline>,
}

impl CachedExecutor {
    /// 创建新的缓存执行器
    pub fn new(inner: Box<dyn DataAccess>, pipeline: Arc<InterceptorPipeline>) -> Self {
        Self { inner, pipeline }
    }

    pub fn pipeline(&self) -> &Arc<InterceptorPipeline> {
        &self.pipeline
    }

    /// 执行查询 - 先检查缓存，未命中时查询数据库并回填
    pub async fn select(&self, mut invocation: Invocation) -> AutoCacheResult<Vec<DataValue>> {
        if let Some(rows) = self.pipeline.before(&mut invocation).await {
            debug!("缓存命中，跳过数据库查询: {}", invocation.operation_id);
            self.pipeline
                .after(&mut invocation, &ExecutionResult::Rows(rows.clone()))
                .await;
            return Ok(rows);
        }

        let outcome = self.inner.query(&invocation).await;
        let result = match &outcome {
            Ok(rows) => ExecutionResult::Rows(rows.clone()),
            Err(_) => ExecutionResult::Failed,
        };
        self.pipeline.after(&mut invocation, &result).await;
        outcome
    }

    /// 执行变更 - 成功后按影响范围清理缓存
    pub async fn mutate(&self, mut invocation: Invocation) -> AutoCacheResult<u64> {
        self.pipeline.before(&mut invocation).await;

        let outcome = self.inner.execute(&invocation).await;
        let result = match &outcome {
            Ok(affected) => ExecutionResult::Affected(*affected),
            Err(_) => ExecutionResult::Failed,
        };
        self.pipeline.after(&mut invocation, &result).await;
        outcome
    }
}

impl std::fmt::Debug for CachedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedExecutor")
            .field("inner", &"<DataAccess>")
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
