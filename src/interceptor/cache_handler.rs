//! 自动缓存处理器
//!
//! 查询走读路径（探测、加锁、回填），变更规划失效任务并交给后台工作池

use super::{HandlerOrder, InterceptorHandler, Invocation};
use crate::cache::{
    CacheManager, CacheStats, CacheStore, InvalidationExecutor, MemoryCacheStore, ReadOutcome,
};
use crate::config::{AutoCacheConfig, PredicateCapture};
use crate::error::AutoCacheResult;
use crate::metadata::{EntitySchema, OperationRegistry};
use crate::rewrite::{IdentifierQuery, PredicateResolver, PredicateRewriter, SimpleSqlRewriter};
use crate::types::{DataValue, ExecutionResult, SqlCommandType};
use crate::worker::{InvalidationWorkerPool, TaskEnvelope};
use async_trait::async_trait;
use rat_logger::{debug, info, warn};
use std::sync::Arc;

/// 自动缓存处理器的顺序
pub const CACHE_HANDLER_ORDER: HandlerOrder = HandlerOrder(1);

/// 自动缓存处理器
pub struct AutoCacheHandler {
    manager: Arc<CacheManager>,
    resolver: Option<PredicateResolver>,
    workers: InvalidationWorkerPool,
}

impl AutoCacheHandler {
    /// 创建构建器
    pub fn builder(config: AutoCacheConfig) -> AutoCacheHandlerBuilder {
        AutoCacheHandlerBuilder::new(config)
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    pub fn stats(&self) -> CacheStats {
        self.manager.stats()
    }

    /// 执行前
    pub async fn before_execute(&self, invocation: &mut Invocation) -> Option<Vec<DataValue>> {
        if invocation.command == SqlCommandType::Select {
            return self.before_select(invocation).await;
        }
        self.capture_predicate_ids(invocation).await;
        None
    }

    /// 执行后
    pub async fn after_execute(&self, invocation: &mut Invocation, result: &ExecutionResult) {
        if invocation.command == SqlCommandType::Select {
            if let Some(ticket) = invocation.read_ticket.take() {
                self.manager.finish_read(ticket, result, &invocation.context).await;
            }
            return;
        }

        let tasks = self.manager.plan_invalidation(
            &invocation.operation_id,
            invocation.command,
            &invocation.parameter,
            invocation.bound_sql.as_ref(),
            invocation.captured_ids.take(),
            result,
        );
        if tasks.is_empty() {
            return;
        }
        debug!("变更 {} 提交失效任务 {} 个", invocation.operation_id, tasks.len());
        for task in tasks {
            self.workers
                .submit(TaskEnvelope {
                    operation_id: invocation.operation_id.clone(),
                    tenant_id: invocation.context.tenant_id.clone(),
                    task,
                })
                .await;
        }
    }

    async fn before_select(&self, invocation: &mut Invocation) -> Option<Vec<DataValue>> {
        let outcome = self
            .manager
            .begin_read(&invocation.operation_id, &invocation.parameter, &invocation.context)
            .await;
        match outcome {
            ReadOutcome::Uncached => None,
            ReadOutcome::Hit(rows) => Some(rows),
            ReadOutcome::Miss(ticket) => {
                invocation.read_ticket = Some(ticket);
                None
            }
        }
    }

    /// 执行前捕获条件变更影响的主键
    ///
    /// 反查在调用方路径上同步完成，变更会多出一次查询的延迟
    async fn capture_predicate_ids(&self, invocation: &mut Invocation) {
        if self.manager.config().predicate_capture != PredicateCapture::BeforeExecute {
            return;
        }
        let (Some(resolver), Some(bound_sql)) = (&self.resolver, &invocation.bound_sql) else {
            return;
        };
        let Some(info) = self
            .manager
            .predicate_capture_target(&invocation.operation_id, invocation.command)
        else {
            return;
        };
        let captured = resolver
            .resolve_ids(bound_sql, &info.id_column, invocation.context.tenant_id.as_deref())
            .await;
        if let Err(e) = &captured {
            warn!("执行前反查主键失败: {}, {}", invocation.operation_id, e);
        }
        invocation.captured_ids = Some(captured);
    }

    /// 等待所有已提交的失效任务完成
    pub async fn wait_idle(&self) {
        self.workers.wait_idle().await;
    }

    /// 关闭后台工作池
    pub async fn shutdown(&self) {
        self.workers.shutdown().await;
    }
}

#[async_trait]
impl InterceptorHandler for AutoCacheHandler {
    fn name(&self) -> &str {
        "cache"
    }

    fn order(&self) -> HandlerOrder {
        CACHE_HANDLER_ORDER
    }

    async fn on_interceptor(&self, invocation: &mut Invocation) -> AutoCacheResult<Option<Vec<DataValue>>> {
        Ok(self.before_execute(invocation).await)
    }

    async fn on_finished(&self, invocation: &mut Invocation, result: &ExecutionResult) {
        self.after_execute(invocation, result).await;
    }

    async fn close(&self) {
        self.workers.wait_idle().await;
        self.shutdown().await;
    }
}

impl std::fmt::Debug for AutoCacheHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoCacheHandler")
            .field("manager", &self.manager)
            .field("resolver", &self.resolver)
            .field("workers", &self.workers)
            .finish()
    }
}

/// 自动缓存处理器构建器
pub struct AutoCacheHandlerBuilder {
    config: AutoCacheConfig,
    store: Option<Arc<dyn CacheStore>>,
    schemas: Vec<EntitySchema>,
    identifiers: Option<Arc<dyn IdentifierQuery>>,
    rewriter: Option<Arc<dyn PredicateRewriter>>,
}

impl AutoCacheHandlerBuilder {
    pub fn new(config: AutoCacheConfig) -> Self {
        Self {
            config,
            store: None,
            schemas: Vec::new(),
            identifiers: None,
            rewriter: None,
        }
    }

    /// 设置缓存存储，默认使用进程内存储
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 添加实体描述
    pub fn entity(mut self, schema: EntitySchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// 设置主键反查执行器，未设置时条件变更退化为整组清理
    pub fn identifier_query(mut self, identifiers: Arc<dyn IdentifierQuery>) -> Self {
        self.identifiers = Some(identifiers);
        self
    }

    /// 设置SQL改写器，默认使用 [`SimpleSqlRewriter`]
    pub fn rewriter(mut self, rewriter: Arc<dyn PredicateRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// 构建处理器，需要在 tokio 运行时内调用
    ///
    /// # 错误
    ///
    /// 配置校验失败或实体描述不合法时返回错误
    pub fn build(self) -> AutoCacheResult<AutoCacheHandler> {
        self.config.validate()?;
        let registry = OperationRegistry::builder(&self.config)
            .entities(self.schemas)
            .build()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCacheStore::new()) as Arc<dyn CacheStore>);
        let resolver = self.identifiers.map(|identifiers| {
            let rewriter = self
                .rewriter
                .unwrap_or_else(|| Arc::new(SimpleSqlRewriter::new()) as Arc<dyn PredicateRewriter>);
            PredicateResolver::new(rewriter, identifiers)
        });

        let worker_threads = self.config.worker_threads;
        let queue_capacity = self.config.worker_queue_capacity;
        let manager = Arc::new(CacheManager::new(store, self.config, Arc::new(registry)));
        let executor = Arc::new(InvalidationExecutor::new(manager.clone(), resolver.clone()));
        let workers = InvalidationWorkerPool::new(executor, worker_threads, queue_capacity);

        info!(
            "自动缓存处理器构建完成，主键反查: {}",
            if resolver.is_some() { "已启用" } else { "未启用" }
        );
        Ok(AutoCacheHandler {
            manager,
            resolver,
            workers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{QueryDeclaration, ReturnShape};
    use crate::types::{CallParameter, CallContext};
    use std::collections::HashMap;

    fn handler() -> AutoCacheHandler {
        let schema = EntitySchema::new("User", "UserMapper", "users")
            .fields(&["name"])
            .query(QueryDeclaration::new("findAll", &[], ReturnShape::EntityList));
        AutoCacheHandler::builder(AutoCacheConfig::default())
            .entity(schema)
            .build()
            .unwrap()
    }

    fn row(id: i64) -> DataValue {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), DataValue::Int(id));
        fields.insert("name".to_string(), DataValue::from("alice"));
        DataValue::Object(fields)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let handler = handler();
        let mut first = Invocation::select("UserMapper.selectByPrimaryKey", CallParameter::scalar(1));
        assert!(handler.before_execute(&mut first).await.is_none());
        assert!(first.read_ticket.as_ref().is_some_and(|t| t.holds_lock()));
        handler
            .after_execute(&mut first, &ExecutionResult::Rows(vec![row(1)]))
            .await;

        let mut second = Invocation::select("UserMapper.selectByPrimaryKey", CallParameter::scalar(1));
        assert_eq!(handler.before_execute(&mut second).await, Some(vec![row(1)]));
        assert_eq!(handler.stats().hits, 1);
        assert_eq!(handler.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_force_primary_skips_cache() {
        let handler = handler();
        let mut invocation = Invocation::select("UserMapper.findAll", CallParameter::None)
            .with_context(CallContext::new().force_primary(true));
        assert!(handler.before_execute(&mut invocation).await.is_none());
        assert!(invocation.read_ticket.is_none());
    }

    #[tokio::test]
    async fn test_failed_query_releases_lock() {
        let handler = handler();
        let mut invocation = Invocation::select("UserMapper.findAll", CallParameter::None);
        handler.before_execute(&mut invocation).await;
        handler.after_execute(&mut invocation, &ExecutionResult::Failed).await;

        let store = handler.manager().store().clone();
        assert!(!store.exists("concurrent:User.findAll:").await.unwrap());
        assert!(!store.exists("User.findAll:").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = AutoCacheConfig {
            group_batch_size: 0,
            ..AutoCacheConfig::default()
        };
        assert!(AutoCacheHandler::builder(config).build().is_err());
    }
}
