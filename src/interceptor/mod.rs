//! 拦截器管线
//!
//! 数据访问调用在执行前后依次经过已注册的处理器，
//! 执行前第一个返回结果的处理器会短路真实调用

pub mod cache_handler;

pub use cache_handler::{AutoCacheHandler, AutoCacheHandlerBuilder};

use crate::cache::ReadTicket;
use crate::error::AutoCacheResult;
use crate::metadata::split_operation_id;
use crate::types::{BoundSql, CallContext, CallParameter, DataValue, ExecutionResult, SqlCommandType};
use async_trait::async_trait;
use rat_logger::{debug, info, warn};
use std::sync::Arc;

/// 处理器顺序，数值小的先执行
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerOrder(pub i32);

/// 一次被拦截的数据访问调用
#[derive(Debug)]
pub struct Invocation {
    /// 操作ID：`Mapper.方法名`
    pub operation_id: String,
    pub command: SqlCommandType,
    pub parameter: CallParameter,
    /// 变更语句的绑定SQL，条件变更反查主键时需要
    pub bound_sql: Option<BoundSql>,
    pub context: CallContext,
    /// 读路径未命中时的凭据
    pub(crate) read_ticket: Option<ReadTicket>,
    /// 执行前捕获的受影响主键
    pub(crate) captured_ids: Option<AutoCacheResult<Vec<String>>>,
}

impl Invocation {
    pub fn new<S: Into<String>>(operation_id: S, command: SqlCommandType, parameter: CallParameter) -> Self {
        Self {
            operation_id: operation_id.into(),
            command,
            parameter,
            bound_sql: None,
            context: CallContext::default(),
            read_ticket: None,
            captured_ids: None,
        }
    }

    /// 查询调用快捷构造
    pub fn select<S: Into<String>>(operation_id: S, parameter: CallParameter) -> Self {
        Self::new(operation_id, SqlCommandType::Select, parameter)
    }

    pub fn with_bound_sql(mut self, bound_sql: BoundSql) -> Self {
        self.bound_sql = Some(bound_sql);
        self
    }

    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    /// 所属 Mapper
    pub fn mapper(&self) -> Option<&str> {
        split_operation_id(&self.operation_id).map(|(mapper, _)| mapper)
    }

    /// 方法名
    pub fn method(&self) -> Option<&str> {
        split_operation_id(&self.operation_id).map(|(_, method)| method)
    }
}

/// 拦截处理器
#[async_trait]
pub trait InterceptorHandler: Send + Sync {
    /// 处理器名称
    fn name(&self) -> &str;

    /// 处理器顺序
    fn order(&self) -> HandlerOrder;

    /// 启动
    async fn start(&self) -> AutoCacheResult<()> {
        Ok(())
    }

    /// 执行前调用，返回 Some 时跳过真实调用
    async fn on_interceptor(&self, invocation: &mut Invocation) -> AutoCacheResult<Option<Vec<DataValue>>>;

    /// 执行后调用（包括执行失败与短路的情况）
    async fn on_finished(&self, invocation: &mut Invocation, result: &ExecutionResult);

    /// 关闭
    async fn close(&self) {}
}

/// 拦截器管线
#[derive(Default)]
pub struct InterceptorPipeline {
    handlers: Vec<Arc<dyn InterceptorHandler>>,
}

impl InterceptorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，按顺序稳定排序
    pub fn register(mut self, handler: Arc<dyn InterceptorHandler>) -> Self {
        info!("注册拦截处理器: {} (order={})", handler.name(), handler.order().0);
        self.handlers.push(handler);
        self.handlers.sort_by_key(|h| h.order());
        self
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    /// 启动所有处理器
    pub async fn start(&self) -> AutoCacheResult<()> {
        for handler in &self.handlers {
            handler.start().await?;
        }
        Ok(())
    }

    /// 执行前：第一个返回结果的处理器短路后续处理器
    pub async fn before(&self, invocation: &mut Invocation) -> Option<Vec<DataValue>> {
        for handler in &self.handlers {
            match handler.on_interceptor(invocation).await {
                Ok(Some(rows)) => {
                    debug!("处理器 {} 短路调用: {}", handler.name(), invocation.operation_id);
                    return Some(rows);
                }
                Ok(None) => {}
                Err(e) => warn!(
                    "处理器 {} 执行前处理失败，已跳过: {}, {}",
                    handler.name(),
                    invocation.operation_id,
                    e
                ),
            }
        }
        None
    }

    /// 执行后：所有处理器都会被调用
    pub async fn after(&self, invocation: &mut Invocation, result: &ExecutionResult) {
        for handler in &self.handlers {
            handler.on_finished(invocation, result).await;
        }
    }

    /// 关闭所有处理器
    pub async fn close(&self) {
        for handler in &self.handlers {
            handler.close().await;
        }
    }
}

impl std::fmt::Debug for InterceptorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorPipeline")
            .field("handlers", &self.handler_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        order: i32,
        answer: Option<Vec<DataValue>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl InterceptorHandler for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn order(&self) -> HandlerOrder {
            HandlerOrder(self.order)
        }

        async fn on_interceptor(&self, _invocation: &mut Invocation) -> AutoCacheResult<Option<Vec<DataValue>>> {
            self.log.lock().push(format!("before:{}", self.name));
            Ok(self.answer.clone())
        }

        async fn on_finished(&self, _invocation: &mut Invocation, _result: &ExecutionResult) {
            self.log.lock().push(format!("after:{}", self.name));
        }
    }

    #[tokio::test]
    async fn test_order_and_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = InterceptorPipeline::new()
            .register(Arc::new(Recorder {
                name: "late",
                order: 10,
                answer: None,
                log: log.clone(),
            }))
            .register(Arc::new(Recorder {
                name: "early",
                order: 1,
                answer: Some(vec![DataValue::Int(1)]),
                log: log.clone(),
            }));
        assert_eq!(pipeline.handler_names(), vec!["early", "late"]);

        let mut invocation = Invocation::select("UserMapper.findAll", CallParameter::None);
        let rows = pipeline.before(&mut invocation).await;
        assert_eq!(rows, Some(vec![DataValue::Int(1)]));
        pipeline.after(&mut invocation, &ExecutionResult::Rows(vec![])).await;

        assert_eq!(
            *log.lock(),
            vec!["before:early", "after:early", "after:late"]
        );
    }

    #[test]
    fn test_invocation_accessors() {
        let invocation = Invocation::new("UserMapper.updateStatus", SqlCommandType::Update, CallParameter::None);
        assert_eq!(invocation.mapper(), Some("UserMapper"));
        assert_eq!(invocation.method(), Some("updateStatus"));
    }
}
