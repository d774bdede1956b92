//! 后台失效任务工作池
//!
//! 固定数量的 tokio 任务消费有界队列中的失效任务。
//! 租户等上下文随任务显式传递；任务是幂等的，重复执行无副作用

use crate::types::BoundSql;
use async_trait::async_trait;
use parking_lot::Mutex;
use rat_logger::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

/// 失效任务
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidationTask {
    /// 删除一批确定的缓存键
    RemoveKeys { keys: Vec<String> },
    /// 反查条件变更影响的主键并删除对应主键缓存，失败时清理整个缓存组
    ResolvePredicate {
        mapper: String,
        entity: String,
        id_column: String,
        group_key: String,
        bound_sql: BoundSql,
    },
    /// 清理缓存组，`prefixes` 非空时只清理包含这些前缀的键
    ClearGroup { group_key: String, prefixes: Vec<String> },
}

/// 带上下文的失效任务
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEnvelope {
    /// 触发任务的变更操作
    pub operation_id: String,
    /// 触发时的租户
    pub tenant_id: Option<String>,
    pub task: InvalidationTask,
}

/// 任务执行器
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, envelope: TaskEnvelope);
}

/// 失效任务工作池
pub struct InvalidationWorkerPool {
    sender: Mutex<Option<mpsc::Sender<TaskEnvelope>>>,
    runner: Arc<dyn TaskRunner>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl InvalidationWorkerPool {
    /// 创建工作池并启动工作任务，需要在 tokio 运行时内调用
    pub fn new(runner: Arc<dyn TaskRunner>, worker_threads: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let handles = (0..worker_threads.max(1))
            .map(|worker_id| {
                tokio::spawn(Self::worker_loop(
                    worker_id,
                    receiver.clone(),
                    runner.clone(),
                    pending.clone(),
                    idle.clone(),
                ))
            })
            .collect();

        info!(
            "启动缓存失效工作池: 工作任务={}, 队列容量={}",
            worker_threads.max(1),
            queue_capacity.max(1)
        );

        Self {
            sender: Mutex::new(Some(sender)),
            runner,
            pending,
            idle,
            handles: Mutex::new(handles),
        }
    }

    async fn worker_loop(
        worker_id: usize,
        receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<TaskEnvelope>>>,
        runner: Arc<dyn TaskRunner>,
        pending: Arc<AtomicUsize>,
        idle: Arc<Notify>,
    ) {
        debug!("缓存失效工作任务启动: worker={}", worker_id);
        loop {
            let next = { receiver.lock().await.recv().await };
            let Some(envelope) = next else {
                break;
            };
            runner.run(envelope).await;
            Self::finish(&pending, &idle);
        }
        debug!("缓存失效工作任务停止: worker={}", worker_id);
    }

    fn finish(pending: &AtomicUsize, idle: &Notify) {
        if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            idle.notify_waiters();
        }
    }

    /// 提交任务
    ///
    /// 队列已满或已关闭时在当前任务中直接执行，任务不会被丢弃
    pub async fn submit(&self, envelope: TaskEnvelope) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let sender = self.sender.lock().clone();
        let rejected = match sender {
            Some(sender) => match sender.try_send(envelope) {
                Ok(()) => None,
                Err(mpsc::error::TrySendError::Full(envelope)) => {
                    warn!("缓存失效队列已满，直接执行: {}", envelope.operation_id);
                    Some(envelope)
                }
                Err(mpsc::error::TrySendError::Closed(envelope)) => {
                    warn!("{}，直接执行: {}", crate::i18n::t("error.worker_closed"), envelope.operation_id);
                    Some(envelope)
                }
            },
            None => Some(envelope),
        };

        if let Some(envelope) = rejected {
            self.runner.run(envelope).await;
            Self::finish(&self.pending, &self.idle);
        }
    }

    /// 尚未完成的任务数
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// 等待所有已提交的任务执行完毕
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// 关闭队列并等待工作任务退出，已入队的任务会执行完
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                warn!("缓存失效工作任务异常退出: {}", e);
            }
        }
        info!("缓存失效工作池已关闭");
    }
}

impl std::fmt::Debug for InvalidationWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationWorkerPool")
            .field("pending", &self.pending())
            .field("runner", &"<TaskRunner>")
            .finish()
    }
}
