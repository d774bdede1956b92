//! # 自动缓存配置构建器模块
//!
//! 提供自动缓存配置的构建器实现，支持链式调用和严格验证

use crate::config::core::{AutoCacheConfig, PredicateCapture};
use crate::error::AutoCacheError;
use rat_logger::info;

/// 自动缓存配置构建器
///
/// 未设置的项沿用 [`AutoCacheConfig::default`]，`build()` 时统一校验
#[derive(Debug)]
pub struct AutoCacheConfigBuilder {
    config: AutoCacheConfig,
}

impl AutoCacheConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: AutoCacheConfig::default(),
        }
    }

    /// 设置是否启用自动缓存
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// 设置默认过期时间
    ///
    /// # 参数
    ///
    /// * `secs` - 默认过期时间（秒），0 表示不过期
    pub fn default_expire_secs(mut self, secs: u64) -> Self {
        self.config.default_expire_secs = secs;
        self
    }

    /// 设置是否缓存空结果
    pub fn null_value_cache(mut self, enabled: bool) -> Self {
        self.config.null_value_cache = enabled;
        self
    }

    /// 设置空结果占位符过期时间
    pub fn null_value_expire_secs(mut self, secs: u64) -> Self {
        self.config.null_value_expire_secs = secs;
        self
    }

    /// 设置并发控制锁过期时间
    pub fn lock_expire_secs(mut self, secs: u64) -> Self {
        self.config.lock_expire_secs = secs;
        self
    }

    /// 设置未拿到并发锁时的等待策略
    ///
    /// # 参数
    ///
    /// * `timeout_ms` - 最长等待时间（毫秒）
    /// * `poll_interval_ms` - 轮询间隔（毫秒）
    pub fn lock_wait(mut self, timeout_ms: u64, poll_interval_ms: u64) -> Self {
        self.config.lock_wait_timeout_ms = timeout_ms;
        self.config.lock_poll_interval_ms = poll_interval_ms;
        self
    }

    /// 设置用户作用域查询的最大过期时间
    pub fn user_scope_max_expire_secs(mut self, secs: u64) -> Self {
        self.config.user_scope_max_expire_secs = secs;
        self
    }

    /// 设置缓存组分批大小
    pub fn group_batch_size(mut self, size: usize) -> Self {
        self.config.group_batch_size = size;
        self
    }

    /// 设置缓存组保护过期时间
    pub fn group_safety_expire_secs(mut self, secs: Option<u64>) -> Self {
        self.config.group_safety_expire_secs = secs;
        self
    }

    /// 设置后台工作线程数与队列容量
    pub fn workers(mut self, threads: usize, queue_capacity: usize) -> Self {
        self.config.worker_threads = threads;
        self.config.worker_queue_capacity = queue_capacity;
        self
    }

    /// 设置条件变更的主键反查时机
    pub fn predicate_capture(mut self, capture: PredicateCapture) -> Self {
        self.config.predicate_capture = capture;
        self
    }

    /// 构建自动缓存配置
    ///
    /// # 错误
    ///
    /// 任何配置项非法时返回错误
    pub fn build(self) -> Result<AutoCacheConfig, AutoCacheError> {
        self.config.validate()?;

        info!(
            "创建自动缓存配置: 启用={}, 默认过期={}s, 空值缓存={}, 工作线程={}",
            self.config.enabled,
            self.config.default_expire_secs,
            self.config.null_value_cache,
            self.config.worker_threads
        );

        Ok(self.config)
    }
}

impl Default for AutoCacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
