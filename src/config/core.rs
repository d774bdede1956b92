//! # 配置管理模块 - 核心配置类型
//!
//! 自动缓存的全局配置，支持构建器模式、TOML/JSON 文件加载

use crate::error::AutoCacheError;
use rat_logger::info;
use serde::{Deserialize, Serialize};

/// 一分钟
pub const IN_1MINS: u64 = 60;
/// 一小时
pub const IN_1HOUR: u64 = 60 * 60;

/// 条件更新/删除时主键反查的时机
///
/// `BeforeExecute` 的反查查询在调用方路径上、变更执行之前完成，
/// 每次条件变更因此多一次查询的延迟，换来失效目标准确。
/// `AfterExecute` 不增加变更延迟，但变更改掉条件列或删除行后反查不到这些主键，
/// 只能依靠随后的整组清理，主键缓存会保留到过期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateCapture {
    /// 在变更执行前反查（变更会改掉条件列或删除行时仍然准确）
    BeforeExecute,
    /// 变更完成后由后台任务反查，不占用调用方时间
    AfterExecute,
}

/// 自动缓存配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoCacheConfig {
    /// 是否启用自动缓存
    pub enabled: bool,
    /// 默认过期时间（秒），0 表示不过期
    pub default_expire_secs: u64,
    /// 是否缓存空结果（防缓存穿透）
    pub null_value_cache: bool,
    /// 空结果占位符的过期时间（秒），开启空值缓存时必须大于0
    pub null_value_expire_secs: u64,
    /// 并发控制锁过期时间（秒）
    pub lock_expire_secs: u64,
    /// 未拿到并发锁时等待填充的最长时间（毫秒）
    pub lock_wait_timeout_ms: u64,
    /// 等待填充时的轮询间隔（毫秒）
    pub lock_poll_interval_ms: u64,
    /// 用户作用域查询的最大过期时间（秒）
    pub user_scope_max_expire_secs: u64,
    /// 缓存组分批处理大小，同时也是缓存组保护阈值
    pub group_batch_size: usize,
    /// 缓存组超过阈值后设置的保护过期时间（秒），None 表示到当天结束
    pub group_safety_expire_secs: Option<u64>,
    /// 后台失效任务工作线程数
    pub worker_threads: usize,
    /// 后台失效任务队列容量
    pub worker_queue_capacity: usize,
    /// 条件变更的主键反查时机
    pub predicate_capture: PredicateCapture,
}

impl Default for AutoCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_expire_secs: IN_1HOUR,
            null_value_cache: true,
            null_value_expire_secs: IN_1MINS,
            lock_expire_secs: 30,
            lock_wait_timeout_ms: 3000,
            lock_poll_interval_ms: 50,
            user_scope_max_expire_secs: IN_1MINS * 10,
            group_batch_size: 1000,
            group_safety_expire_secs: None,
            worker_threads: 1,
            worker_queue_capacity: 1024,
            predicate_capture: PredicateCapture::BeforeExecute,
        }
    }
}

impl AutoCacheConfig {
    /// 创建配置构建器
    pub fn builder() -> super::builders::AutoCacheConfigBuilder {
        super::builders::AutoCacheConfigBuilder::new()
    }

    /// 校验配置项
    pub fn validate(&self) -> Result<(), AutoCacheError> {
        let invalid = |field: &str, message: &str| {
            crate::autocache_error!(
                config,
                crate::i18n::tf(
                    "error.config_value",
                    &[("field", field), ("message", message)]
                )
            )
        };
        if self.group_batch_size == 0 {
            return Err(invalid("group_batch_size", "必须大于0"));
        }
        if self.worker_threads == 0 {
            return Err(invalid("worker_threads", "必须大于0"));
        }
        if self.worker_queue_capacity == 0 {
            return Err(invalid("worker_queue_capacity", "必须大于0"));
        }
        if self.lock_poll_interval_ms == 0 {
            return Err(invalid("lock_poll_interval_ms", "必须大于0"));
        }
        if self.lock_expire_secs == 0 {
            return Err(invalid("lock_expire_secs", "必须大于0"));
        }
        // 存储把 0 当作永不过期，空值占位符不能常驻
        if self.null_value_cache && self.null_value_expire_secs == 0 {
            return Err(invalid("null_value_expire_secs", "开启空值缓存时必须大于0"));
        }
        Ok(())
    }

    /// 用户作用域查询在未显式指定过期时间时使用的过期时间
    pub fn user_scope_expire_secs(&self) -> u64 {
        if self.default_expire_secs == 0 {
            return self.user_scope_max_expire_secs;
        }
        self.user_scope_max_expire_secs.min(self.default_expire_secs)
    }

    /// 从配置文件加载配置
    ///
    /// # 参数
    ///
    /// * `config_path` - 配置文件路径，扩展名为 toml 时按 TOML 解析，否则按 JSON 解析
    pub fn from_file<P: AsRef<std::path::Path>>(config_path: P) -> Result<Self, AutoCacheError> {
        let content = std::fs::read_to_string(config_path.as_ref())?;

        let config: AutoCacheConfig =
            if config_path.as_ref().extension().and_then(|s| s.to_str()) == Some("toml") {
                toml::from_str(&content).map_err(|e| {
                    crate::autocache_error!(config, format!("解析TOML配置文件失败: {}", e))
                })?
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    crate::autocache_error!(config, format!("解析JSON配置文件失败: {}", e))
                })?
            };

        config.validate()?;
        info!("从文件加载自动缓存配置: {:?}", config_path.as_ref());
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, config_path: P) -> Result<(), AutoCacheError> {
        let content = if config_path.as_ref().extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::to_string_pretty(self).map_err(|e| {
                crate::autocache_error!(config, format!("序列化TOML配置失败: {}", e))
            })?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| {
                crate::autocache_error!(config, format!("序列化JSON配置失败: {}", e))
            })?
        };

        std::fs::write(config_path.as_ref(), content)?;

        info!("保存自动缓存配置到文件: {:?}", config_path.as_ref());
        Ok(())
    }
}
