//! 缓存管理器核心模块
//!
//! 提供CacheManager的结构定义和构造函数

use super::key_generator::KeyCodec;
use super::stats::{CacheCounters, CacheStats};
use super::store::CacheStore;
use crate::config::AutoCacheConfig;
use crate::metadata::OperationRegistry;
use chrono::{Local, TimeZone};
use rat_logger::{debug, info, warn};
use std::sync::Arc;

/// 缓存管理器
///
/// 持有缓存存储、配置与只读的操作注册表，读写路径与缓存组管理都挂在它上面
#[derive(Clone)]
pub struct CacheManager {
    /// 缓存存储
    pub(crate) store: Arc<dyn CacheStore>,
    /// 缓存配置
    pub(crate) config: Arc<AutoCacheConfig>,
    /// 操作注册表
    pub(crate) registry: Arc<OperationRegistry>,
    /// 统计计数器
    pub(crate) counters: Arc<CacheCounters>,
}

impl CacheManager {
    /// 创建新的缓存管理器
    pub fn new(
        store: Arc<dyn CacheStore>,
        config: AutoCacheConfig,
        registry: Arc<OperationRegistry>,
    ) -> Self {
        info!(
            "缓存管理器初始化成功 - 启用: {}, 默认过期: {}s, 空值缓存: {}, 缓存组: {:?}",
            config.enabled,
            config.default_expire_secs,
            config.null_value_cache,
            registry.group_keys()
        );
        Self {
            store,
            config: Arc::new(config),
            registry,
            counters: Arc::new(CacheCounters::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn config(&self) -> &AutoCacheConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// 获取统计快照
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// 吸收存储错误：记录日志并计数，返回 None
    pub(crate) fn absorb<T>(&self, action: &str, key: &str, result: anyhow::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                CacheCounters::incr(&self.counters.store_errors);
                warn!("缓存{}失败，已忽略: key={}, error={}", action, key, e);
                None
            }
        }
    }

    /// 缓存组超过阈值后的保护过期时间（秒）
    pub(crate) fn group_safety_expire_secs(&self) -> u64 {
        if let Some(secs) = self.config.group_safety_expire_secs {
            return secs.max(1);
        }
        today_end_seconds()
    }

    /// 手动清理某个实体主键缓存
    pub async fn evict_entity(&self, entity: &str, id: &str) -> u64 {
        let key = KeyCodec::canonical_key(entity, id);
        debug!("手动清理主键缓存: {}", key);
        self.remove_keys(&[key]).await
    }

    /// 手动清理全部缓存组
    pub async fn clear_all_groups(&self) -> u64 {
        let mut removed = 0;
        for group_key in self.registry.group_keys() {
            removed += self.clear_group(group_key, &[]).await;
        }
        info!("手动清理全部缓存组，删除键数: {}", removed);
        removed
    }
}

/// 距离本地时间当天结束的秒数
fn today_end_seconds() -> u64 {
    let now = Local::now();
    let tomorrow = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest());
    match tomorrow {
        Some(end) => (end - now).num_seconds().max(1) as u64,
        None => 24 * 60 * 60,
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("store", &"<CacheStore>")
            .field("stats", &self.stats())
            .finish()
    }
}
