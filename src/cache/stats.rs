//! 缓存统计模块
//!
//! 提供缓存命中、失效和并发控制的统计信息

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// 原子计数器，用于高频统计
#[derive(Debug, Default)]
pub struct CacheCounters {
    pub(crate) hits: AtomicU64,
    pub(crate) null_hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) writes: AtomicU64,
    pub(crate) removed_keys: AtomicU64,
    pub(crate) lock_contentions: AtomicU64,
    pub(crate) lock_wait_hits: AtomicU64,
    pub(crate) group_clears: AtomicU64,
    pub(crate) predicate_fallbacks: AtomicU64,
    pub(crate) store_errors: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// 生成统计快照
    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            null_hits: self.null_hits.load(Ordering::Relaxed),
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            writes: self.writes.load(Ordering::Relaxed),
            removed_keys: self.removed_keys.load(Ordering::Relaxed),
            lock_contentions: self.lock_contentions.load(Ordering::Relaxed),
            lock_wait_hits: self.lock_wait_hits.load(Ordering::Relaxed),
            group_clears: self.group_clears.load(Ordering::Relaxed),
            predicate_fallbacks: self.predicate_fallbacks.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// 缓存命中次数（含空值占位符命中）
    pub hits: u64,
    /// 空值占位符命中次数
    pub null_hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 缓存命中率
    pub hit_rate: f64,
    /// 缓存写入次数
    pub writes: u64,
    /// 失效删除的键数量
    pub removed_keys: u64,
    /// 未拿到防击穿锁的次数
    pub lock_contentions: u64,
    /// 等锁后命中缓存的次数
    pub lock_wait_hits: u64,
    /// 缓存组清理次数
    pub group_clears: u64,
    /// 条件变更反查失败、退化为整组清理的次数
    pub predicate_fallbacks: u64,
    /// 被吸收的存储错误次数
    pub store_errors: u64,
}
