//! 缓存管理模块
//!
//! 提供读穿透/写失效的自动缓存引擎：缓存键生成、缓存存储适配、
//! 读路径的防击穿控制、变更失效与缓存组清理

// 导出所有子模块
pub mod cache_manager;
pub mod group;
pub mod invalidation;
pub mod key_generator;
pub mod query_cache;
pub mod record_cache;
#[cfg(feature = "redis-store")]
pub mod redis_store;
pub mod stats;
pub mod store;

// 重新导出主要的公共类型和结构体
pub use cache_manager::CacheManager;
pub use invalidation::InvalidationExecutor;
pub use key_generator::{
    CONCURRENT_LOCK_PREFIX, CURRENT_USER_CONTEXT_NAME, GROUP_MEMBERS_SUFFIX, GROUPKEY_SUFFIX, ID_PART_CACHEKEY,
    KeyCodec, NULL_PLACEHOLDER,
};
pub use query_cache::{ReadOutcome, ReadTicket};
#[cfg(feature = "redis-store")]
pub use redis_store::RedisCacheStore;
pub use stats::{CacheCounters, CacheStats};
pub use store::{CacheStore, MemoryCacheStore};
