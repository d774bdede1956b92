//! rat_autocache - 透明的自动缓存层
//!
//! 位于数据访问调用与关系型存储之间：按主键、唯一索引和声明的查询自动缓存结果，
//! 非主键查询通过指针引用主键缓存避免重复存储，并发未命中时用分布式锁防止击穿，
//! 变更时精确失效，无法精确计算时退化为整组清理

// 导出所有公共模块
pub mod adapter;
pub mod cache;
pub mod config;
pub mod error;
pub mod i18n;
pub mod interceptor;
pub mod metadata;
pub mod rewrite;
pub mod types;
pub mod worker;

// 重新导出常用类型和函数
pub use adapter::{CachedExecutor, DataAccess};
pub use cache::{
    CacheManager, CacheStats, CacheStore, InvalidationExecutor, KeyCodec, MemoryCacheStore,
    NULL_PLACEHOLDER, ReadOutcome, ReadTicket,
};
#[cfg(feature = "redis-store")]
pub use cache::RedisCacheStore;
pub use config::{AutoCacheConfig, AutoCacheConfigBuilder, PredicateCapture};
pub use error::{AutoCacheError, AutoCacheResult};
pub use interceptor::{
    AutoCacheHandler, AutoCacheHandlerBuilder, HandlerOrder, InterceptorHandler,
    InterceptorPipeline, Invocation,
};
pub use metadata::{
    CacheOptions, EntitySchema, MutationDeclaration, OperationRegistry, QueryCacheMethodMetadata,
    QueryDeclaration, ReturnShape,
};
pub use rewrite::{IdentifierQuery, PredicateResolver, PredicateRewriter, SimpleSqlRewriter};
pub use types::*;
pub use worker::{InvalidationTask, InvalidationWorkerPool, TaskEnvelope, TaskRunner};

/// 初始化rat_autocache库
///
/// 这个函数会初始化多语言错误消息系统
///
/// 注意：日志系统由调用者自行初始化，本库不会自动初始化日志
pub fn init() {
    i18n::ErrorMessageI18n::init();
}

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库名称
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 获取库信息
pub fn get_info() -> String {
    format!("{} v{}", NAME, VERSION)
}
