//! 缓存元数据模块
//!
//! 声明式实体描述、查询方法元数据与启动期构建的操作注册表

pub mod method;
pub mod registry;
pub mod schema;

pub use method::{KEY_PLACEHOLDER, QueryCacheMethodMetadata};
pub use registry::{
    MapperInfo, MutationKind, OperationRegistry, OperationRegistryBuilder, split_operation_id,
};
pub use schema::{
    CacheOptions, EntitySchema, MutationDeclaration, QueryDeclaration, ReturnShape, crud_methods,
};
