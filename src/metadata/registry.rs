//! 操作注册表
//!
//! 启动时由声明式的 [`EntitySchema`] 一次性构建，之后只读，通过 `Arc` 共享给拦截器

use super::method::{KEY_PLACEHOLDER, QueryCacheMethodMetadata};
use super::schema::{EntitySchema, ReturnShape, crud_methods};
use crate::cache::key_generator::{CURRENT_USER_CONTEXT_NAME, GROUPKEY_SUFFIX, ID_PART_CACHEKEY};
use crate::config::AutoCacheConfig;
use crate::error::AutoCacheResult;
use crate::i18n::tf;
use crate::types::SqlCommandType;
use rat_logger::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// 拆分操作ID为 (Mapper, 方法名)
pub fn split_operation_id(operation_id: &str) -> Option<(&str, &str)> {
    operation_id.rsplit_once('.')
}

/// 变更操作的失效方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// 参数中直接携带主键
    ByPrimaryKey,
    /// 第一个参数是主键列表
    BatchByPrimaryKeys,
    /// 任意条件的更新/删除，需要反查主键
    Predicate,
    /// 自定义插入，只清理缓存组
    GroupOnly,
}

/// Mapper 信息
#[derive(Debug, Clone)]
pub struct MapperInfo {
    pub mapper: String,
    pub entity: String,
    pub table: String,
    pub id_field: String,
    pub id_column: String,
    /// 是否参与自动缓存
    pub cache_enabled: bool,
    /// 变更方法 -> 命令类型（含自动补齐的 CRUD 方法）
    pub mutations: HashMap<String, SqlCommandType>,
}

impl MapperInfo {
    pub fn group_key(&self) -> String {
        format!("{}{}", self.entity, GROUPKEY_SUFFIX)
    }
}

/// 操作注册表
#[derive(Debug, Default)]
pub struct OperationRegistry {
    mappers: HashMap<String, MapperInfo>,
    /// Mapper -> (操作ID -> 元数据)
    query_methods: HashMap<String, HashMap<String, Arc<QueryCacheMethodMetadata>>>,
    /// 变更操作ID -> 受影响的查询操作ID
    custom_mappings: HashMap<String, Vec<String>>,
    group_keys: Vec<String>,
}

impl OperationRegistry {
    pub fn builder(config: &AutoCacheConfig) -> OperationRegistryBuilder {
        OperationRegistryBuilder::new(config)
    }

    /// 查询操作的缓存元数据，未注册时返回 None（不走缓存）
    pub fn query_metadata(&self, operation_id: &str) -> Option<Arc<QueryCacheMethodMetadata>> {
        let (mapper, _) = split_operation_id(operation_id)?;
        self.query_methods.get(mapper)?.get(operation_id).cloned()
    }

    /// 按主键查询的元数据
    pub fn pk_metadata(&self, mapper: &str) -> Option<Arc<QueryCacheMethodMetadata>> {
        let operation_id = format!("{}.{}", mapper, crud_methods::SELECT_BY_PRIMARY_KEY);
        self.query_methods.get(mapper)?.get(&operation_id).cloned()
    }

    /// 同一 Mapper 下所有二次按主键查询的方法
    pub fn second_query_methods(&self, mapper: &str) -> Vec<Arc<QueryCacheMethodMetadata>> {
        self.query_methods
            .get(mapper)
            .map(|methods| {
                methods
                    .values()
                    .filter(|m| m.is_second_query_by_id())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn mapper(&self, mapper: &str) -> Option<&MapperInfo> {
        self.mappers.get(mapper)
    }

    /// Mapper 是否参与自动缓存
    pub fn is_cache_enabled(&self, mapper: &str) -> bool {
        self.mappers
            .get(mapper)
            .map(|m| m.cache_enabled)
            .unwrap_or(false)
    }

    /// 变更操作关联的查询操作
    pub fn custom_targets(&self, operation_id: &str) -> Option<&[String]> {
        self.custom_mappings.get(operation_id).map(|v| v.as_slice())
    }

    pub fn custom_mappings(&self) -> &HashMap<String, Vec<String>> {
        &self.custom_mappings
    }

    /// 全部缓存组键
    pub fn group_keys(&self) -> &[String] {
        &self.group_keys
    }

    /// 判断变更操作的失效方式
    pub fn mutation_kind(&self, operation_id: &str, command: SqlCommandType) -> MutationKind {
        let method = split_operation_id(operation_id)
            .map(|(_, method)| method)
            .unwrap_or(operation_id);
        if crud_methods::BY_PRIMARY_KEY.contains(&method) {
            MutationKind::ByPrimaryKey
        } else if crud_methods::BATCH_BY_PRIMARY_KEYS.contains(&method) {
            MutationKind::BatchByPrimaryKeys
        } else if command == SqlCommandType::Insert {
            MutationKind::GroupOnly
        } else {
            MutationKind::Predicate
        }
    }
}

/// 待展开的 evict-on 声明
struct PendingEviction {
    mapper: String,
    query_operation_id: String,
    entries: Vec<String>,
}

/// 操作注册表构建器
pub struct OperationRegistryBuilder {
    default_expire_secs: u64,
    user_scope_expire_secs: u64,
    schemas: Vec<EntitySchema>,
}

impl OperationRegistryBuilder {
    pub fn new(config: &AutoCacheConfig) -> Self {
        Self {
            default_expire_secs: config.default_expire_secs,
            user_scope_expire_secs: config.user_scope_expire_secs(),
            schemas: Vec::new(),
        }
    }

    /// 添加实体描述
    pub fn entity(mut self, schema: EntitySchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// 批量添加实体描述
    pub fn entities<I: IntoIterator<Item = EntitySchema>>(mut self, schemas: I) -> Self {
        self.schemas.extend(schemas);
        self
    }

    /// 构建注册表
    ///
    /// # 错误
    ///
    /// Mapper 或操作重复、缺少主键、唯一索引查询返回类型不匹配、
    /// evict-on 引用了未知 Mapper 时返回错误
    pub fn build(self) -> AutoCacheResult<OperationRegistry> {
        let mut registry = OperationRegistry::default();
        let mut pending = Vec::new();

        for schema in &self.schemas {
            if registry.mappers.contains_key(&schema.mapper) {
                return Err(crate::autocache_error!(
                    validation,
                    "mapper",
                    tf("error.duplicate_mapper", &[("mapper", schema.mapper.as_str())])
                ));
            }
            if schema.id_field.is_empty() || schema.id_column.is_empty() {
                return Err(crate::autocache_error!(
                    validation,
                    "id_field",
                    tf("error.entity_id_missing", &[("entity", schema.entity.as_str())])
                ));
            }

            registry
                .mappers
                .insert(schema.mapper.clone(), Self::mapper_info(schema));

            if schema.cache_ignore {
                info!("Mapper {} 已声明忽略自动缓存", schema.mapper);
                continue;
            }

            let mut methods = HashMap::new();
            let pk = self.pk_method(schema);
            info!(
                "解析查询方法{}自动缓存配置 ok,keyPattern:[{}]",
                pk.operation_id, pk.key_pattern
            );
            registry.group_keys.push(pk.group_key.clone());
            methods.insert(pk.operation_id.clone(), Arc::new(pk));

            for query in &schema.queries {
                let operation_id = format!("{}.{}", schema.mapper, query.method);
                if query.method == crud_methods::SELECT_BY_PRIMARY_KEY {
                    continue;
                }
                if methods.contains_key(&operation_id) {
                    return Err(crate::autocache_error!(
                        validation,
                        "method",
                        tf("error.duplicate_operation", &[("operation", operation_id.as_str())])
                    ));
                }
                let (metadata, evict_on) = self.query_method(schema, query)?;
                info!(
                    "解析查询方法{}自动缓存配置 ok,keyPattern:[{}]",
                    metadata.operation_id, metadata.key_pattern
                );
                if !evict_on.is_empty() {
                    pending.push(PendingEviction {
                        mapper: schema.mapper.clone(),
                        query_operation_id: operation_id.clone(),
                        entries: evict_on,
                    });
                }
                methods.insert(operation_id, Arc::new(metadata));
            }

            registry.query_methods.insert(schema.mapper.clone(), methods);
        }

        for eviction in pending {
            Self::wire_evictions(&mut registry, eviction)?;
        }

        info!("自定义缓存失效关系: {:?}", registry.custom_mappings);
        Ok(registry)
    }

    fn mapper_info(schema: &EntitySchema) -> MapperInfo {
        let mut mutations = HashMap::new();
        for method in [crud_methods::INSERT, crud_methods::INSERT_SELECTIVE] {
            mutations.insert(method.to_string(), SqlCommandType::Insert);
        }
        for method in [
            crud_methods::UPDATE_BY_PRIMARY_KEY,
            crud_methods::UPDATE_BY_PRIMARY_KEY_SELECTIVE,
            crud_methods::BATCH_UPDATE_BY_PRIMARY_KEYS,
        ] {
            mutations.insert(method.to_string(), SqlCommandType::Update);
        }
        mutations.insert(
            crud_methods::DELETE_BY_PRIMARY_KEY.to_string(),
            SqlCommandType::Delete,
        );
        for mutation in &schema.mutations {
            if mutation.command.is_mutation() {
                mutations.insert(mutation.method.clone(), mutation.command);
            } else {
                warn!(
                    "变更方法 {}.{} 声明为查询命令，已忽略",
                    schema.mapper, mutation.method
                );
            }
        }

        MapperInfo {
            mapper: schema.mapper.clone(),
            entity: schema.entity.clone(),
            table: schema.table.clone(),
            id_field: schema.id_field.clone(),
            id_column: schema.id_column.clone(),
            cache_enabled: !schema.cache_ignore,
            mutations,
        }
    }

    /// 生成按主键查询缓存定义
    fn pk_method(&self, schema: &EntitySchema) -> QueryCacheMethodMetadata {
        QueryCacheMethodMetadata {
            operation_id: format!("{}.{}", schema.mapper, crud_methods::SELECT_BY_PRIMARY_KEY),
            mapper: schema.mapper.clone(),
            entity: schema.entity.clone(),
            id_field: schema.id_field.clone(),
            key_pattern: format!("{}{}{}", schema.entity, ID_PART_CACHEKEY, KEY_PLACEHOLDER),
            is_pk: true,
            unique_index: false,
            collection_result: false,
            concurrency: false,
            scope_context: None,
            expire_secs: self.default_expire_secs,
            group_key: format!("{}{}", schema.entity, GROUPKEY_SUFFIX),
            ref_key: None,
            key_field_names: Vec::new(),
            param_names: vec![schema.id_field.clone()],
        }
    }

    /// 按查询方法声明生成缓存定义，同时返回待展开的 evict-on 列表
    fn query_method(
        &self,
        schema: &EntitySchema,
        query: &crate::metadata::schema::QueryDeclaration,
    ) -> AutoCacheResult<(QueryCacheMethodMetadata, Vec<String>)> {
        let options = &query.options;

        if options.unique_index && query.return_shape != ReturnShape::Entity {
            return Err(crate::autocache_error!(
                validation,
                "unique_index",
                tf(
                    "error.unique_index_return",
                    &[
                        ("method", format!("{}.{}", schema.mapper, query.method).as_str()),
                        ("entity", schema.entity.as_str()),
                    ]
                )
            ));
        }

        let scope_context = if options.user_scope {
            Some(CURRENT_USER_CONTEXT_NAME.to_string())
        } else {
            options.scope_context.clone()
        };

        let mut evict_on = options.evict_on_methods.clone();
        if scope_context.is_some() && evict_on.is_empty() {
            evict_on.push("*".to_string());
        }

        let expire_secs = match options.expire_secs {
            Some(secs) if secs > 0 => secs,
            _ if options.user_scope => self.user_scope_expire_secs,
            _ => self.default_expire_secs,
        };

        // 返回所属实体且参数全部是实体字段时，结果改为指向主键缓存的指针
        let key_field_names = if query.return_shape == ReturnShape::Entity
            && !query.params.is_empty()
            && query.params.iter().all(|p| schema.has_field(p))
        {
            query.params.clone()
        } else {
            Vec::new()
        };

        let metadata = QueryCacheMethodMetadata {
            operation_id: format!("{}.{}", schema.mapper, query.method),
            mapper: schema.mapper.clone(),
            entity: schema.entity.clone(),
            id_field: schema.id_field.clone(),
            key_pattern: format!("{}.{}:{}", schema.entity, query.method, KEY_PLACEHOLDER),
            is_pk: false,
            unique_index: options.unique_index,
            collection_result: query.return_shape.is_collection(),
            concurrency: options.concurrency,
            scope_context,
            expire_secs,
            group_key: format!("{}{}", schema.entity, GROUPKEY_SUFFIX),
            ref_key: options.ref_key.clone(),
            key_field_names,
            param_names: query.params.clone(),
        };
        Ok((metadata, evict_on))
    }

    /// 展开 evict-on 声明并写入自定义失效关系
    fn wire_evictions(registry: &mut OperationRegistry, eviction: PendingEviction) -> AutoCacheResult<()> {
        for entry in &eviction.entries {
            let target = if entry == "*" {
                format!("{}.*", eviction.mapper)
            } else if !entry.contains('.') {
                format!("{}.{}", eviction.mapper, entry)
            } else {
                entry.clone()
            };

            let (target_mapper, target_method) = split_operation_id(&target).unwrap_or((target.as_str(), ""));
            let Some(mapper_info) = registry.mappers.get(target_mapper) else {
                return Err(crate::autocache_error!(
                    validation,
                    "evict_on_methods",
                    format!(
                        "{} 引用了未注册的 Mapper: {}",
                        eviction.query_operation_id, target_mapper
                    )
                ));
            };

            let mutating_ids: Vec<String> = if target_method == "*" {
                let mut methods: Vec<&String> = mapper_info.mutations.keys().collect();
                methods.sort();
                methods
                    .into_iter()
                    .map(|m| format!("{}.{}", target_mapper, m))
                    .collect()
            } else {
                if !mapper_info.mutations.contains_key(target_method) {
                    warn!(
                        "{} 的 evict-on 方法 {} 未声明为变更方法",
                        eviction.query_operation_id, target
                    );
                }
                vec![target.clone()]
            };

            for mutating_id in mutating_ids {
                let targets = registry.custom_mappings.entry(mutating_id).or_default();
                if !targets.contains(&eviction.query_operation_id) {
                    targets.push(eviction.query_operation_id.clone());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::schema::{CacheOptions, QueryDeclaration};

    fn user_schema() -> EntitySchema {
        EntitySchema::new("User", "UserMapper", "users")
            .fields(&["name", "mobile", "status"])
            .query(
                QueryDeclaration::new("findByMobile", &["mobile"], ReturnShape::Entity)
                    .options(CacheOptions::new().unique_index()),
            )
            .query(
                QueryDeclaration::new("findByStatus", &["status"], ReturnShape::EntityList)
                    .options(CacheOptions::new().user_scope()),
            )
            .mutation("updateStatus", SqlCommandType::Update)
    }

    #[test]
    fn test_pk_method_is_synthesised() {
        let config = AutoCacheConfig::default();
        let registry = OperationRegistry::builder(&config)
            .entity(user_schema())
            .build()
            .unwrap();

        let pk = registry.query_metadata("UserMapper.selectByPrimaryKey").unwrap();
        assert!(pk.is_pk);
        assert_eq!(pk.key_pattern, "User.id:%s");
        assert_eq!(pk.group_key, "User~keys");
        assert_eq!(pk.expire_secs, config.default_expire_secs);
        assert_eq!(registry.group_keys(), &["User~keys".to_string()]);
    }

    #[test]
    fn test_second_query_and_scope_defaults() {
        let config = AutoCacheConfig::default();
        let registry = OperationRegistry::builder(&config)
            .entity(user_schema())
            .build()
            .unwrap();

        let by_mobile = registry.query_metadata("UserMapper.findByMobile").unwrap();
        assert!(by_mobile.is_second_query_by_id());
        assert_eq!(by_mobile.key_pattern, "User.findByMobile:%s");

        let by_status = registry.query_metadata("UserMapper.findByStatus").unwrap();
        assert!(!by_status.is_second_query_by_id());
        assert!(by_status.collection_result);
        assert_eq!(by_status.scope_context.as_deref(), Some(CURRENT_USER_CONTEXT_NAME));
        assert_eq!(by_status.expire_secs, 600);

        // 作用域查询未声明 evict-on 时默认所有变更方法
        let targets = registry.custom_targets("UserMapper.updateStatus").unwrap();
        assert_eq!(targets, &["UserMapper.findByStatus".to_string()]);
        assert!(registry.custom_targets("UserMapper.deleteByPrimaryKey").is_some());
        assert!(registry.custom_targets("UserMapper.selectByPrimaryKey").is_none());
    }

    #[test]
    fn test_unique_index_requires_entity_return() {
        let config = AutoCacheConfig::default();
        let schema = EntitySchema::new("User", "UserMapper", "users").query(
            QueryDeclaration::new("countByMobile", &["mobile"], ReturnShape::Value)
                .options(CacheOptions::new().unique_index()),
        );
        let result = OperationRegistry::builder(&config).entity(schema).build();
        assert!(matches!(
            result,
            Err(crate::error::AutoCacheError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_duplicate_mapper_rejected() {
        let config = AutoCacheConfig::default();
        let result = OperationRegistry::builder(&config)
            .entity(user_schema())
            .entity(user_schema())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_cross_mapper_evict_on() {
        let config = AutoCacheConfig::default();
        let order = EntitySchema::new("Order", "OrderMapper", "orders")
            .fields(&["user_id"])
            .query(
                QueryDeclaration::new("countByUser", &["user_id"], ReturnShape::Value)
                    .options(CacheOptions::new().evict_on(&["UserMapper.*", "cancel"])),
            )
            .mutation("cancel", SqlCommandType::Update);

        let registry = OperationRegistry::builder(&config)
            .entity(user_schema())
            .entity(order)
            .build()
            .unwrap();

        for method in ["insert", "updateStatus", "batchUpdateByPrimaryKeys"] {
            let targets = registry
                .custom_targets(&format!("UserMapper.{}", method))
                .unwrap();
            assert!(targets.contains(&"OrderMapper.countByUser".to_string()));
        }
        assert_eq!(
            registry.custom_targets("OrderMapper.cancel").unwrap(),
            &["OrderMapper.countByUser".to_string()]
        );
    }

    #[test]
    fn test_unknown_evict_on_mapper_rejected() {
        let config = AutoCacheConfig::default();
        let schema = EntitySchema::new("User", "UserMapper", "users").query(
            QueryDeclaration::new("findAll", &[], ReturnShape::EntityList)
                .options(CacheOptions::new().evict_on(&["GhostMapper.*"])),
        );
        assert!(OperationRegistry::builder(&config).entity(schema).build().is_err());
    }

    #[test]
    fn test_mutation_kind() {
        let config = AutoCacheConfig::default();
        let registry = OperationRegistry::builder(&config)
            .entity(user_schema())
            .build()
            .unwrap();

        assert_eq!(
            registry.mutation_kind("UserMapper.updateByPrimaryKey", SqlCommandType::Update),
            MutationKind::ByPrimaryKey
        );
        assert_eq!(
            registry.mutation_kind("UserMapper.batchUpdateByPrimaryKeys", SqlCommandType::Update),
            MutationKind::BatchByPrimaryKeys
        );
        assert_eq!(
            registry.mutation_kind("UserMapper.updateStatus", SqlCommandType::Update),
            MutationKind::Predicate
        );
        assert_eq!(
            registry.mutation_kind("UserMapper.importUsers", SqlCommandType::Insert),
            MutationKind::GroupOnly
        );
    }

    #[test]
    fn test_cache_ignore_mapper() {
        let config = AutoCacheConfig::default();
        let registry = OperationRegistry::builder(&config)
            .entity(user_schema().cache_ignore())
            .build()
            .unwrap();

        assert!(!registry.is_cache_enabled("UserMapper"));
        assert!(registry.query_metadata("UserMapper.selectByPrimaryKey").is_none());
        assert!(registry.mapper("UserMapper").is_some());
    }
}
