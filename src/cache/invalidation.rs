//! 变更失效写路径
//!
//! 根据变更操作与参数规划失效任务，再由后台工作池执行

use super::cache_manager::CacheManager;
use super::key_generator::KeyCodec;
use super::stats::CacheCounters;
use crate::error::AutoCacheResult;
use crate::metadata::{MapperInfo, MutationKind, split_operation_id};
use crate::rewrite::PredicateResolver;
use crate::types::{BoundSql, CallParameter, DataValue, ExecutionResult, SqlCommandType};
use crate::worker::{InvalidationTask, TaskEnvelope, TaskRunner};
use async_trait::async_trait;
use rat_logger::{debug, error, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// 批量主键参数可能使用的参数名
const BATCH_PARAM_NAMES: [&str; 3] = ["arg0", "param1", "ids"];
/// 单主键参数在参数映射中的备选名
const ID_PARAM_NAMES: [&str; 2] = ["arg0", "param1"];

impl CacheManager {
    /// 需要在执行前捕获主键的条件变更，返回所属 Mapper
    pub(crate) fn predicate_capture_target(
        &self,
        operation_id: &str,
        command: SqlCommandType,
    ) -> Option<&MapperInfo> {
        if !self.config.enabled || !command.is_mutation() {
            return None;
        }
        let (mapper, _) = split_operation_id(operation_id)?;
        let info = self.registry.mapper(mapper)?;
        if !info.cache_enabled {
            return None;
        }
        match self.registry.mutation_kind(operation_id, command) {
            MutationKind::Predicate => Some(info),
            _ => None,
        }
    }

    /// 规划变更操作的失效任务
    ///
    /// `captured` 为执行前已捕获的主键（或捕获失败的错误），为 None 时按需交给后台反查
    pub fn plan_invalidation(
        &self,
        operation_id: &str,
        command: SqlCommandType,
        parameter: &CallParameter,
        bound_sql: Option<&BoundSql>,
        captured: Option<AutoCacheResult<Vec<String>>>,
        result: &ExecutionResult,
    ) -> Vec<InvalidationTask> {
        if !self.config.enabled || !command.is_mutation() {
            return Vec::new();
        }
        match result {
            ExecutionResult::Affected(0) => {
                debug!("变更未影响任何行，跳过缓存失效: {}", operation_id);
                return Vec::new();
            }
            ExecutionResult::Failed => return Vec::new(),
            _ => {}
        }

        let mut tasks = Vec::new();
        let mapper = split_operation_id(operation_id).map(|(mapper, _)| mapper);
        let info = mapper.and_then(|m| self.registry.mapper(m)).filter(|i| i.cache_enabled);

        if let Some(info) = info {
            match self.registry.mutation_kind(operation_id, command) {
                MutationKind::ByPrimaryKey => match primary_key_of(parameter, &info.id_field) {
                    Some(id) => tasks.push(InvalidationTask::RemoveKeys {
                        keys: vec![KeyCodec::canonical_key(&info.entity, &id)],
                    }),
                    None if command == SqlCommandType::Insert => {
                        debug!("插入参数未携带主键，只清理缓存组: {}", operation_id);
                    }
                    None => warn!("变更参数中找不到主键 {}，只清理缓存组: {}", info.id_field, operation_id),
                },
                MutationKind::BatchByPrimaryKeys => {
                    let keys: Vec<String> = primary_keys_of(parameter)
                        .into_iter()
                        .map(|id| KeyCodec::canonical_key(&info.entity, &id))
                        .collect();
                    if !keys.is_empty() {
                        tasks.push(InvalidationTask::RemoveKeys { keys });
                    }
                }
                MutationKind::Predicate => match (captured, bound_sql) {
                    (Some(Ok(ids)), _) => {
                        let keys: Vec<String> = ids
                            .iter()
                            .map(|id| KeyCodec::canonical_key(&info.entity, id))
                            .collect();
                        if !keys.is_empty() {
                            tasks.push(InvalidationTask::RemoveKeys { keys });
                        }
                    }
                    (Some(Err(e)), _) => {
                        warn!("反查条件变更主键失败，清理整个缓存组: {}, {}", operation_id, e);
                        CacheCounters::incr(&self.counters.predicate_fallbacks);
                        tasks.push(InvalidationTask::ClearGroup {
                            group_key: info.group_key(),
                            prefixes: Vec::new(),
                        });
                    }
                    (None, Some(bound_sql)) => tasks.push(InvalidationTask::ResolvePredicate {
                        mapper: info.mapper.clone(),
                        entity: info.entity.clone(),
                        id_column: info.id_column.clone(),
                        group_key: info.group_key(),
                        bound_sql: bound_sql.clone(),
                    }),
                    (None, None) => {
                        warn!("条件变更缺少绑定SQL，清理整个缓存组: {}", operation_id);
                        CacheCounters::incr(&self.counters.predicate_fallbacks);
                        tasks.push(InvalidationTask::ClearGroup {
                            group_key: info.group_key(),
                            prefixes: Vec::new(),
                        });
                    }
                },
                MutationKind::GroupOnly => {}
            }

            tasks.push(InvalidationTask::ClearGroup {
                group_key: info.group_key(),
                prefixes: Vec::new(),
            });
        }

        tasks.extend(self.custom_invalidation(operation_id));
        dedup_group_clears(tasks)
    }

    /// 自定义失效关系：按目标查询所在的缓存组合并前缀
    fn custom_invalidation(&self, operation_id: &str) -> Vec<InvalidationTask> {
        let Some(targets) = self.registry.custom_targets(operation_id) else {
            return Vec::new();
        };
        let mut by_group: Vec<(String, Vec<String>)> = Vec::new();
        for target in targets {
            let Some(metadata) = self.registry.query_metadata(target) else {
                continue;
            };
            let prefix = metadata.key_prefix().to_string();
            match by_group.iter_mut().find(|(group, _)| *group == metadata.group_key) {
                Some((_, prefixes)) => {
                    if !prefixes.contains(&prefix) {
                        prefixes.push(prefix);
                    }
                }
                None => by_group.push((metadata.group_key.clone(), vec![prefix])),
            }
        }
        by_group
            .into_iter()
            .map(|(group_key, prefixes)| InvalidationTask::ClearGroup { group_key, prefixes })
            .collect()
    }
}

/// 同一缓存组已整组清理时，去掉该组的前缀清理任务
fn dedup_group_clears(tasks: Vec<InvalidationTask>) -> Vec<InvalidationTask> {
    let full_groups: Vec<String> = tasks
        .iter()
        .filter_map(|task| match task {
            InvalidationTask::ClearGroup { group_key, prefixes } if prefixes.is_empty() => {
                Some(group_key.clone())
            }
            _ => None,
        })
        .collect();

    let mut seen_full = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| match task {
            InvalidationTask::ClearGroup { group_key, prefixes } if prefixes.is_empty() => {
                seen_full.insert(group_key.clone())
            }
            InvalidationTask::ClearGroup { group_key, .. } => !full_groups.contains(group_key),
            _ => true,
        })
        .collect()
}

fn key_text(value: &DataValue) -> Option<String> {
    if value.is_null() {
        return None;
    }
    value.to_key_text().ok().filter(|text| !text.is_empty())
}

/// 从变更参数中取单个主键
fn primary_key_of(parameter: &CallParameter, id_field: &str) -> Option<String> {
    match parameter {
        CallParameter::Entity(fields) => fields.get(id_field).and_then(key_text),
        CallParameter::Named(fields) => std::iter::once(id_field)
            .chain(ID_PARAM_NAMES)
            .find_map(|name| fields.get(name).and_then(key_text)),
        CallParameter::Scalar(value) => key_text(value),
        CallParameter::Positional(values) => values.first().and_then(key_text),
        CallParameter::List(_) | CallParameter::None => None,
    }
}

/// 从批量变更参数中取主键列表
fn primary_keys_of(parameter: &CallParameter) -> Vec<String> {
    let items: &[DataValue] = match parameter {
        CallParameter::List(values) => values,
        CallParameter::Positional(values) => match values.first() {
            Some(DataValue::Array(items)) => items,
            _ => &[],
        },
        CallParameter::Scalar(DataValue::Array(items)) => items,
        CallParameter::Named(fields) => match BATCH_PARAM_NAMES.iter().find_map(|n| fields.get(*n)) {
            Some(DataValue::Array(items)) => items,
            _ => &[],
        },
        _ => &[],
    };
    items.iter().filter_map(key_text).collect()
}

/// 失效任务执行器
pub struct InvalidationExecutor {
    manager: Arc<CacheManager>,
    resolver: Option<PredicateResolver>,
}

impl InvalidationExecutor {
    pub fn new(manager: Arc<CacheManager>, resolver: Option<PredicateResolver>) -> Self {
        Self { manager, resolver }
    }

    async fn resolve_predicate(
        &self,
        operation_id: &str,
        tenant_id: Option<&str>,
        entity: &str,
        id_column: &str,
        group_key: &str,
        bound_sql: &BoundSql,
    ) {
        let resolved = match &self.resolver {
            Some(resolver) => resolver.resolve_ids(bound_sql, id_column, tenant_id).await,
            None => Err(crate::autocache_error!(rewrite, "未配置主键反查执行器")),
        };
        match resolved {
            Ok(ids) => {
                let keys: Vec<String> = ids
                    .iter()
                    .map(|id| KeyCodec::canonical_key(entity, id))
                    .collect();
                debug!("条件变更 {} 反查到主键: {:?}", operation_id, ids);
                self.manager.remove_keys(&keys).await;
            }
            Err(e) => {
                error!("反查条件变更主键失败，清理整个缓存组 {}: {}, {}", group_key, operation_id, e);
                CacheCounters::incr(&self.manager.counters.predicate_fallbacks);
                self.manager.clear_group(group_key, &[]).await;
            }
        }
    }
}

#[async_trait]
impl TaskRunner for InvalidationExecutor {
    async fn run(&self, envelope: TaskEnvelope) {
        let TaskEnvelope {
            operation_id,
            tenant_id,
            task,
        } = envelope;
        match task {
            InvalidationTask::RemoveKeys { keys } => {
                self.manager.remove_keys(&keys).await;
            }
            InvalidationTask::ResolvePredicate {
                mapper: _,
                entity,
                id_column,
                group_key,
                bound_sql,
            } => {
                self.resolve_predicate(
                    &operation_id,
                    tenant_id.as_deref(),
                    &entity,
                    &id_column,
                    &group_key,
                    &bound_sql,
                )
                .await;
            }
            InvalidationTask::ClearGroup { group_key, prefixes } => {
                self.manager.clear_group(&group_key, &prefixes).await;
            }
        }
    }
}

impl std::fmt::Debug for InvalidationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationExecutor")
            .field("resolver", &self.resolver)
            .finish()
    }
}
