//! 查询缓存读路径
//!
//! 执行前探测缓存、加防击穿锁；执行后回填结果、维护指针与缓存组

use super::cache_manager::CacheManager;
use super::key_generator::{KeyCodec, NULL_PLACEHOLDER};
use super::record_cache::CachedEntry;
use super::stats::CacheCounters;
use crate::metadata::QueryCacheMethodMetadata;
use crate::types::{CallContext, CallParameter, DataValue, ExecutionResult};
use rand::Rng;
use rat_logger::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 未命中时携带到执行后的读凭据
#[derive(Debug, Clone)]
pub struct ReadTicket {
    pub(crate) metadata: Arc<QueryCacheMethodMetadata>,
    pub(crate) cache_key: String,
    /// 持有的防击穿锁
    pub(crate) lock_key: Option<String>,
    /// 为 false 时执行后不回填（等锁超时后的旁路读取）
    pub(crate) populate: bool,
}

impl ReadTicket {
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn holds_lock(&self) -> bool {
        self.lock_key.is_some()
    }
}

/// 读路径的探测结果
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    /// 未注册或当前调用跳过缓存
    Uncached,
    /// 命中，直接返回
    Hit(Vec<DataValue>),
    /// 未命中，执行后需要回填
    Miss(ReadTicket),
}

impl CacheManager {
    /// 执行前探测缓存
    pub async fn begin_read(
        &self,
        operation_id: &str,
        parameter: &CallParameter,
        context: &CallContext,
    ) -> ReadOutcome {
        if !self.config.enabled || context.force_primary {
            return ReadOutcome::Uncached;
        }
        let Some(metadata) = self.registry.query_metadata(operation_id) else {
            return ReadOutcome::Uncached;
        };

        let cache_key = KeyCodec::derive_key(&metadata, parameter, context);
        if let Some(rows) = self.probe(&metadata, &cache_key, parameter).await {
            return ReadOutcome::Hit(rows);
        }
        CacheCounters::incr(&self.counters.misses);

        if metadata.concurrency {
            return ReadOutcome::Miss(ReadTicket {
                metadata,
                cache_key,
                lock_key: None,
                populate: true,
            });
        }

        let lock_key = KeyCodec::lock_key(&cache_key);
        let acquired = self
            .store
            .set_if_absent(&lock_key, "1", self.config.lock_expire_secs)
            .await;
        match self.absorb("加锁", &lock_key, acquired) {
            Some(true) => {
                // 拿到锁后再确认一次，避免前一个持锁者刚回填完
                if let Some(rows) = self.probe(&metadata, &cache_key, parameter).await {
                    self.release_lock(&lock_key).await;
                    return ReadOutcome::Hit(rows);
                }
                debug!("获取防击穿锁: {}", lock_key);
                ReadOutcome::Miss(ReadTicket {
                    metadata,
                    cache_key,
                    lock_key: Some(lock_key),
                    populate: true,
                })
            }
            Some(false) => {
                CacheCounters::incr(&self.counters.lock_contentions);
                self.wait_for_holder(metadata, cache_key, lock_key, parameter).await
            }
            None => ReadOutcome::Miss(ReadTicket {
                metadata,
                cache_key,
                lock_key: None,
                populate: true,
            }),
        }
    }

    /// 等待持锁者回填，超时或锁提前消失仍未命中时旁路读取
    async fn wait_for_holder(
        &self,
        metadata: Arc<QueryCacheMethodMetadata>,
        cache_key: String,
        lock_key: String,
        parameter: &CallParameter,
    ) -> ReadOutcome {
        let timeout = Duration::from_millis(self.config.lock_wait_timeout_ms);
        let poll = self.config.lock_poll_interval_ms;
        let started = Instant::now();

        while started.elapsed() < timeout {
            let jitter = rand::thread_rng().gen_range(0..=poll / 2);
            tokio::time::sleep(Duration::from_millis(poll + jitter)).await;

            if let Some(rows) = self.probe(&metadata, &cache_key, parameter).await {
                CacheCounters::incr(&self.counters.lock_wait_hits);
                return ReadOutcome::Hit(rows);
            }
            let held = self.store.exists(&lock_key).await;
            if !self.absorb("检查锁", &lock_key, held).unwrap_or(false) {
                if let Some(rows) = self.probe(&metadata, &cache_key, parameter).await {
                    CacheCounters::incr(&self.counters.lock_wait_hits);
                    return ReadOutcome::Hit(rows);
                }
                break;
            }
        }

        warn!("等待防击穿锁未命中缓存，直接查询数据库: {}", cache_key);
        ReadOutcome::Miss(ReadTicket {
            metadata,
            cache_key,
            lock_key: None,
            populate: false,
        })
    }

    /// 探测缓存，命中时返回渲染后的行
    async fn probe(
        &self,
        metadata: &QueryCacheMethodMetadata,
        cache_key: &str,
        parameter: &CallParameter,
    ) -> Option<Vec<DataValue>> {
        let entry = if metadata.is_second_query_by_id() {
            self.read_through_pointer(cache_key).await
        } else {
            let direct = self.read_entry(cache_key).await;
            if metadata.ref_key.is_some() && !matches!(direct, Some(CachedEntry::Value(_))) {
                self.read_ref_key(metadata, parameter).await.or(direct)
            } else {
                direct
            }
        }?;

        CacheCounters::incr(&self.counters.hits);
        if entry == CachedEntry::Null {
            CacheCounters::incr(&self.counters.null_hits);
        }
        debug!("命中缓存: {}", cache_key);
        Some(entry.into_rows())
    }

    /// 读指针并解引用主键缓存
    async fn read_through_pointer(&self, cache_key: &str) -> Option<CachedEntry> {
        let pointer = self.read_raw(cache_key).await?;
        if pointer == NULL_PLACEHOLDER {
            return Some(CachedEntry::Null);
        }
        match self.read_entry(&pointer).await {
            Some(CachedEntry::Value(value)) => Some(CachedEntry::Value(value)),
            _ => None,
        }
    }

    /// 参数中带有引用实体主键时直接读取对方的主键缓存
    async fn read_ref_key(
        &self,
        metadata: &QueryCacheMethodMetadata,
        parameter: &CallParameter,
    ) -> Option<CachedEntry> {
        let ref_key = metadata.ref_key.as_deref()?;
        let value = parameter.lookup(ref_key, &metadata.param_names)?;
        let pk = self.registry.pk_metadata(&metadata.mapper)?;
        let key = KeyCodec::canonical_key_for_value(&pk, value)?;
        match self.read_entry(&key).await {
            Some(CachedEntry::Value(value)) => {
                debug!("通过引用键命中主键缓存: {}", key);
                Some(CachedEntry::Value(value))
            }
            _ => None,
        }
    }

    /// 执行后回填缓存并释放锁
    pub async fn finish_read(&self, ticket: ReadTicket, result: &ExecutionResult, context: &CallContext) {
        if ticket.populate {
            if let ExecutionResult::Rows(rows) = result {
                self.populate(&ticket, rows, context).await;
            }
        }
        if let Some(lock_key) = &ticket.lock_key {
            self.release_lock(lock_key).await;
        }
    }

    async fn populate(&self, ticket: &ReadTicket, rows: &[DataValue], context: &CallContext) {
        let metadata = &ticket.metadata;
        let cache_key = ticket.cache_key.as_str();

        if rows.is_empty() {
            if metadata.is_group_related() {
                self.track_in_group(&metadata.group_key, cache_key).await;
            }
            if self.config.null_value_cache {
                self.write_null(cache_key).await;
            }
            return;
        }

        if metadata.is_second_query_by_id() {
            self.populate_pointer(metadata, cache_key, &rows[0]).await;
            return;
        }

        let value = if metadata.collection_result {
            DataValue::Array(rows.to_vec())
        } else {
            rows[0].clone()
        };
        if metadata.is_group_related() {
            self.track_in_group(&metadata.group_key, cache_key).await;
        }
        self.write_entry(cache_key, &value, metadata.expire_secs).await;

        if metadata.is_pk {
            self.populate_second_keys(metadata, &value, context).await;
        }
    }

    /// 二次按主键查询：回填主键缓存，再写指向它的指针
    async fn populate_pointer(&self, metadata: &QueryCacheMethodMetadata, cache_key: &str, row: &DataValue) {
        let Some(pk) = self.registry.pk_metadata(&metadata.mapper) else {
            return;
        };
        let Some(canonical_key) = KeyCodec::canonical_key_for_row(&pk, row) else {
            warn!("结果缺少主键字段 {}，跳过缓存: {}", pk.id_field, cache_key);
            return;
        };
        self.write_entry_if_absent(&canonical_key, row, pk.expire_secs).await;
        self.track_in_group(&metadata.group_key, cache_key).await;
        self.write_pointer(cache_key, &canonical_key, metadata.expire_secs).await;
    }

    /// 按主键查询后，顺带为同 Mapper 的二次查询方法写入指针
    async fn populate_second_keys(&self, pk: &QueryCacheMethodMetadata, row: &DataValue, context: &CallContext) {
        let Some(canonical_key) = KeyCodec::canonical_key_for_row(pk, row) else {
            return;
        };
        for method in self.registry.second_query_methods(&pk.mapper) {
            let values: Option<Vec<DataValue>> = method
                .key_field_names
                .iter()
                .map(|field| row.get_field(field).filter(|v| !v.is_null()).cloned())
                .collect();
            let Some(values) = values else {
                continue;
            };
            match KeyCodec::derive_key_from_values(&method, &values, context) {
                Ok(key) => {
                    self.track_in_group(&method.group_key, &key).await;
                    self.write_pointer(&key, &canonical_key, method.expire_secs).await;
                }
                Err(e) => warn!("生成二次查询缓存键失败: {}, {}", method.operation_id, e),
            }
        }
    }
}
