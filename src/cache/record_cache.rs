//! 缓存条目读写模块
//!
//! 负载、空值占位符、指针与缓存组成员的读写。
//! 存储故障在这里被吸收：读退化为未命中，写记录日志后忽略

use super::cache_manager::CacheManager;
use super::key_generator::{KeyCodec, NULL_PLACEHOLDER};
use super::stats::CacheCounters;
use crate::types::DataValue;
use rat_logger::{debug, warn};

/// 读取到的缓存条目
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CachedEntry {
    /// 空值占位符
    Null,
    /// 实体/结果负载
    Value(DataValue),
}

impl CachedEntry {
    /// 渲染为返回给调用方的行：占位符为空集合，集合展开，单值包一层
    pub(crate) fn into_rows(self) -> Vec<DataValue> {
        match self {
            CachedEntry::Null => Vec::new(),
            CachedEntry::Value(DataValue::Array(items)) => items,
            CachedEntry::Value(value) => vec![value],
        }
    }
}

impl CacheManager {
    /// 读取原始字符串
    pub(crate) async fn read_raw(&self, key: &str) -> Option<String> {
        let result = self.store.get(key).await;
        self.absorb("读取", key, result).flatten()
    }

    /// 读取负载或占位符，无法解析的负载按未命中处理
    pub(crate) async fn read_entry(&self, key: &str) -> Option<CachedEntry> {
        let raw = self.read_raw(key).await?;
        if raw == NULL_PLACEHOLDER {
            return Some(CachedEntry::Null);
        }
        match DataValue::from_json_string(&raw) {
            Ok(value) => Some(CachedEntry::Value(value)),
            Err(e) => {
                warn!("缓存负载无法解析，按未命中处理: key={}, error={}", key, e);
                None
            }
        }
    }

    /// 写入负载
    pub(crate) async fn write_entry(&self, key: &str, value: &DataValue, expire_secs: u64) -> bool {
        let payload = match value.to_json_string() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("缓存负载序列化失败，跳过写入: key={}, error={}", key, e);
                return false;
            }
        };
        let result = self.store.set(key, &payload, expire_secs).await;
        let written = self.absorb("写入", key, result).is_some();
        if written {
            CacheCounters::incr(&self.counters.writes);
            debug!("写入缓存: key={}, expire={}s", key, expire_secs);
        }
        written
    }

    /// 键不存在时写入负载
    pub(crate) async fn write_entry_if_absent(&self, key: &str, value: &DataValue, expire_secs: u64) -> bool {
        let payload = match value.to_json_string() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("缓存负载序列化失败，跳过写入: key={}, error={}", key, e);
                return false;
            }
        };
        let result = self.store.set_if_absent(key, &payload, expire_secs).await;
        let written = self.absorb("写入", key, result).unwrap_or(false);
        if written {
            CacheCounters::incr(&self.counters.writes);
            debug!("补充主键缓存: key={}", key);
        }
        written
    }

    /// 写入空值占位符
    pub(crate) async fn write_null(&self, key: &str) {
        let expire_secs = self.config.null_value_expire_secs;
        let result = self.store.set(key, NULL_PLACEHOLDER, expire_secs).await;
        if self.absorb("写入占位符", key, result).is_some() {
            CacheCounters::incr(&self.counters.writes);
            debug!("写入空值占位符: key={}, expire={}s", key, expire_secs);
        }
    }

    /// 写入指向主键缓存的指针
    pub(crate) async fn write_pointer(&self, key: &str, canonical_key: &str, expire_secs: u64) {
        let result = self.store.set(key, canonical_key, expire_secs).await;
        if self.absorb("写入引用", key, result).is_some() {
            CacheCounters::incr(&self.counters.writes);
            debug!("写入引用缓存: key={} -> {}", key, canonical_key);
        }
    }

    /// 登记到缓存组，必须在写入对应键之前调用
    pub(crate) async fn track_in_group(&self, group_key: &str, key: &str) {
        let members_key = KeyCodec::group_members_key(group_key);
        let added = self.store.set_add(&members_key, key).await;
        // 已登记过的成员不再追加，集合不可用时宁可重复追加
        if self.absorb("登记缓存组成员", &members_key, added) == Some(false) {
            return;
        }
        let result = self.store.list_push(group_key, key).await;
        self.absorb("登记缓存组", group_key, result);
    }

    /// 删除一批缓存键，返回删除数量
    pub async fn remove_keys(&self, keys: &[String]) -> u64 {
        if keys.is_empty() {
            return 0;
        }
        let result = self.store.delete(keys).await;
        let removed = self.absorb("删除", &keys.join(","), result).unwrap_or(0);
        CacheCounters::add(&self.counters.removed_keys, removed);
        debug!("删除缓存: keys={:?}, removed={}", keys, removed);
        removed
    }

    /// 释放防击穿锁
    pub(crate) async fn release_lock(&self, lock_key: &str) {
        let result = self.store.delete(&[lock_key.to_string()]).await;
        self.absorb("释放锁", lock_key, result);
    }
}
