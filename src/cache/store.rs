//! 缓存存储适配模块
//!
//! 对外部KV缓存的薄封装，自动缓存的全部协调（防击穿锁、缓存组、指针）
//! 都通过这里的原子原语完成，进程内不持有任何权威副本

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// 缓存存储接口
///
/// `expire_secs` 为 0 时表示不过期
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 读取字符串值
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 写入字符串值
    async fn set(&self, key: &str, value: &str, expire_secs: u64) -> Result<()>;

    /// 仅当键不存在时写入，返回是否写入成功
    async fn set_if_absent(&self, key: &str, value: &str, expire_secs: u64) -> Result<bool>;

    /// 批量删除，返回实际删除的数量
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// 键是否存在
    async fn exists(&self, key: &str) -> Result<bool>;

    /// 为已存在的键设置过期时间，键不存在时返回false
    async fn expire(&self, key: &str, expire_secs: u64) -> Result<bool>;

    /// 剩余存活时间（秒），键不存在或永不过期时返回None
    async fn ttl(&self, key: &str) -> Result<Option<u64>>;

    /// 向列表尾部追加成员，只追加不移动，已有成员的位置保持不变
    async fn list_push(&self, key: &str, member: &str) -> Result<()>;

    /// 列表长度，键不存在时为0
    async fn list_len(&self, key: &str) -> Result<usize>;

    /// 读取列表区间 `[start, stop)`
    async fn list_range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>>;

    /// 向集合加入成员，返回是否为新成员
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
enum MemoryValue {
    Text(String),
    List(Vec<String>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: MemoryValue, expire_secs: u64) -> Self {
        Self {
            value,
            expires_at: deadline(expire_secs),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

fn deadline(expire_secs: u64) -> Option<Instant> {
    if expire_secs == 0 {
        None
    } else {
        Some(Instant::now() + Duration::from_secs(expire_secs))
    }
}

/// 进程内缓存存储
///
/// 基于 DashMap 的惰性过期实现，访问时发现过期即移除。
/// 语义与 Redis 的 SET NX / RPUSH / SADD 保持一致，适合单进程部署与测试
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前未过期的条目数
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清空全部条目
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// 读取未过期条目的克隆
    fn live(&self, key: &str) -> Option<MemoryEntry> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => return Some(entry.clone()),
            None => return None,
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
        }
        None
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.live(key) {
            Some(MemoryEntry {
                value: MemoryValue::Text(text),
                ..
            }) => Ok(Some(text)),
            Some(_) => Err(anyhow!("键 {} 不是字符串类型", key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, expire_secs: u64) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry::new(MemoryValue::Text(value.to_string()), expire_secs),
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, expire_secs: u64) -> Result<bool> {
        let now = Instant::now();
        let fresh = MemoryEntry::new(MemoryValue::Text(value.to_string()), expire_secs);
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live(key).is_some())
    }

    async fn expire(&self, key: &str, expire_secs: u64) -> Result<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = deadline(expire_secs);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let now = Instant::now();
        Ok(self
            .live(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now).as_secs()))
    }

    async fn list_push(&self, key: &str, member: &str) -> Result<()> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MemoryEntry::new(MemoryValue::List(Vec::new()), 0));
        if entry.is_expired(now) {
            *entry = MemoryEntry::new(MemoryValue::List(Vec::new()), 0);
        }
        match &mut entry.value {
            MemoryValue::List(members) => {
                members.push(member.to_string());
                Ok(())
            }
            _ => Err(anyhow!("键 {} 不是列表类型", key)),
        }
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        match self.live(key) {
            Some(MemoryEntry {
                value: MemoryValue::List(members),
                ..
            }) => Ok(members.len()),
            Some(_) => Err(anyhow!("键 {} 不是列表类型", key)),
            None => Ok(0),
        }
    }

    async fn list_range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>> {
        match self.live(key) {
            Some(MemoryEntry {
                value: MemoryValue::List(members),
                ..
            }) => {
                let stop = stop.min(members.len());
                if start >= stop {
                    return Ok(Vec::new());
                }
                Ok(members[start..stop].to_vec())
            }
            Some(_) => Err(anyhow!("键 {} 不是列表类型", key)),
            None => Ok(Vec::new()),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MemoryEntry::new(MemoryValue::Set(HashSet::new()), 0));
        if entry.is_expired(now) {
            *entry = MemoryEntry::new(MemoryValue::Set(HashSet::new()), 0);
        }
        match &mut entry.value {
            MemoryValue::Set(members) => Ok(members.insert(member.to_string())),
            _ => Err(anyhow!("键 {} 不是集合类型", key)),
        }
    }
}
