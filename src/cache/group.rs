//! 缓存组清理
//!
//! 缓存组是一个只追加的成员键列表，配合成员集合保证每个键只登记一次，
//! 清理时分批读取成员并删除

use super::cache_manager::CacheManager;
use super::key_generator::KeyCodec;
use super::stats::CacheCounters;
use rat_logger::{debug, info};

impl CacheManager {
    /// 清理缓存组，返回删除的键数量
    ///
    /// `prefixes` 为空时删除全部成员，否则只删除包含任一前缀的成员。
    /// 成员列表本身不做修剪，过长时设置保护过期时间
    pub async fn clear_group(&self, group_key: &str, prefixes: &[String]) -> u64 {
        let len = self.store.list_len(group_key).await;
        let len = self.absorb("读取缓存组", group_key, len).unwrap_or(0);
        if len == 0 {
            return 0;
        }

        let batch_size = self.config.group_batch_size.max(1);
        if len > batch_size {
            let secs = self.group_safety_expire_secs();
            // 成员集合先于列表过期，两者之间的空档只会造成重复登记
            let members_key = KeyCodec::group_members_key(group_key);
            let applied = self.store.expire(&members_key, secs).await;
            self.absorb("设置缓存组过期", &members_key, applied);
            let applied = self.store.expire(group_key, secs).await;
            self.absorb("设置缓存组过期", group_key, applied);
            debug!("缓存组 {} 成员数 {} 超过批次大小，{}s 后过期", group_key, len, secs);
        }

        // 列表只追加，清理期间新登记的成员落在 len 之后，已读下标不会错位
        let mut removed = 0;
        let mut start = 0;
        while start < len {
            let stop = (start + batch_size).min(len);
            let members = self.store.list_range(group_key, start, stop).await;
            let Some(members) = self.absorb("读取缓存组", group_key, members) else {
                break;
            };
            let keys: Vec<String> = members
                .into_iter()
                .filter(|key| prefixes.is_empty() || prefixes.iter().any(|p| key.contains(p.as_str())))
                .collect();
            removed += self.remove_keys(&keys).await;
            start = stop;
        }

        CacheCounters::incr(&self.counters.group_clears);
        info!(
            "清理缓存组: group={}, prefixes={:?}, removed={}",
            group_key, prefixes, removed
        );
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{CacheStore, MemoryCacheStore};
    use crate::config::AutoCacheConfig;
    use crate::metadata::OperationRegistry;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, OnceLock};

    /// 第一次分页读取后，模拟另一个调用方重新登记已读过的成员
    struct RepopulatingStore {
        inner: MemoryCacheStore,
        manager: OnceLock<CacheManager>,
        fired: AtomicBool,
    }

    #[async_trait]
    impl CacheStore for RepopulatingStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str, expire_secs: u64) -> Result<()> {
            self.inner.set(key, value, expire_secs).await
        }
        async fn set_if_absent(&self, key: &str, value: &str, expire_secs: u64) -> Result<bool> {
            self.inner.set_if_absent(key, value, expire_secs).await
        }
        async fn delete(&self, keys: &[String]) -> Result<u64> {
            self.inner.delete(keys).await
        }
        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }
        async fn expire(&self, key: &str, expire_secs: u64) -> Result<bool> {
            self.inner.expire(key, expire_secs).await
        }
        async fn ttl(&self, key: &str) -> Result<Option<u64>> {
            self.inner.ttl(key).await
        }
        async fn list_push(&self, key: &str, member: &str) -> Result<()> {
            self.inner.list_push(key, member).await
        }
        async fn list_len(&self, key: &str) -> Result<usize> {
            self.inner.list_len(key).await
        }
        async fn list_range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>> {
            let members = self.inner.list_range(key, start, stop).await?;
            if !self.fired.swap(true, Ordering::SeqCst) {
                if let Some(manager) = self.manager.get() {
                    manager.track_in_group(key, "k1").await;
                }
                // 绕过成员集合的重复追加同样不能让后续成员错位
                self.inner.list_push(key, "k2").await?;
            }
            Ok(members)
        }
        async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
            self.inner.set_add(key, member).await
        }
    }

    #[tokio::test]
    async fn test_registration_between_pages_keeps_later_members() {
        let store = Arc::new(RepopulatingStore {
            inner: MemoryCacheStore::new(),
            manager: OnceLock::new(),
            fired: AtomicBool::new(false),
        });
        let config = AutoCacheConfig {
            group_batch_size: 2,
            ..AutoCacheConfig::default()
        };
        let manager = CacheManager::new(store.clone(), config, Arc::new(OperationRegistry::default()));

        for key in ["k1", "k2", "k3"] {
            manager.track_in_group("User~keys", key).await;
            store.inner.set(key, "\"v\"", 0).await.unwrap();
        }
        assert!(store.manager.set(manager.clone()).is_ok());

        let removed = manager.clear_group("User~keys", &[]).await;
        assert_eq!(removed, 3);
        for key in ["k1", "k2", "k3"] {
            assert_eq!(store.inner.get(key).await.unwrap(), None);
        }
        // 已登记的成员不会再次追加
        assert_eq!(
            store.inner.list_range("User~keys", 0, 10).await.unwrap(),
            vec!["k1".to_string(), "k2".to_string(), "k3".to_string(), "k2".to_string()]
        );
    }
}
