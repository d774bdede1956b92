//! Redis 缓存存储
//!
//! 生产环境使用的缓存存储，多个进程实例通过同一个 Redis 协调防击穿锁和缓存组

use super::store::CacheStore;
use anyhow::Result;
use async_trait::async_trait;
use rat_logger::info;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Redis 缓存存储
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
    /// 键前缀，便于多个应用共享同一个 Redis 库
    prefix: String,
}

impl RedisCacheStore {
    /// 连接 Redis
    ///
    /// # 参数
    ///
    /// * `url` - 连接地址，如 `redis://127.0.0.1:6379/0`
    /// * `prefix` - 键前缀，可为空
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        let prefix = prefix.into();
        info!("Redis 缓存存储已连接: url={}, prefix={}", url, prefix);
        Ok(Self { connection, prefix })
    }

    /// 检测连接是否可用
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(self.prefixed(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, expire_secs: u64) -> Result<()> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.prefixed(key)).arg(value);
        if expire_secs > 0 {
            cmd.arg("EX").arg(expire_secs);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, expire_secs: u64) -> Result<bool> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.prefixed(key)).arg(value).arg("NX");
        if expire_secs > 0 {
            cmd.arg("EX").arg(expire_secs);
        }
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        let prefixed: Vec<String> = keys.iter().map(|k| self.prefixed(k)).collect();
        let removed: u64 = conn.del(prefixed).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(self.prefixed(key)).await?;
        Ok(exists)
    }

    async fn expire(&self, key: &str, expire_secs: u64) -> Result<bool> {
        let mut conn = self.connection.clone();
        let applied: bool = redis::cmd("EXPIRE")
            .arg(self.prefixed(key))
            .arg(expire_secs)
            .query_async(&mut conn)
            .await?;
        Ok(applied)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.connection.clone();
        // -2 不存在，-1 永不过期
        let remaining: i64 = redis::cmd("TTL")
            .arg(self.prefixed(key))
            .query_async(&mut conn)
            .await?;
        Ok(if remaining >= 0 { Some(remaining as u64) } else { None })
    }

    async fn list_push(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.rpush(self.prefixed(key), member).await?;
        Ok(())
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.connection.clone();
        let len: usize = conn.llen(self.prefixed(key)).await?;
        Ok(len)
    }

    async fn list_range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>> {
        if stop <= start {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        let members: Vec<String> = redis::cmd("LRANGE")
            .arg(self.prefixed(key))
            .arg(start)
            .arg(stop - 1)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let added: u64 = conn.sadd(self.prefixed(key), member).await?;
        Ok(added > 0)
    }
}
