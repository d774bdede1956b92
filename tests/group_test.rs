//! 缓存组清理集成测试

mod common;

use common::Harness;
use rat_autocache::*;
use std::time::Duration;

/// 超过批次阈值的缓存组获得保护过期时间，过期后再清理是空操作
#[tokio::test]
async fn test_oversized_group_self_expires() {
    let config = AutoCacheConfig::builder()
        .group_batch_size(2)
        .group_safety_expire_secs(Some(1))
        .build()
        .unwrap();
    let h = Harness::new(config);

    for status in 0..3 {
        h.select("UserMapper.countByStatus", CallParameter::scalar(status)).await;
    }
    assert_eq!(h.store.list_len("User~keys").await.unwrap(), 3);

    let manager = h.handler.manager();
    let removed = manager.clear_group("User~keys", &[]).await;
    assert_eq!(removed, 3);
    for status in 0..3 {
        assert!(h.cached(&format!("User.countByStatus:{}", status)).await.is_none());
    }
    let ttl = h.store.ttl("User~keys").await.unwrap();
    println!("🔍 缓存组剩余存活时间: {:?}", ttl);
    assert!(ttl.is_some_and(|secs| secs <= 1));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.store.list_len("User~keys").await.unwrap(), 0);
    assert_eq!(manager.clear_group("User~keys", &[]).await, 0);
}

/// 未超过阈值的缓存组不设置过期时间
#[tokio::test]
async fn test_small_group_keeps_no_ttl() {
    let h = Harness::with_defaults();
    h.select("UserMapper.countByStatus", CallParameter::scalar(0)).await;

    h.handler.manager().clear_group("User~keys", &[]).await;
    assert_eq!(h.store.ttl("User~keys").await.unwrap(), None);
    // 成员列表不修剪
    assert_eq!(h.store.list_len("User~keys").await.unwrap(), 1);
}

/// 按前缀清理只删除匹配的成员
#[tokio::test]
async fn test_prefix_filtered_clear() {
    let h = Harness::with_defaults();
    h.select("UserMapper.countByStatus", CallParameter::scalar(0)).await;
    h.select("UserMapper.findByStatus", CallParameter::scalar(0)).await;

    let removed = h
        .handler
        .manager()
        .clear_group("User~keys", &["User.countByStatus:".to_string()])
        .await;
    assert_eq!(removed, 1);
    assert!(h.cached("User.countByStatus:0").await.is_none());
    assert!(h.cached("User.findByStatus:0").await.is_some());
}

/// 缓存组成员只登记一次
#[tokio::test]
async fn test_group_members_are_unique() {
    let config = AutoCacheConfig::builder().default_expire_secs(1).build().unwrap();
    let h = Harness::new(config);

    h.select("UserMapper.findByStatus", CallParameter::scalar(1)).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    h.select("UserMapper.findByStatus", CallParameter::scalar(1)).await;

    assert_eq!(h.db.query_calls(), 2);
    assert_eq!(
        h.store.list_range("User~keys", 0, 10).await.unwrap(),
        vec!["User.findByStatus:1".to_string()]
    );
}

/// 手动清理全部缓存组
#[tokio::test]
async fn test_clear_all_groups() {
    let h = Harness::with_defaults();
    h.select("UserMapper.findByStatus", CallParameter::scalar(0)).await;
    h.select("OrderMapper.countByUserId", CallParameter::scalar(1)).await;

    let removed = h.handler.manager().clear_all_groups().await;
    assert_eq!(removed, 2);
    assert!(h.cached("User.findByStatus:0").await.is_none());
    assert!(h.cached("Order.countByUserId:1").await.is_none());
}
