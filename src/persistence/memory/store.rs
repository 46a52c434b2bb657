use async_trait::async_trait;
use std::sync::{Arc, atomic::Ordering};
use tokio::sync::Notify;

use super::MemoryStore;
use crate::common::error::Result;
use crate::persistence::traits::KvStore;

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        // 整体替换
        self.data.insert(key.to_string(), value);
        // 唤醒可能在休眠的轮询方
        self.notify.notify_waiters();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        if self.data.remove(key).is_some() {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    fn change_notifier(&self) -> Option<Arc<Notify>> {
        Some(self.notify.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::LscError;

    #[tokio::test]
    async fn put_replaces_whole_value() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.put("k", "{\"a\":1}".into()).await.unwrap();
        store.put("k", "{\"b\":2}".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("{\"b\":2}"));
        assert_eq!(store.len(), 1);

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.is_empty());

        let stats = store.stats();
        assert_eq!((stats.gets, stats.puts, stats.deletes), (2, 2, 2));
        assert_eq!(stats.total(), 6);
    }

    #[tokio::test]
    async fn clones_share_data() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.put("lsc:s1:h", "1".into()).await.unwrap();
        assert_eq!(b.get("lsc:s1:h").await.unwrap().as_deref(), Some("1"));
        assert_eq!(b.stats().puts, 1);
    }

    #[tokio::test]
    async fn injected_outage_is_transient() {
        let store = MemoryStore::new();
        store.fail_next(2);
        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, LscError::StoreUnavailable(_)));
        assert!(err.is_retryable());
        assert!(store.put("k", "v".into()).await.is_err());
        // 配额耗尽后恢复正常，失败的 put 没有留下数据
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_wakes_waiters() {
        let store = MemoryStore::new();
        let notify = store.change_notifier().unwrap();
        let waiter = tokio::spawn(async move { notify.notified().await });
        // 让 waiter 先挂起
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.put("k", "v".into()).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be notified")
            .unwrap();
    }
}
