use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::common::error::Result;

// ==========================================
// 共享键值存储接口 (KvStore)
// ==========================================

/// 共享键值存储接口
///
/// **职责**: Orchestrator 与外部 Evaluator 之间唯一的共享资源。
/// **约定**:
/// - 单个 Key 的值永远整体替换 (replace-whole-value)，不做增量修改，避免读到半截数据。
/// - 读方必须容忍记录在两次读取之间消失或变化 (每次重新读，不缓存)。
/// - 不同 Key 之间互不影响，实现必须支持并发访问。
/// - 通常由 Redis 或内存实现
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// 读取 Key 的完整值
    ///
    /// - `Ok(None)`: 记录不存在
    /// - `Err(LscError::MalformedStatusRecord)`: 记录存在但不是合法 UTF-8 文本
    /// - 其他 `Err(_)`: 存储本身故障 (由错误类型决定是否可重试)
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 写入 Key (整体覆盖)
    ///
    /// 如果 Key 已存在，旧值被原子替换，并发读者要么看到旧值，要么看到新值。
    async fn put(&self, key: &str, value: String) -> Result<()>;

    /// 删除 Key
    ///
    /// Key 不存在时也返回 Ok。
    async fn delete(&self, key: &str) -> Result<()>;

    /// 变更通知 (可选)
    ///
    /// 返回 Some 时，实现层应在每次 put/delete 后调用 `notify_waiters()`，
    /// 轮询方据此提前醒来重新读取。返回 None 表示只能纯轮询。
    fn change_notifier(&self) -> Option<Arc<Notify>> {
        None
    }
}

// 让 Arc<Store> 自动实现 KvStore
#[async_trait]
impl<S> KvStore for Arc<S>
where
    S: KvStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        (**self).put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    fn change_notifier(&self) -> Option<Arc<Notify>> {
        (**self).change_notifier()
    }
}
