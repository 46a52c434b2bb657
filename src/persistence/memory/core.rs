use dashmap::DashMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};
use tokio::sync::Notify;

use crate::common::error::{LscError, Result};

/// 内存存储实现 (In-Memory Store)
///
/// - 单进程内模拟共享存储，Evaluator 与 Orchestrator 共用同一个实例 (Clone 廉价)。
/// - DashMap: 分片锁，不同 Key 的并发读写不排队；单 Key 的 insert 是整体替换。
/// - 自带访问计数，用于诊断和测试“零访问”之类的性质。
#[derive(Debug)]
pub struct MemoryStore {
    /// 【数据仓库】Key -> 完整 JSON 文本
    pub(super) data: Arc<DashMap<String, String>>,

    /// 变更通知信号
    pub(super) notify: Arc<Notify>,

    /// 访问计数
    pub(super) stats: Arc<StoreCounters>,

    /// 故障注入: 接下来 N 次操作返回 StoreUnavailable
    pub(super) fail_next: Arc<AtomicUsize>,
}

#[derive(Debug, Default)]
pub(super) struct StoreCounters {
    pub gets: AtomicU64,
    pub puts: AtomicU64,
    pub deletes: AtomicU64,
}

/// 访问计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub gets: u64,
    pub puts: u64,
    pub deletes: u64,
}

impl StoreStats {
    /// 总访问次数
    pub fn total(&self) -> u64 {
        self.gets + self.puts + self.deletes
    }
}

impl MemoryStore {
    /// 创建一个空的内存存储
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            notify: Arc::new(Notify::new()),
            stats: Arc::new(StoreCounters::default()),
            fail_next: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 当前访问计数快照 (包含失败的操作)
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            gets: self.stats.gets.load(Ordering::Relaxed),
            puts: self.stats.puts.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
        }
    }

    /// 当前记录数
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 故障注入: 接下来 `n` 次操作 (get/put/delete) 返回 StoreUnavailable
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// 消耗一次故障配额
    pub(super) fn check_available(&self) -> Result<()> {
        let consumed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match consumed {
            Ok(_) => Err(LscError::StoreUnavailable(
                "memory store: injected outage".into(),
            )),
            Err(_) => Ok(()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// Clone 实现：因为内部都是 Arc，所以 Clone 是廉价的，所有副本共享同一份数据
impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            notify: self.notify.clone(),
            stats: self.stats.clone(),
            fail_next: self.fail_next.clone(),
        }
    }
}
