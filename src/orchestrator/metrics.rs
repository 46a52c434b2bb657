use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// 编排器核心指标
// 使用 Atomic 保证多主机并发下的计数性能
#[derive(Debug, Default)]
pub struct OrchestratorMetrics {
    // --- 瞬时状态 (Gauges) ---
    /// 当前正在等待结果的任务数
    pub active_jobs: AtomicUsize,

    // --- 累积计数 (Counters) ---
    /// 成功发布到 Store 的请求数
    pub total_published: AtomicU64,
    /// 状态读取次数
    pub total_polls: AtomicU64,
    /// 以 finished-* 结束的任务数 (含空包列表短路)
    pub total_done: AtomicU64,
    /// 包列表为空、未触达 Store 的任务数
    pub total_short_circuited: AtomicU64,
    /// Evaluator 报错或记录损坏的任务数
    pub total_failed: AtomicU64,
    /// 超时的任务数
    pub total_timed_out: AtomicU64,
    /// 被取消的任务数
    pub total_cancelled: AtomicU64,
    /// Store 暂时性故障重试次数
    pub total_store_retries: AtomicU64,
}

/// 指标快照 (可序列化，方便输出到日志或监控)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub active_jobs: usize,
    pub published: u64,
    pub polls: u64,
    pub done: u64,
    pub short_circuited: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub store_retries: u64,
}

impl OrchestratorMetrics {
    /// 增加活跃数 (开始等待)
    pub fn inc_active(&self) {
        self.active_jobs.fetch_add(1, Ordering::Relaxed);
    }

    /// 减少活跃数 (任务结束)
    pub fn dec_active(&self) {
        self.active_jobs.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_published(&self) {
        self.total_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_polls(&self) {
        self.total_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_done(&self) {
        self.total_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_short_circuited(&self) {
        self.total_short_circuited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timed_out(&self) {
        self.total_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancelled(&self) {
        self.total_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_store_retries(&self) {
        self.total_store_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_jobs: self.active_jobs.load(Ordering::Relaxed),
            published: self.total_published.load(Ordering::Relaxed),
            polls: self.total_polls.load(Ordering::Relaxed),
            done: self.total_done.load(Ordering::Relaxed),
            short_circuited: self.total_short_circuited.load(Ordering::Relaxed),
            failed: self.total_failed.load(Ordering::Relaxed),
            timed_out: self.total_timed_out.load(Ordering::Relaxed),
            cancelled: self.total_cancelled.load(Ordering::Relaxed),
            store_retries: self.total_store_retries.load(Ordering::Relaxed),
        }
    }
}

/// 活跃任务守卫 (RAII)
///
/// 无论任务以何种方式结束 (包括 Future 被 Drop)，活跃数都会被归还。
pub(crate) struct ActiveGuard<'a> {
    metrics: &'a OrchestratorMetrics,
}

impl<'a> ActiveGuard<'a> {
    pub(crate) fn new(metrics: &'a OrchestratorMetrics) -> Self {
        metrics.inc_active();
        Self { metrics }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.metrics.dec_active();
    }
}
