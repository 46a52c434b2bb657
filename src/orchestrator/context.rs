use crate::{common::config::LscConfig, orchestrator::OrchestratorMetrics, persistence::KvStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 编排器上下文 (Orchestrator Context)
///
/// **职责**:
/// 打包了 Orchestrator 运行所需的所有全局资源，避免在函数调用时传递一长串参数。
/// 每个 (scan, host) 任务共享同一个上下文，但各自拥有独立的 Key 和轮询循环。
pub struct OrchestratorContext {
    // --- 核心组件 (Components) ---
    /// 共享存储 (get / put / delete)
    pub store: Arc<dyn KvStore>,

    /// 全局配置
    /// - 命名空间、轮询间隔、超时、清理策略等参数。
    pub config: Arc<LscConfig>,

    /// 全局统计指标
    pub metrics: Arc<OrchestratorMetrics>,

    // --- 信号与控制 (Signals & Control) ---
    /// 全局中止信号 (例如整个扫描器停机)
    pub shutdown: CancellationToken,
}

impl Clone for OrchestratorContext {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl OrchestratorContext {
    /// 创建一个新的上下文
    pub fn new(
        store: Arc<dyn KvStore>,
        config: LscConfig,
        metrics: Arc<OrchestratorMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            config: Arc::new(config),
            metrics,
            shutdown,
        }
    }
}

/// 单次任务的取消范围
///
/// 同时监听调用方传入的扫描级 Token 和编排器的全局 Token，任意一个触发即视为取消。
#[derive(Clone, Copy)]
pub(crate) struct CancelScope<'a> {
    job: &'a CancellationToken,
    global: &'a CancellationToken,
}

impl<'a> CancelScope<'a> {
    pub(crate) fn new(job: &'a CancellationToken, global: &'a CancellationToken) -> Self {
        Self { job, global }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.job.is_cancelled() || self.global.is_cancelled()
    }

    /// 等待任意一个 Token 被取消
    pub(crate) async fn cancelled(&self) {
        tokio::select! {
            _ = self.job.cancelled() => {}
            _ = self.global.cancelled() => {}
        }
    }
}
