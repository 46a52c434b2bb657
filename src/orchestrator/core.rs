use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::common::{
    FailureReason, JobKey, JobRequest, LscError, PackageList, Result, RunOutcome, StatusReport,
    calculate_backoff,
};
use crate::lsc::read_status;
use crate::orchestrator::context::{CancelScope, OrchestratorContext};
use crate::orchestrator::metrics::{ActiveGuard, MetricsSnapshot};
use crate::orchestrator::pacemaker::{PollEvent, PollPacemaker};
use crate::orchestrator::plugin::OrchestratorPlugin;
use crate::persistence::KvStore;
use crate::policy::WaitStrategy;

/// 时间上限的封顶值 (30 年)，更大的值按它处理
const MAX_TIMEOUT: Duration = Duration::from_secs(86_400 * 365 * 30);

/// 计算截止时间，超大的 timeout 不会让 Instant 溢出
fn deadline_after(started: Instant, timeout: Duration) -> Instant {
    started
        .checked_add(timeout.min(MAX_TIMEOUT))
        .or_else(|| started.checked_add(Duration::from_secs(86_400)))
        .unwrap_or(started)
}

/// 一次 Store 调用 (含重试) 的结果
enum Attempt<T> {
    /// 调用成功
    Completed(T),
    /// 重试途中到达截止时间
    Deadline,
    /// 重试途中被取消
    Cancelled,
}

/// 编排器 Inner 结构体
struct OrchestratorInner {
    /// 全局上下文
    ctx: OrchestratorContext,
    /// 插件系统
    plugins: Vec<Box<dyn OrchestratorPlugin>>,
    /// 组合等待策略
    wait_strategy: Arc<dyn WaitStrategy>,
}

/// LSC 任务编排器 (The Engine)
///
/// 状态机: `Init -> Published -> Polling -> {Done, TimedOut, Failed}`
///
/// - 每个 (scan_id, host_ip) 一次 `run`，可以在多个协程中并发调用。
/// - 不同任务之间除了 Store 本身和原子计数器之外没有共享可变状态。
/// - Clone 廉价 (内部 Arc)。
pub struct LscOrchestrator {
    inner: Arc<OrchestratorInner>, // 减轻 Arc Clone
}

impl Clone for LscOrchestrator {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl LscOrchestrator {
    /// 构造函数
    pub(crate) fn new_with_components(
        ctx: OrchestratorContext,
        plugins: Vec<Box<dyn OrchestratorPlugin>>,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                ctx,
                plugins,
                wait_strategy,
            }),
        }
    }

    /// 创建一个 Builder
    pub fn builder() -> crate::orchestrator::OrchestratorBuilder {
        crate::orchestrator::OrchestratorBuilder::new()
    }

    /// 暴露内部储存
    pub fn store(&self) -> Arc<dyn KvStore> {
        self.inner.ctx.store.clone()
    }

    /// 当前配置的命名空间
    pub fn namespace(&self) -> &str {
        &self.inner.ctx.config.namespace
    }

    /// 指标快照
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.ctx.metrics.snapshot()
    }

    /// 全局中止信号的子 Token
    ///
    /// 取消子 Token 只影响使用它的任务；`cancel()` 会连带取消所有子 Token。
    pub fn child_token(&self) -> CancellationToken {
        self.inner.ctx.shutdown.child_token()
    }

    /// 中止所有进行中的任务
    ///
    /// 每个任务会在下一个轮询边界 (或者正在进行的等待/Store 调用中) 立即以 Cancelled 结束。
    pub fn cancel(&self) {
        trace!("[Orchestrator] Cancel triggered.");
        self.inner.ctx.shutdown.cancel();
    }

    // ==========================================
    // 对外入口 (Call Surface)
    // ==========================================

    /// 发布请求并等待结论
    ///
    /// 使用配置中的命名空间与默认超时，以及编排器的全局中止信号。
    pub async fn run(
        &self,
        scan_id: &str,
        host_ip: &str,
        hostname: &str,
        os_release: &str,
        package_list: &PackageList,
    ) -> Result<RunOutcome> {
        let key = JobKey::new(scan_id, host_ip)?;
        let request = JobRequest::new(key, hostname, os_release, package_list.clone());
        let timeout = self.inner.ctx.config.policy.timeout();
        let token = self.child_token();
        self.run_request(&request, timeout, &token).await
    }

    /// 发布请求并等待结论 (完整参数版)
    ///
    /// - `timeout`: 从调用开始计算的总时间上限
    /// - `cancel`: 扫描级中止信号
    pub async fn run_request(
        &self,
        request: &JobRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let key = request.key();

        // === Init: 编码 (失败直接返回，不触达 Store) ===
        let payload = request.to_json()?;

        // 空包列表: 没有需要检查的内容，直接 Done，不唤醒 Evaluator
        if request.is_noop() {
            debug!(
                scan_id = %key.scan_id,
                host_ip = %key.host_ip,
                "empty package list, skipping LSC hand-off"
            );
            self.inner.ctx.metrics.inc_short_circuited();
            let outcome = RunOutcome::Done(StatusReport::finished_empty());
            self.notify_finish(&key, &outcome).await;
            return Ok(outcome);
        }

        let _active = ActiveGuard::new(&self.inner.ctx.metrics);
        let started = Instant::now();
        let deadline = deadline_after(started, timeout);
        let scope = CancelScope::new(cancel, &self.inner.ctx.shutdown);
        let namespace = self.inner.ctx.config.namespace.as_str();
        let store_key = key.store_key(namespace);

        // === Init -> Published: 整体覆盖写入 ===
        let store: &dyn KvStore = self.inner.ctx.store.as_ref();
        let key_ref: &str = &store_key;
        let published = self
            .with_retry(&key, "publish", deadline, scope, move || {
                store.put(key_ref, payload.clone())
            })
            .await?;
        match published {
            Attempt::Completed(()) => {}
            Attempt::Deadline => {
                let outcome = RunOutcome::TimedOut {
                    elapsed: started.elapsed(),
                };
                return Ok(self.conclude(&key, &store_key, outcome, deadline).await);
            }
            Attempt::Cancelled => {
                let outcome = RunOutcome::Failed(FailureReason::Cancelled);
                return Ok(self.conclude(&key, &store_key, outcome, deadline).await);
            }
        }
        debug!(
            scan_id = %key.scan_id,
            host_ip = %key.host_ip,
            packages = request.package_list.len(),
            "LSC request published"
        );
        for p in self.inner.plugins.iter() {
            p.on_publish(&self.inner.ctx, request).await;
        }

        // === Published -> Polling ===
        let outcome = self
            .poll_until_terminal(&key, namespace, started, deadline, scope)
            .await?;
        Ok(self.conclude(&key, &store_key, outcome, deadline).await)
    }

    /// 只轮询，不发布
    ///
    /// 用于请求已由别处发布 (或者上一次 run 超时后继续等待) 的场景。
    /// - `namespace`: Store Key 的命名空间
    /// - `timeout_secs`: 总时间上限 (秒)
    pub async fn status_check(
        &self,
        scan_id: &str,
        host_ip: &str,
        namespace: &str,
        timeout_secs: u64,
    ) -> Result<RunOutcome> {
        let key = JobKey::new(scan_id, host_ip)?;
        let token = self.child_token();
        self.status_check_with(&key, namespace, Duration::from_secs(timeout_secs), &token)
            .await
    }

    /// 只轮询，不发布 (完整参数版)
    pub async fn status_check_with(
        &self,
        key: &JobKey,
        namespace: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let _active = ActiveGuard::new(&self.inner.ctx.metrics);
        let started = Instant::now();
        let deadline = deadline_after(started, timeout);
        let scope = CancelScope::new(cancel, &self.inner.ctx.shutdown);
        let store_key = key.store_key(namespace);

        let outcome = self
            .poll_until_terminal(key, namespace, started, deadline, scope)
            .await?;
        Ok(self.conclude(key, &store_key, outcome, deadline).await)
    }

    /// 并发运行一批主机任务
    ///
    /// 每个请求独立发布、独立轮询；返回顺序与输入一致。
    pub async fn run_all(&self, requests: &[JobRequest]) -> Vec<Result<RunOutcome>> {
        let timeout = self.inner.ctx.config.policy.timeout();
        let token = self.child_token();
        let token = &token;
        join_all(
            requests
                .iter()
                .map(|request| self.run_request(request, timeout, token)),
        )
        .await
    }

    // ==========================================
    // Core Logic: 轮询状态机
    // ==========================================

    /// 轮询主循环
    ///
    /// 每一轮: 等待 (可被通知提前唤醒) -> 读取并分类 -> 判断是否终态。
    async fn poll_until_terminal(
        &self,
        key: &JobKey,
        namespace: &str,
        started: Instant,
        deadline: Instant,
        scope: CancelScope<'_>,
    ) -> Result<RunOutcome> {
        let mut pacemaker = PollPacemaker::new(
            scope,
            self.inner.ctx.store.change_notifier(),
            self.inner.wait_strategy.clone(),
            deadline,
        );
        let store: &dyn KvStore = self.inner.ctx.store.as_ref();

        loop {
            // 等待信号 (Wait)
            match pacemaker.wait_next().await {
                PollEvent::Trigger => {}
                PollEvent::Cancelled => return Ok(RunOutcome::Failed(FailureReason::Cancelled)),
                PollEvent::Deadline => {
                    return Ok(RunOutcome::TimedOut {
                        elapsed: started.elapsed(),
                    });
                }
            }

            // 读取 (每次重新读，不缓存)
            let report = match self
                .with_retry(key, "read status", deadline, scope, move || {
                    read_status(store, namespace, key)
                })
                .await?
            {
                Attempt::Completed(report) => report,
                Attempt::Cancelled => return Ok(RunOutcome::Failed(FailureReason::Cancelled)),
                Attempt::Deadline => {
                    return Ok(RunOutcome::TimedOut {
                        elapsed: started.elapsed(),
                    });
                }
            };

            // 取消优先于任何其他结论，即使刚好读到了终态
            if scope.is_cancelled() {
                return Ok(RunOutcome::Failed(FailureReason::Cancelled));
            }

            trace!(
                scan_id = %key.scan_id,
                host_ip = %key.host_ip,
                status = %report.status,
                "LSC status polled"
            );
            for p in self.inner.plugins.iter() {
                p.on_poll(&self.inner.ctx, key, &report).await;
            }

            if let Some(outcome) = RunOutcome::from_terminal(report) {
                return Ok(outcome);
            }
            // queued / running: 继续等
            pacemaker.mark_idle();
        }
    }

    /// 带截止时间与取消的 Store 调用
    ///
    /// - 单次调用受 `min(store_op_timeout, 剩余时间)` 约束
    /// - 可重试错误做带抖动的指数退避，不可重试错误直接返回
    async fn with_retry<T, F, Fut>(
        &self,
        key: &JobKey,
        op: &'static str,
        deadline: Instant,
        scope: CancelScope<'_>,
        mut call: F,
    ) -> Result<Attempt<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = &self.inner.ctx.config.policy;
        let base = Duration::from_millis(policy.store_retry_base_ms);
        let max = Duration::from_millis(policy.store_retry_max_ms);
        let mut attempt: u32 = 0;

        loop {
            if scope.is_cancelled() {
                return Ok(Attempt::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Attempt::Deadline);
            }
            let bound = remaining.min(policy.store_op_timeout());

            let result = tokio::select! {
                biased;
                _ = scope.cancelled() => return Ok(Attempt::Cancelled),
                r = tokio::time::timeout(bound, call()) => r,
            };
            let err = match result {
                Ok(Ok(value)) => return Ok(Attempt::Completed(value)),
                Ok(Err(e)) => e,
                Err(_) => LscError::StoreUnavailable(format!("{} timed out after {:?}", op, bound)),
            };
            if !err.is_retryable() {
                return Err(err);
            }

            attempt = attempt.saturating_add(1);
            let backoff = calculate_backoff(attempt, base, max);
            warn!(
                scan_id = %key.scan_id,
                host_ip = %key.host_ip,
                attempt,
                ?backoff,
                error = %err,
                "store {} failed, retrying",
                op
            );
            for p in self.inner.plugins.iter() {
                p.on_store_retry(&self.inner.ctx, key, &err).await;
            }

            let wake = (Instant::now() + backoff).min(deadline);
            tokio::select! {
                biased;
                _ = scope.cancelled() => return Ok(Attempt::Cancelled),
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    /// 收尾: 清理策略 + 通知插件
    async fn conclude(
        &self,
        key: &JobKey,
        store_key: &str,
        outcome: RunOutcome,
        deadline: Instant,
    ) -> RunOutcome {
        match &outcome {
            RunOutcome::Done(report) => debug!(
                scan_id = %key.scan_id,
                host_ip = %key.host_ip,
                status = %report.status,
                findings = report.results.len(),
                "LSC job finished"
            ),
            RunOutcome::TimedOut { elapsed } => warn!(
                scan_id = %key.scan_id,
                host_ip = %key.host_ip,
                ?elapsed,
                "LSC job timed out, leaving store record in place"
            ),
            RunOutcome::Failed(reason) => warn!(
                scan_id = %key.scan_id,
                host_ip = %key.host_ip,
                %reason,
                "LSC job failed"
            ),
        }

        if self.should_clean_up(&outcome) {
            self.clean_up(key, store_key, deadline).await;
        }
        self.notify_finish(key, &outcome).await;
        outcome
    }

    /// 超时与取消时 Evaluator 可能还在处理，记录保持原样
    fn should_clean_up(&self, outcome: &RunOutcome) -> bool {
        if !self.inner.ctx.config.policy.delete_on_terminal {
            return false;
        }
        match outcome {
            RunOutcome::Done(_) => true,
            RunOutcome::Failed(FailureReason::Evaluator(_))
            | RunOutcome::Failed(FailureReason::MalformedRecord(_)) => true,
            RunOutcome::Failed(FailureReason::Cancelled) | RunOutcome::TimedOut { .. } => false,
        }
    }

    /// 尽力删除记录，失败只记日志 (结论已经确定)
    async fn clean_up(&self, key: &JobKey, store_key: &str, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        let bound = remaining.min(self.inner.ctx.config.policy.store_op_timeout());
        match tokio::time::timeout(bound, self.inner.ctx.store.delete(store_key)).await {
            Ok(Ok(())) => trace!(scan_id = %key.scan_id, host_ip = %key.host_ip, "store record removed"),
            Ok(Err(e)) => warn!(scan_id = %key.scan_id, host_ip = %key.host_ip, error = %e, "failed to remove store record"),
            Err(_) => warn!(scan_id = %key.scan_id, host_ip = %key.host_ip, "removing store record timed out"),
        }
    }

    async fn notify_finish(&self, key: &JobKey, outcome: &RunOutcome) {
        for p in self.inner.plugins.iter() {
            p.on_finish(&self.inner.ctx, key, outcome).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huge_timeout_is_capped_instead_of_overflowing() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::MAX), now + MAX_TIMEOUT);
        assert_eq!(
            deadline_after(now, Duration::from_secs(u64::MAX)),
            now + MAX_TIMEOUT
        );
        assert_eq!(
            deadline_after(now, Duration::from_millis(150)),
            now + Duration::from_millis(150)
        );
    }
}
