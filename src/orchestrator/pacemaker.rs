use std::sync::Arc;

use tokio::{sync::Notify, time::Instant};

use crate::orchestrator::context::CancelScope;
use crate::policy::{WaitContext, WaitDecision, WaitStrategy};

/// 轮询起搏器
///
/// 核心职责：负责驱动状态轮询的节奏。
/// 它根据 WaitStrategy 的决策，决定是立刻读取、监听 Store 通知还是强制休眠，
/// 并保证任何等待都不会越过截止时间，且随时可以被取消打断。
pub(crate) struct PollPacemaker<'a> {
    /// 取消信号
    cancel: CancelScope<'a>,

    /// Store 变更通知 (可选)
    notify: Option<Arc<Notify>>,

    /// 等待策略
    wait_strategy: Arc<dyn WaitStrategy>,

    /// 截止时间
    deadline: Instant,

    /// 连续未等到终态的次数
    idle_count: u32,
}

impl<'a> PollPacemaker<'a> {
    pub(crate) fn new(
        cancel: CancelScope<'a>,
        notify: Option<Arc<Notify>>,
        wait_strategy: Arc<dyn WaitStrategy>,
        deadline: Instant,
    ) -> Self {
        Self {
            cancel,
            notify,
            wait_strategy,
            deadline,
            idle_count: 0,
        }
    }

    /// 读到非终态时调用
    pub(crate) fn mark_idle(&mut self) {
        self.idle_count = self.idle_count.saturating_add(1);
    }

    /// 等待下一次读取时机
    pub(crate) async fn wait_next(&mut self) -> PollEvent {
        // 1. 检查取消 (非阻塞，优先级最高)
        if self.cancel.is_cancelled() {
            return PollEvent::Cancelled;
        }
        // 2. 检查截止时间
        let now_instant = Instant::now();
        if now_instant >= self.deadline {
            return PollEvent::Deadline;
        }

        // 3. 获取策略决策
        let ctx = WaitContext::new(self.idle_count, now_instant);
        let decision = self.wait_strategy.make_decision(&ctx);

        // 执行决策 (所有等待都截断在 deadline)
        match decision {
            WaitDecision::Immediate => PollEvent::Trigger,
            WaitDecision::Yield => {
                tokio::task::yield_now().await;
                self.after_wake()
            }
            // 硬等待：不管有没有通知，必须睡到这个点
            WaitDecision::WaitUntil(until) => {
                let until = until.min(self.deadline);
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => PollEvent::Cancelled,
                    _ = tokio::time::sleep_until(until) => self.after_wake(),
                }
            }
            // 软等待：允许被 Store 通知提前唤醒
            WaitDecision::WaitForNotification(until) => {
                let until = until.min(self.deadline);
                match self.notify.clone() {
                    Some(notify) => {
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => PollEvent::Cancelled,
                            _ = notify.notified() => self.after_wake(),
                            _ = tokio::time::sleep_until(until) => self.after_wake(),
                        }
                    }
                    None => {
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => PollEvent::Cancelled,
                            _ = tokio::time::sleep_until(until) => self.after_wake(),
                        }
                    }
                }
            }
        }
    }

    /// 醒来后再确认一次，取消优先于截止，截止优先于触发
    fn after_wake(&self) -> PollEvent {
        if self.cancel.is_cancelled() {
            PollEvent::Cancelled
        } else if Instant::now() >= self.deadline {
            PollEvent::Deadline
        } else {
            PollEvent::Trigger
        }
    }
}

/// 起搏器产生的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollEvent {
    /// [触发] 到了读取时间，请立即读取状态
    Trigger,
    /// [截止] 已经到达调用方给定的时间上限
    Deadline,
    /// [取消] 扫描被中止
    Cancelled,
}
