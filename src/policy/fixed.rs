use std::time::Duration;

use crate::policy::{WaitContext, WaitDecision, WaitStrategy};

/// 固定间隔策略
///
/// 每次读到 queued / running 之后都等同样长的时间再读。
/// - `listen = true`: Store 有变更通知时可以提前醒来
/// - `listen = false`: 纯轮询，忽略通知
///
/// 刚发布完请求时 Evaluator 几乎不可能已经给出结论，
/// 可以用 `with_initial_delay` 让第一次读取晚一点。
#[derive(Debug, Clone)]
pub struct FixedWait {
    interval: Duration,
    initial_delay: Option<Duration>,
    listen: bool,
}

impl FixedWait {
    /// 监听通知，最长等 `millis` 毫秒
    pub fn new(millis: u64) -> Self {
        Self {
            interval: Duration::from_millis(millis),
            initial_delay: None,
            listen: true,
        }
    }

    /// 纯轮询，每 `millis` 毫秒读一次
    pub fn new_pure_polling(millis: u64) -> Self {
        Self {
            interval: Duration::from_millis(millis),
            initial_delay: None,
            listen: false,
        }
    }

    /// 第一次读取之前的等待时间 (默认与 interval 相同)
    pub fn with_initial_delay(mut self, millis: u64) -> Self {
        self.initial_delay = Some(Duration::from_millis(millis));
        self
    }

    fn delay_for(&self, idle_count: u32) -> Duration {
        match (idle_count, self.initial_delay) {
            (0, Some(first)) => first,
            _ => self.interval,
        }
    }
}

impl WaitStrategy for FixedWait {
    fn make_decision(&self, ctx: &WaitContext) -> WaitDecision {
        let until = ctx.now_instant + self.delay_for(ctx.idle_count);
        if self.listen {
            WaitDecision::WaitForNotification(until)
        } else {
            WaitDecision::WaitUntil(until)
        }
    }
}
