use rand::Rng;
use std::time::Duration;

use crate::policy::{WaitContext, WaitDecision, WaitStrategy};

/// 指数退避策略
///
/// - 随着连续读到 queued/running 的次数增加，等待时间呈指数级增长。
/// - 用于在大量主机同时等待时大幅降低 Store QPS。
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min: Duration,
    max: Duration,
    factor: f64,
    jitter: bool, // 是否开启随机抖动
}

impl ExponentialBackoff {
    /// 创建退避策略
    ///
    /// # 参数
    /// - `min_ms`: 最小等待时间 (初始值)
    /// - `max_ms`: 最大等待时间 (封顶值)
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms.max(min_ms)),
            factor: 2.0, // 默认每次翻倍
            jitter: false,
        }
    }

    /// 开启随机抖动 (Jitter)
    ///
    /// 防止所有主机任务在同一时刻醒来（惊群效应）。
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// 内部计算逻辑
    pub(crate) fn calculate_duration(&self, idle_count: u32) -> Duration {
        if idle_count == 0 {
            return self.min;
        }

        // 1. 指数计算: min * factor^(idle_count - 1)
        // 限制指数最大为 30，防止 overflow
        let exponent = (idle_count - 1).min(30) as i32;
        let mut secs = self.min.as_secs_f64() * self.factor.powi(exponent);

        // 2. 随机抖动: 在 [0.8 * secs, 1.2 * secs] 之间波动
        if self.jitter {
            let random_factor = rand::rng().random_range(0.8..1.2);
            secs *= random_factor;
        }

        // 3. 封顶限制
        Duration::from_secs_f64(secs).min(self.max)
    }
}

impl WaitStrategy for ExponentialBackoff {
    fn make_decision(&self, ctx: &WaitContext) -> WaitDecision {
        let duration = self.calculate_duration(ctx.idle_count);

        // 意思就是：“虽然我打算睡 5 秒，但如果这期间 Store 有变更，请立刻叫醒我”
        WaitDecision::WaitForNotification(ctx.now_instant + duration)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(500, 5000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let b = ExponentialBackoff::new(100, 1000);
        assert_eq!(b.calculate_duration(0), Duration::from_millis(100));
        assert_eq!(b.calculate_duration(1), Duration::from_millis(100));
        assert_eq!(b.calculate_duration(2), Duration::from_millis(200));
        assert_eq!(b.calculate_duration(3), Duration::from_millis(400));
        assert_eq!(b.calculate_duration(5), Duration::from_millis(1000));
        assert_eq!(b.calculate_duration(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_stays_in_band() {
        let b = ExponentialBackoff::new(100, 10_000).with_jitter();
        for _ in 0..100 {
            let d = b.calculate_duration(3);
            assert!(d >= Duration::from_millis(319) && d <= Duration::from_millis(481));
        }
    }
}
