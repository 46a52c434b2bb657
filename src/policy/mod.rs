pub mod expbackoff;
pub mod fixed;
pub mod wait;

pub use expbackoff::ExponentialBackoff;
pub use fixed::FixedWait;
pub use wait::{WaitContext, WaitDecision, WaitStrategy, WaitStrategyChain};

use crate::common::config::{PollConfig, PollMode};

/// 根据轮询配置构建默认等待策略
pub fn strategy_from_config(poll: &PollConfig) -> Box<dyn WaitStrategy> {
    match poll.mode {
        PollMode::Fixed => Box::new(FixedWait::new(poll.min_interval_ms)),
        PollMode::Backoff => {
            let backoff = ExponentialBackoff::new(poll.min_interval_ms, poll.max_interval_ms);
            if poll.jitter {
                Box::new(backoff.with_jitter())
            } else {
                Box::new(backoff)
            }
        }
    }
}
