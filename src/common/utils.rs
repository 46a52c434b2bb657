use rand::Rng;
use std::time::Duration;

// ==========================================
// 算法工具 (Algorithmic Utilities)
// ==========================================

/// 计算指数退避时间 (Exponential Backoff with Jitter)
///
/// - attempt: 当前重试次数 (1, 2, 3...)
/// - base: 基础延迟 (例如 100ms)
/// - max: 最大延迟 (例如 2s)
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let mut rng = rand::rng();

    // 1. 计算指数部分: base * 2^(attempt-1)
    let exponent = 2u32.saturating_pow(attempt.saturating_sub(1).min(30));
    let backoff = base.as_secs_f64() * (exponent as f64);

    // 2. 限制最大值 (Cap)
    let capped = backoff.min(max.as_secs_f64());

    // 3. 添加抖动 (Full Jitter)
    // 随机取 [0, backoff] 之间的值
    let jittered = if capped > 0.0 {
        rng.random_range(0.0..=capped)
    } else {
        0.0
    };

    // 4. 保证最小延迟 (防止 0ms 空转)
    Duration::from_secs_f64(jittered.max(0.005))
}
