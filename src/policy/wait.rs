use tokio::time::Instant;

/// 等待决策 (The Decision)
///
/// - 策略层返回给 Pacemaker 的具体行动指令。
/// - 无论哪种决策，Pacemaker 都会把等待截断在调用方的截止时间之前。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitDecision {
    /// [立即执行]
    ///
    /// 含义: "不用等，马上去读状态。"
    Immediate,

    /// [协作让权]
    ///
    /// 含义: "马上读，但先让出一次执行权给其他主机的任务。"
    Yield,

    /// [绝对休眠]
    ///
    /// 含义: "睡到指定时间点，期间不接受 Store 变更通知。"
    /// - 仍然会被取消信号打断。
    WaitUntil(Instant),

    /// [响应式等待]
    ///
    /// 含义: "最多睡到指定时间点，如果 Store 通知有变更就提前醒来。"
    /// - Store 不支持通知时退化为 WaitUntil。
    WaitForNotification(Instant),
}

/// 等待策略上下文
///
/// - 包含了轮询循环当前的运行状态信息，供策略层决策时参考。
#[derive(Debug, Clone)]
pub struct WaitContext {
    /// 连续未等到终态的次数
    ///
    /// - 0: 第一次读取之前。
    /// - >0: 已经连续读到 queued/running 的次数。
    pub idle_count: u32,
    /// [单调时钟] 用于计算相对 Duration 和构建 Tokio Timer
    ///
    /// - 特性：永不倒流，不受 NTP/手动改时间影响
    pub now_instant: Instant,
}

impl WaitContext {
    pub fn new(idle_count: u32, now_instant: Instant) -> Self {
        Self {
            idle_count,
            now_instant,
        }
    }
}

/// 等待策略接口 (The Interface)
///
/// - 决定了两次状态读取之间该等待多久。
pub trait WaitStrategy: Send + Sync + 'static {
    /// 核心决策方法
    ///
    /// # 参数
    /// - `ctx`: 包含当前运行状态的上下文
    fn make_decision(&self, ctx: &WaitContext) -> WaitDecision;
}

/// 组合策略链 (Arbitrator)
///
/// 核心职责：解决多个策略之间的冲突。
/// - 例如：一个策略说 Yield，另一个说 WaitUntil(T)，链条必须决定听谁的。
#[derive(Default)]
pub struct WaitStrategyChain {
    strategies: Vec<Box<dyn WaitStrategy>>,
}

impl WaitStrategyChain {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// 向链中添加一个新策略
    pub fn add<S: WaitStrategy>(mut self, strategy: S) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub(crate) fn push_boxed(&mut self, strategy: Box<dyn WaitStrategy>) {
        self.strategies.push(strategy);
    }

    /// 检查链中是否有策略
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// 核心逻辑：合并两个决策，返回更“保守”的那一个
    ///
    /// 优先级顺序 (由高到低):
    /// 1. WaitUntil (硬等待，取最晚时间)
    /// 2. WaitForNotification (软等待，取最晚时间)
    /// 3. Yield (让权)
    /// 4. Immediate (立即)
    fn merge(a: WaitDecision, b: WaitDecision) -> WaitDecision {
        use WaitDecision::*;

        // 辅助：提取 Deadline
        let get_deadline = |d: WaitDecision| -> Option<Instant> {
            match d {
                WaitUntil(t) | WaitForNotification(t) => Some(t),
                _ => None,
            }
        };

        let dead_a = get_deadline(a);
        let dead_b = get_deadline(b);

        // 都有 Deadline -> 取最晚 (更保守)
        if let (Some(ta), Some(tb)) = (dead_a, dead_b) {
            let max_t = ta.max(tb);
            // 只要有一方是硬等待，结果升级为硬等待
            let is_hard = matches!(a, WaitUntil(_)) || matches!(b, WaitUntil(_));
            return if is_hard {
                WaitUntil(max_t)
            } else {
                WaitForNotification(max_t)
            };
        }
        // 有 Deadline 胜过 无 Deadline
        if dead_a.is_some() {
            return a;
        }
        if dead_b.is_some() {
            return b;
        }

        if matches!(a, Yield) || matches!(b, Yield) {
            return Yield;
        }

        Immediate
    }
}

impl WaitStrategy for WaitStrategyChain {
    fn make_decision(&self, ctx: &WaitContext) -> WaitDecision {
        // 如果没有策略，默认立即执行
        self.strategies
            .iter()
            .map(|s| s.make_decision(ctx))
            .fold(WaitDecision::Immediate, Self::merge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Fixed(WaitDecision);

    impl WaitStrategy for Fixed {
        fn make_decision(&self, _ctx: &WaitContext) -> WaitDecision {
            self.0
        }
    }

    fn ctx() -> WaitContext {
        WaitContext::new(0, Instant::now())
    }

    #[test]
    fn empty_chain_is_immediate() {
        let chain = WaitStrategyChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.make_decision(&ctx()), WaitDecision::Immediate);
    }

    #[test]
    fn latest_deadline_wins_and_hard_wait_upgrades() {
        let now = Instant::now();
        let early = now + Duration::from_millis(10);
        let late = now + Duration::from_millis(50);

        let chain = WaitStrategyChain::new()
            .add(Fixed(WaitDecision::WaitForNotification(late)))
            .add(Fixed(WaitDecision::WaitUntil(early)));
        assert_eq!(chain.make_decision(&ctx()), WaitDecision::WaitUntil(late));

        let chain = WaitStrategyChain::new()
            .add(Fixed(WaitDecision::WaitForNotification(early)))
            .add(Fixed(WaitDecision::WaitForNotification(late)));
        assert_eq!(
            chain.make_decision(&ctx()),
            WaitDecision::WaitForNotification(late)
        );
    }

    #[test]
    fn yield_beats_immediate() {
        let chain = WaitStrategyChain::new()
            .add(Fixed(WaitDecision::Immediate))
            .add(Fixed(WaitDecision::Yield));
        assert_eq!(chain.make_decision(&ctx()), WaitDecision::Yield);
    }
}
