use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    common::{LscConfig, Result},
    orchestrator::{
        LscOrchestrator, OrchestratorContext, OrchestratorMetrics, OrchestratorPlugin,
        plugins::MetricsPlugin,
    },
    persistence::{KvStore, MemoryStore},
    policy::{WaitStrategy, WaitStrategyChain, strategy_from_config},
};

/// 编排器构造器 (Builder Pattern)
pub struct OrchestratorBuilder {
    /// 全局配置
    config: Option<LscConfig>,
    /// 等待策略 (多个时组合成 Chain)
    wait_strategies: Vec<Box<dyn WaitStrategy>>,
    /// 插件列表
    plugins: Vec<Box<dyn OrchestratorPlugin>>,
    /// 共享存储 (Option 用于处理默认值逻辑)
    store: Option<Arc<dyn KvStore>>,
    /// 全局统计指标
    metrics: Arc<OrchestratorMetrics>,

    shutdown: Option<CancellationToken>,
}

impl Default for OrchestratorBuilder {
    /// 创建一个新的构造器
    ///
    /// **默认行为**:
    /// - Config: Default
    /// - WaitStrategy: 由 `config.poll` 决定
    /// - Store: 配置了 redis_url 时使用 RedisStore，否则 MemoryStore
    /// - Metrics: 0 (全新计数器)
    fn default() -> Self {
        Self {
            config: None,
            wait_strategies: Vec::new(),
            plugins: Vec::new(),
            store: None,
            metrics: Arc::new(OrchestratorMetrics::default()),
            shutdown: None,
        }
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置配置
    pub fn with_config(mut self, config: LscConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 添加等待策略
    ///
    /// 可以多次调用，多个策略的决策会合并，取更保守的那一个。
    pub fn with_wait_strategy<S>(mut self, strategy: S) -> Self
    where
        S: WaitStrategy + 'static,
    {
        self.wait_strategies.push(Box::new(strategy));
        self
    }

    /// 添加插件 (支持链式调用)
    ///
    /// **注意**: 插件的执行顺序与添加顺序一致 (FIFO)，内置的 MetricsPlugin 永远排在最前。
    pub fn with_plugin<PL>(mut self, plugin: PL) -> Self
    where
        PL: OrchestratorPlugin + 'static,
    {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// 设置共享存储
    pub fn with_store<S>(mut self, store: S) -> Self
    where
        S: KvStore + 'static,
    {
        self.store = Some(Arc::new(store));
        self
    }

    /// 设置全局中止信号
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// 构建编排器
    ///
    /// 配置不合法、或者要求了 Redis 但无法创建连接池时返回错误。
    pub fn build(mut self) -> Result<LscOrchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        // 处理存储层的默认逻辑
        let store = match self.store {
            Some(store) => store,
            None => default_store(&config)?,
        };

        // 等待策略：未指定时由配置决定
        let wait_strategy: Arc<dyn WaitStrategy> = match self.wait_strategies.len() {
            0 => Arc::from(strategy_from_config(&config.poll)),
            1 => match self.wait_strategies.pop() {
                Some(only) => Arc::from(only),
                None => Arc::from(strategy_from_config(&config.poll)),
            },
            _ => {
                let mut chain = WaitStrategyChain::new();
                for s in self.wait_strategies {
                    chain.push_boxed(s);
                }
                Arc::new(chain)
            }
        };

        // 自动注入 MetricsPlugin
        let metrics_plugin = Box::new(MetricsPlugin::new(self.metrics.clone()));
        self.plugins.insert(0, metrics_plugin);

        // 初始化全局停机 Token
        let token = self.shutdown.unwrap_or_default();

        let ctx = OrchestratorContext::new(store, config, self.metrics, token);
        Ok(LscOrchestrator::new_with_components(
            ctx,
            self.plugins,
            wait_strategy,
        ))
    }
}

#[cfg(feature = "distributed")]
fn default_store(config: &LscConfig) -> Result<Arc<dyn KvStore>> {
    if config.store.redis_url.is_some() {
        debug!("Orchestrator build using RedisStore");
        let redis = crate::persistence::RedisStore::new(config)?;
        return Ok(Arc::new(redis));
    }
    debug!("Orchestrator build using default MemoryStore");
    Ok(Arc::new(MemoryStore::new()))
}

#[cfg(not(feature = "distributed"))]
fn default_store(config: &LscConfig) -> Result<Arc<dyn KvStore>> {
    if config.store.redis_url.is_some() {
        return Err(crate::common::LscError::Config(
            "store.redis_url is set but the `distributed` feature is disabled".into(),
        ));
    }
    debug!("Orchestrator build using default MemoryStore");
    Ok(Arc::new(MemoryStore::new()))
}
