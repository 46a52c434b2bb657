use crate::common::config::LscConfig;
use crate::common::error::{LscError, Result};
use deadpool_redis::{Config, Pool, Runtime};

/// Redis 存储实现
///
/// 包含 Redis 连接池。Key 由调用方 (`JobKey::store_key`) 生成，这里不再加前缀，
/// 保证与 Evaluator 看到的 Key 逐字节一致。
#[derive(Clone)]
pub struct RedisStore {
    /// Redis 客户端 连接池
    pub(super) pool: Pool,

    /// 发布请求时附带的过期时间 (秒)
    pub(super) record_ttl_secs: Option<u64>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("pool_status", &self.pool.status())
            .field("record_ttl_secs", &self.record_ttl_secs)
            .finish()
    }
}

impl RedisStore {
    /// 根据配置创建实例
    ///
    /// `store.redis_url` 必填。
    pub fn new(config: &LscConfig) -> Result<Self> {
        let url = config
            .store
            .redis_url
            .as_deref()
            .ok_or_else(|| LscError::Config("store.redis_url is required for RedisStore".into()))?;
        Self::connect(url, config.store.record_ttl_secs)
    }

    /// 直接通过 URL 创建
    pub fn connect(url: &str, record_ttl_secs: Option<u64>) -> Result<Self> {
        let cfg = Config::from_url(url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| LscError::Config(format!("invalid redis config: {}", e)))?;

        Ok(Self {
            pool,
            record_ttl_secs,
        })
    }
}
