use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::common::error::{LscError, Result};

/// 轮询节奏模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollMode {
    /// 固定间隔
    ///
    /// - 每轮都等待 `min_interval_ms`。
    /// - 适用场景: 测试环境，或 Evaluator 响应时间非常稳定。
    Fixed,

    /// 指数退避 (默认)
    ///
    /// - 连续读到 `queued`/`running` 时，等待时间从 `min_interval_ms` 翻倍增长到 `max_interval_ms`。
    /// - 适用场景: 大量主机并发等待时降低 Store 的 QPS。
    Backoff,
}

// ==========================================
// 1. 轮询配置 (PollConfig)
// ==========================================
/// 状态轮询节奏配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// 轮询模式
    pub mode: PollMode,

    /// 最小轮询间隔 (毫秒)
    ///
    /// - 默认值: 500
    pub min_interval_ms: u64,

    /// 最大轮询间隔 (毫秒，仅 Backoff 模式有效)
    ///
    /// - 默认值: 5000
    pub max_interval_ms: u64,

    /// 是否开启随机抖动
    ///
    /// - 说明: 避免成百上千个主机任务在同一时刻读 Store (惊群效应)。
    pub jitter: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            mode: PollMode::Backoff,
            min_interval_ms: 500,
            max_interval_ms: 5000,
            jitter: true,
        }
    }
}

// ==========================================
// 2. 策略配置 (PolicyConfig)
// ==========================================
/// 超时、重试与清理策略
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// `run` 的默认总超时 (秒)
    ///
    /// - 默认值: 300
    /// - 说明: 从发布请求开始计时，超过后返回 TimedOut，Store 记录保持原样。
    pub timeout_secs: u64,

    /// 单次 Store 操作超时 (毫秒)
    ///
    /// - 默认值: 2000
    /// - 说明: 实际生效值为 `min(本值, 距离截止时间的剩余时间)`。
    pub store_op_timeout_ms: u64,

    /// Store 暂时性故障的退避基准 (毫秒)
    pub store_retry_base_ms: u64,

    /// Store 暂时性故障的退避上限 (毫秒)
    pub store_retry_max_ms: u64,

    /// 观察到终态后是否删除 Store 记录
    ///
    /// - 默认值: false (保留记录，由 Evaluator 负责过期清理)
    /// - 说明: 超时或取消时永远不会删除，因为 Evaluator 可能仍在处理。
    pub delete_on_terminal: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            store_op_timeout_ms: 2000,
            store_retry_base_ms: 100,
            store_retry_max_ms: 2000,
            delete_on_terminal: false,
        }
    }
}

impl PolicyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn store_op_timeout(&self) -> Duration {
        Duration::from_millis(self.store_op_timeout_ms)
    }
}

// ==========================================
// 3. 存储配置 (StoreConfig)
// ==========================================
/// 共享存储相关配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis 地址 (仅 `distributed` feature 有效)
    ///
    /// e.g. "redis://127.0.0.1:6379/0"
    pub redis_url: Option<String>,

    /// 记录过期时间 (秒)
    ///
    /// - None: 永不过期 (默认)
    /// - Some(n): 发布请求时带 TTL，防止异常退出的扫描留下孤儿记录。
    pub record_ttl_secs: Option<u64>,
}

// ==========================================
// 4. 总配置入口 (LscConfig)
// ==========================================

/// LSC 交接层总配置
///
/// 使用分层结构组织配置项。支持 `serde` 序列化，可直接从 JSON 加载。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LscConfig {
    /// 命名空间 (Store Key 前缀)
    /// 默认: "lsc"
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// 轮询节奏
    #[serde(default)]
    pub poll: PollConfig,

    /// 超时与重试
    #[serde(default)]
    pub policy: PolicyConfig,

    /// 存储
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_namespace() -> String {
    "lsc".to_string()
}

impl Default for LscConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            poll: PollConfig::default(),
            policy: PolicyConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl LscConfig {
    /// 快速创建一个开发环境配置
    pub fn new_dev() -> Self {
        let mut cfg = Self::default();
        // 开发环境下轮询快一点，方便调试
        cfg.poll.mode = PollMode::Fixed;
        cfg.poll.min_interval_ms = 20;
        cfg.poll.max_interval_ms = 200;
        cfg.poll.jitter = false;
        cfg.policy.timeout_secs = 10;
        cfg
    }

    /// 从 JSON 文本加载并校验
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 从 JSON 文件加载并校验
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading LSC config from {}", path.display()))?;
        let cfg = Self::from_json_str(&raw)
            .with_context(|| format!("parsing LSC config from {}", path.display()))?;
        Ok(cfg)
    }

    /// 校验配置项之间的逻辑关系
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(LscError::Config("namespace cannot be empty".into()));
        }
        // 命名空间与 Key 的分隔符冲突会导致 Key 歧义
        if self.namespace.contains(':') {
            return Err(LscError::Config(format!(
                "namespace '{}' must not contain ':'",
                self.namespace
            )));
        }
        if self.poll.min_interval_ms == 0 {
            return Err(LscError::Config("poll.min_interval_ms must be > 0".into()));
        }
        if self.poll.max_interval_ms < self.poll.min_interval_ms {
            return Err(LscError::Config(format!(
                "poll.max_interval_ms ({}) is lower than poll.min_interval_ms ({})",
                self.poll.max_interval_ms, self.poll.min_interval_ms
            )));
        }
        if self.policy.store_op_timeout_ms == 0 {
            return Err(LscError::Config(
                "policy.store_op_timeout_ms must be > 0".into(),
            ));
        }
        if self.policy.store_retry_max_ms < self.policy.store_retry_base_ms {
            return Err(LscError::Config(
                "policy.store_retry_max_ms is lower than policy.store_retry_base_ms".into(),
            ));
        }
        // Redis 拒绝 `SET EX 0`，每次发布都会失败
        if self.store.record_ttl_secs == Some(0) {
            return Err(LscError::Config(
                "store.record_ttl_secs must be > 0 when set".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = LscConfig::default();
        assert_eq!(cfg.namespace, "lsc");
        assert_eq!(cfg.poll.mode, PollMode::Backoff);
        assert!(!cfg.policy.delete_on_terminal);
        cfg.validate().unwrap();
        LscConfig::new_dev().validate().unwrap();
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = LscConfig::from_json_str(
            r#"{"namespace":"notus","poll":{"mode":"fixed","min_interval_ms":50}}"#,
        )
        .unwrap();
        assert_eq!(cfg.namespace, "notus");
        assert_eq!(cfg.poll.mode, PollMode::Fixed);
        assert_eq!(cfg.poll.min_interval_ms, 50);
        assert_eq!(cfg.poll.max_interval_ms, 5000);
        assert_eq!(cfg.policy.timeout_secs, 300);
    }

    #[test]
    fn rejects_inconsistent_values() {
        let mut cfg = LscConfig::default();
        cfg.poll.min_interval_ms = 0;
        assert!(matches!(cfg.validate(), Err(LscError::Config(_))));

        let mut cfg = LscConfig::default();
        cfg.namespace = "a:b".into();
        assert!(matches!(cfg.validate(), Err(LscError::Config(_))));

        let mut cfg = LscConfig::default();
        cfg.store.record_ttl_secs = Some(0);
        assert!(matches!(cfg.validate(), Err(LscError::Config(_))));
        cfg.store.record_ttl_secs = Some(3600);
        assert!(cfg.validate().is_ok());

        let err = LscConfig::from_json_str(r#"{"poll":{"min_interval_ms":900,"max_interval_ms":100}}"#)
            .unwrap_err();
        assert!(matches!(err, LscError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsc.json");
        std::fs::write(&path, r#"{"policy":{"timeout_secs":42,"delete_on_terminal":true}}"#)
            .unwrap();

        let cfg = LscConfig::from_file(&path).unwrap();
        assert_eq!(cfg.policy.timeout(), Duration::from_secs(42));
        assert!(cfg.policy.delete_on_terminal);

        assert!(LscConfig::from_file(dir.path().join("missing.json")).is_err());
    }
}
