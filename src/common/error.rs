use thiserror::Error;

/// LSC 交接层统一结果类型
///
/// 使用此别名可以简化函数签名：`fn do_something() -> Result<()>`
pub type Result<T> = std::result::Result<T, LscError>;

#[derive(Error, Debug)]
pub enum LscError {
    // ==========================================
    // 1. 配置错误 (Configuration)
    // ==========================================
    /// 配置错误
    ///
    /// - 触发场景: 配置文件解析失败、轮询间隔为 0、命名空间非法。
    /// - 后果: Orchestrator 构建失败。
    /// - 处理: 检查配置文件。
    #[error("Configuration error: {0}")]
    Config(String),

    // ==========================================
    // 2. 请求构造错误 (Encoding)
    // ==========================================
    /// 请求编码失败
    ///
    /// - 触发场景: scan_id / host_ip 为空，或者包列表包含非 UTF-8 字节。
    /// - 后果: 该任务直接失败，不会写入 Store。
    /// - 处理: 不重试，错误向上抛给调用方。
    #[error("Failed to encode LSC request: {0}")]
    Encoding(String),

    // ==========================================
    // 3. 存储层错误 (Store)
    // ==========================================
    /// 共享存储暂时不可用
    ///
    /// - 触发场景: 网络抖动、存储重启、单次操作超时。
    /// - 处理: 暂时性错误，Orchestrator 会在总超时之内做退避重试。
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Redis 交互失败
    #[cfg(feature = "distributed")]
    #[error("Redis interaction failed: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    /// Redis Pool 连接池错误
    #[cfg(feature = "distributed")]
    #[error("Redis pool failure: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    // ==========================================
    // 4. 数据错误 (Data)
    // ==========================================
    /// 状态记录已存在但无法解析
    ///
    /// - 触发场景: Evaluator 写入了损坏的 JSON，或者 status 字段取值未知。
    /// - 后果: 对该任务而言是终态，绝不能被当成 `queued` 继续等待。
    #[error("Malformed status record at '{key}': {reason}")]
    MalformedStatusRecord { key: String, reason: String },

    /// 序列化/反序列化失败
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 通用 IO 错误 (读取配置文件等)
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl LscError {
    /// 判断该错误是否值得重试 (Retryable)
    ///
    /// - 返回 `true`: 存储抖动、连接断开。Orchestrator 在截止时间内退避重试。
    /// - 返回 `false`: 输入错误、数据损坏、配置错误。立即放弃。
    pub fn is_retryable(&self) -> bool {
        match self {
            LscError::StoreUnavailable(_) => true,
            LscError::Io(_) => true,

            #[cfg(feature = "distributed")]
            LscError::Redis(e) => e.is_connection_dropped() || e.is_io_error() || e.is_timeout(),
            #[cfg(feature = "distributed")]
            LscError::Pool(_) => true,

            LscError::Config(_) => false,
            LscError::Encoding(_) => false,
            LscError::MalformedStatusRecord { .. } => false,
            LscError::Serialization(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_permanent_errors_are_told_apart() {
        assert!(LscError::StoreUnavailable("connection reset".into()).is_retryable());
        assert!(!LscError::Encoding("empty scan id".into()).is_retryable());
        assert!(
            !LscError::MalformedStatusRecord {
                key: "lsc:s1:10.0.0.1".into(),
                reason: "expected value".into(),
            }
            .is_retryable()
        );
        assert!(!LscError::Config("poll interval is zero".into()).is_retryable());
    }

    #[test]
    fn malformed_record_message_names_the_key() {
        let err = LscError::MalformedStatusRecord {
            key: "lsc:s1:10.0.0.1".into(),
            reason: "trailing characters".into(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed status record at 'lsc:s1:10.0.0.1': trailing characters"
        );
    }
}
