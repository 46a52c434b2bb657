use async_trait::async_trait;

use super::core::RedisStore;
use crate::common::error::{LscError, Result};
use crate::persistence::traits::KvStore;
use deadpool_redis::redis::AsyncCommands;

impl RedisStore {
    /// 从连接池取连接
    ///
    /// 连接池错误统一视为暂时不可用。
    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| LscError::StoreUnavailable(format!("redis pool: {}", e)))
    }
}

/// 记录存在但不是合法 UTF-8 -> `MalformedStatusRecord`
fn decode_value(key: &str, value: Option<Vec<u8>>) -> Result<Option<String>> {
    value
        .map(|bytes| {
            String::from_utf8(bytes).map_err(|e| LscError::MalformedStatusRecord {
                key: key.to_string(),
                reason: format!(
                    "record is not valid UTF-8 (at byte {})",
                    e.utf8_error().valid_up_to()
                ),
            })
        })
        .transpose()
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        // 按字节取，非 UTF-8 的记录交给上层按损坏处理，而不是变成驱动层的类型错误
        let value: Option<Vec<u8>> = conn.get(key).await?;
        decode_value(key, value)
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.conn().await?;
        // SET / SET EX 都是整体覆盖，读者不会看到半截数据
        match self.record_ttl_secs {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_keeps_absent_and_text_records() {
        assert_eq!(decode_value("k", None).unwrap(), None);
        assert_eq!(
            decode_value("k", Some(br#"{"status":"running"}"#.to_vec())).unwrap(),
            Some(r#"{"status":"running"}"#.to_string())
        );
    }

    #[test]
    fn decode_flags_binary_record_as_malformed() {
        let err = decode_value("lsc:s1:10.0.0.1", Some(vec![b'{', 0xff])).unwrap_err();
        assert!(matches!(
            err,
            LscError::MalformedStatusRecord { key, reason }
                if key == "lsc:s1:10.0.0.1" && reason.contains("byte 1")
        ));
        assert!(!LscError::MalformedStatusRecord {
            key: String::new(),
            reason: String::new()
        }
        .is_retryable());
    }
}
