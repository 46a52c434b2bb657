use serde_json::{Map, Value};
use tracing::trace;

use crate::common::{Finding, JobKey, JobStatus, LscError, Result, StatusReport};
use crate::persistence::{KvStore, LoadStatus};

/// 读取并分类一个任务的状态记录
///
/// Store 故障原样返回错误 (由调用方决定是否重试)；记录内容问题一律体现在 `StatusReport` 里，
/// 包括 Store 层发现的非文本记录 (`LscError::MalformedStatusRecord`)。
pub async fn read_status<S>(store: &S, namespace: &str, key: &JobKey) -> Result<StatusReport>
where
    S: KvStore + ?Sized,
{
    let store_key = key.store_key(namespace);
    let report = match store.get(&store_key).await {
        Ok(raw) => classify_record(key, raw.as_deref()),
        Err(LscError::MalformedStatusRecord { reason, .. }) => StatusReport::malformed(reason),
        Err(e) => return Err(e),
    };
    trace!(
        scan_id = %key.scan_id,
        host_ip = %key.host_ip,
        status = %report.status,
        "status record classified"
    );
    Ok(report)
}

/// 对一条原始记录做分类 (纯函数)
///
/// - 记录不存在 -> `queued` (Evaluator 还没响应)
/// - 记录仍是我们发布的请求文档 -> `queued`
/// - 记录存在但无法解析、结构不对、或属于别的任务 -> `error` (malformed)，绝不降级为 `queued`
pub fn classify_record(key: &JobKey, raw: Option<&str>) -> StatusReport {
    match LoadStatus::from_raw(raw) {
        LoadStatus::NotFound => StatusReport::queued(),
        LoadStatus::DataCorrupted { reason, .. } => {
            StatusReport::malformed(format!("invalid JSON: {}", reason))
        }
        LoadStatus::Found(Value::Object(doc)) => classify_document(key, doc),
        LoadStatus::Found(_) => StatusReport::malformed("record is not a JSON object"),
    }
}

fn classify_document(key: &JobKey, mut doc: Map<String, Value>) -> StatusReport {
    // 1. 归属校验: 记录里若回显了身份，必须与当前任务一致
    for (field, expected) in [("scan_id", &key.scan_id), ("host_ip", &key.host_ip)] {
        if let Some(v) = doc.get(field) {
            if v.as_str() != Some(expected.as_str()) {
                return StatusReport::malformed(format!(
                    "record belongs to another job ({} is {}, expected '{}')",
                    field, v, expected
                ));
            }
        }
    }

    // 2. 状态字段
    let status = match doc.get("status") {
        // 没有 status，但仍是请求文档: Evaluator 还没接手
        None if doc.contains_key("package_list") => return StatusReport::queued(),
        None => return StatusReport::malformed("record has no 'status' field"),
        Some(Value::String(s)) => match JobStatus::from_wire(s) {
            Some(status) => status,
            None => return StatusReport::malformed(format!("unknown status '{}'", s)),
        },
        Some(other) => {
            return StatusReport::malformed(format!("'status' is not a string: {}", other));
        }
    };

    // 3. 按状态提取载荷
    match status {
        // 非终态不暴露任何部分结果
        JobStatus::Queued => StatusReport::queued(),
        JobStatus::Running => StatusReport::running(),
        JobStatus::Error => {
            let detail = match doc.remove("error") {
                Some(Value::String(s)) if !s.is_empty() => s,
                Some(Value::Null) | None => "evaluator reported an error without detail".into(),
                Some(Value::String(_)) => "evaluator reported an error without detail".into(),
                Some(other) => other.to_string(),
            };
            StatusReport::evaluator_error(detail)
        }
        JobStatus::FinishedWithResults | JobStatus::FinishedEmpty => {
            let results = match parse_results(doc.remove("results")) {
                Ok(r) => r,
                Err(reason) => return StatusReport::malformed(reason),
            };
            match status {
                JobStatus::FinishedEmpty if !results.is_empty() => StatusReport::malformed(format!(
                    "'finished-empty' record carries {} results",
                    results.len()
                )),
                JobStatus::FinishedEmpty => StatusReport::finished_empty(),
                _ => StatusReport::finished_with_results(results),
            }
        }
        JobStatus::Timeout => StatusReport::malformed("'timeout' is not a stored status"),
    }
}

/// 解析 results 数组
///
/// - 缺失或 null 视为空列表
/// - 每一项必须是 JSON 对象
fn parse_results(raw: Option<Value>) -> std::result::Result<Vec<Finding>, String> {
    let items = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(format!("'results' is not an array: {}", other)),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(fields) => Ok(Finding::new(fields)),
            other => Err(format!("results[{}] is not an object: {}", i, other)),
        })
        .collect()
}

impl StatusReport {
    /// 把“记录损坏”转成错误，供希望用 `?` 处理的调用方使用
    pub fn ensure_well_formed(self, store_key: &str) -> Result<Self> {
        if self.malformed {
            return Err(LscError::MalformedStatusRecord {
                key: store_key.to_string(),
                reason: self.error.unwrap_or_default(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use async_trait::async_trait;

    /// 记录存在但不是合法 UTF-8 (例如 Redis 里的二进制值)
    struct BinaryRecordStore;

    #[async_trait]
    impl KvStore for BinaryRecordStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Err(LscError::MalformedStatusRecord {
                key: key.to_string(),
                reason: "record is not valid UTF-8 (at byte 0)".into(),
            })
        }

        async fn put(&self, _key: &str, _value: String) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    fn key() -> JobKey {
        JobKey::new("s1", "10.0.0.1").unwrap()
    }

    #[test]
    fn missing_record_is_queued() {
        let report = classify_record(&key(), None);
        assert_eq!(report.status, JobStatus::Queued);
        assert!(!report.malformed);
    }

    #[test]
    fn invalid_json_is_error_never_queued() {
        for raw in ["", "{", "not json", "{\"status\":\"running\""] {
            let report = classify_record(&key(), Some(raw));
            assert_eq!(report.status, JobStatus::Error, "raw = {raw:?}");
            assert!(report.malformed);
            assert!(report.error.as_deref().unwrap().starts_with("invalid JSON"));
        }
    }

    #[test]
    fn pending_request_document_is_queued() {
        let raw = r#"{"scan_id":"s1","host_ip":"10.0.0.1","hostname":"","os_release":"debian10","package_list":["bash=5.1"]}"#;
        assert_eq!(classify_record(&key(), Some(raw)).status, JobStatus::Queued);
    }

    #[test]
    fn structural_problems_are_malformed() {
        let cases = [
            r#"[1,2,3]"#,
            r#"{"foo":"bar"}"#,
            r#"{"status":"paused"}"#,
            r#"{"status":"timeout"}"#,
            r#"{"status":7}"#,
            r#"{"status":"finished-with-results","results":{"pkg":"x"}}"#,
            r#"{"status":"finished-with-results","results":["CVE-1"]}"#,
            r#"{"status":"finished-empty","results":[{"pkg":"x"}]}"#,
            r#"{"status":"running","scan_id":"s2"}"#,
            r#"{"status":"running","host_ip":"10.0.0.2"}"#,
        ];
        for raw in cases {
            let report = classify_record(&key(), Some(raw));
            assert_eq!(report.status, JobStatus::Error, "raw = {raw}");
            assert!(report.malformed, "raw = {raw}");
        }
    }

    #[test]
    fn non_terminal_states_hide_results() {
        let report = classify_record(
            &key(),
            Some(r#"{"status":"running","results":[{"pkg":"x"}]}"#),
        );
        assert_eq!(report.status, JobStatus::Running);
        assert!(report.results.is_empty());
    }

    #[test]
    fn finished_with_results_carries_findings() {
        let report = classify_record(
            &key(),
            Some(
                r#"{"status":"finished-with-results","results":[{"pkg":"libssl1.1","cve":"CVE-XXXX","oid":"1.3.6.1.4.1.25623.1.1.2.2021.1"}]}"#,
            ),
        );
        assert_eq!(report.status, JobStatus::FinishedWithResults);
        assert_eq!(report.results.len(), 1);
        let finding = &report.results[0];
        assert_eq!(finding.pkg(), Some("libssl1.1"));
        assert_eq!(finding.cve(), Some("CVE-XXXX"));
        assert_eq!(finding.oid(), Some("1.3.6.1.4.1.25623.1.1.2.2021.1"));
    }

    #[test]
    fn finished_empty_with_or_without_results_field() {
        for raw in [
            r#"{"status":"finished-empty"}"#,
            r#"{"status":"finished-empty","results":[]}"#,
            r#"{"status":"finished-empty","results":null}"#,
        ] {
            let report = classify_record(&key(), Some(raw));
            assert_eq!(report.status, JobStatus::FinishedEmpty, "raw = {raw}");
            assert!(report.results.is_empty());
        }
        let report = classify_record(&key(), Some(r#"{"status":"finished-with-results","results":[]}"#));
        assert_eq!(report.status, JobStatus::FinishedWithResults);
    }

    #[test]
    fn evaluator_error_detail() {
        let report = classify_record(&key(), Some(r#"{"status":"error","error":"unknown os_release"}"#));
        assert_eq!(report.status, JobStatus::Error);
        assert!(!report.malformed);
        assert_eq!(report.error.as_deref(), Some("unknown os_release"));

        let report = classify_record(&key(), Some(r#"{"status":"error"}"#));
        assert!(report.error.unwrap().contains("without detail"));
    }

    #[test]
    fn matching_identity_echo_is_accepted() {
        let report = classify_record(
            &key(),
            Some(r#"{"status":"running","scan_id":"s1","host_ip":"10.0.0.1"}"#),
        );
        assert_eq!(report.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn read_status_goes_through_the_store() {
        let store = MemoryStore::new();
        let k = key();
        assert_eq!(read_status(&store, "lsc", &k).await.unwrap().status, JobStatus::Queued);

        store
            .put("lsc:s1:10.0.0.1", r#"{"status":"running"}"#.into())
            .await
            .unwrap();
        assert_eq!(read_status(&store, "lsc", &k).await.unwrap().status, JobStatus::Running);
        // 命名空间不同就是不同的 Key
        assert_eq!(read_status(&store, "other", &k).await.unwrap().status, JobStatus::Queued);

        store.fail_next(1);
        assert!(matches!(
            read_status(&store, "lsc", &k).await,
            Err(LscError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn non_text_record_is_malformed_not_a_store_error() {
        let report = read_status(&BinaryRecordStore, "lsc", &key()).await.unwrap();
        assert_eq!(report.status, JobStatus::Error);
        assert!(report.malformed);
        assert!(report.error.as_deref().unwrap().contains("UTF-8"));
    }

    #[test]
    fn ensure_well_formed_surfaces_malformed_records() {
        let err = classify_record(&key(), Some("{oops"))
            .ensure_well_formed("lsc:s1:10.0.0.1")
            .unwrap_err();
        assert!(matches!(err, LscError::MalformedStatusRecord { key, .. } if key == "lsc:s1:10.0.0.1"));

        let ok = classify_record(&key(), Some(r#"{"status":"error","error":"boom"}"#))
            .ensure_well_formed("lsc:s1:10.0.0.1")
            .unwrap();
        assert_eq!(ok.error.as_deref(), Some("boom"));
    }
}
