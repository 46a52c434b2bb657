use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, time::Duration};

use crate::common::error::{LscError, Result};

// ==========================================
// 1. 任务标识 (JobKey)
// ==========================================

/// 任务身份标识 `(scan_id, host_ip)`
///
/// 同一个 Key 在 Store 里最多只有一条存活记录。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub scan_id: String,
    pub host_ip: String,
}

impl JobKey {
    /// 创建并校验标识
    ///
    /// - scan_id 与 host_ip 去掉空白后都不能为空。
    /// - scan_id 不能包含 `:`。host_ip 可以 (IPv6)，它是 Store Key 的最后一段，
    ///   命名空间和 scan_id 都不含 `:` 时 Key 才能唯一还原出 (scan_id, host_ip)。
    pub fn new(scan_id: impl Into<String>, host_ip: impl Into<String>) -> Result<Self> {
        let scan_id = scan_id.into();
        let host_ip = host_ip.into();
        if scan_id.trim().is_empty() {
            return Err(LscError::Encoding("scan_id cannot be empty".into()));
        }
        if scan_id.contains(':') {
            return Err(LscError::Encoding(format!(
                "scan_id '{}' must not contain ':'",
                scan_id
            )));
        }
        if host_ip.trim().is_empty() {
            return Err(LscError::Encoding("host_ip cannot be empty".into()));
        }
        Ok(Self { scan_id, host_ip })
    }

    /// 生成 Store Key: `{namespace}:{scan_id}:{host_ip}`
    ///
    /// 这是与 Evaluator 约定的外部契约，必须逐字节一致。
    pub fn store_key(&self, namespace: &str) -> String {
        format!("{}:{}:{}", namespace, self.scan_id, self.host_ip)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scan_id, self.host_ip)
    }
}

// ==========================================
// 2. 包列表 (PackageList)
// ==========================================

/// 已安装软件包清单
///
/// 每一项是一个包描述字符串 (例如 `libssl1.1=1.1.1`)，顺序保持采集时的顺序。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageList(Vec<String>);

impl PackageList {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(items.into_iter().map(Into::into).collect())
    }

    /// 解析扫描器采集到的换行分隔文本
    ///
    /// - 每行去掉首尾空白
    /// - 空行跳过
    pub fn parse(text: &str) -> Self {
        Self(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// 从原始字节解析 (SSH 采集到的输出可能不是合法 UTF-8)
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw).map_err(|e| {
            LscError::Encoding(format!(
                "package list is not valid UTF-8 (at byte {}): {}",
                e.valid_up_to(),
                e
            ))
        })?;
        Ok(Self::parse(text))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PackageList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

// ==========================================
// 3. 任务请求 (JobRequest)
// ==========================================

/// 一次 LSC 任务请求
///
/// - 由 Orchestrator 在 run 开始时创建，编码一次，之后不再修改。
/// - 字段顺序即 JSON 输出顺序，是 Evaluator 读取的请求格式。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub scan_id: String,
    pub host_ip: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub os_release: String,
    #[serde(default)]
    pub package_list: PackageList,
}

impl JobRequest {
    pub fn new(
        key: JobKey,
        hostname: impl Into<String>,
        os_release: impl Into<String>,
        package_list: PackageList,
    ) -> Self {
        Self {
            scan_id: key.scan_id,
            host_ip: key.host_ip,
            hostname: hostname.into(),
            os_release: os_release.into(),
            package_list,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            scan_id: self.scan_id.clone(),
            host_ip: self.host_ip.clone(),
        }
    }

    /// 包列表为空表示“无需检查”
    pub fn is_noop(&self) -> bool {
        self.package_list.is_empty()
    }
}

// ==========================================
// 4. 任务状态 (JobStatus)
// ==========================================

/// 任务状态
///
/// 流转是单调的: queued -> running -> 某个终态。
/// `Timeout` 只在本地合成，从不写入或读取自 Store。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    /// 已发布，Evaluator 尚未响应
    Queued,
    /// Evaluator 正在处理
    Running,
    /// 处理完成，并且有命中
    FinishedWithResults,
    /// 处理完成，没有命中
    FinishedEmpty,
    /// Evaluator 报错，或者记录损坏
    Error,
    /// 本地合成: 在截止时间内没有等到终态
    Timeout,
}

impl JobStatus {
    /// 状态是否是终态 (不再需要轮询)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::FinishedWithResults | JobStatus::FinishedEmpty | JobStatus::Error
        )
    }

    /// Store 中允许出现的状态字符串
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "finished-with-results" => Some(JobStatus::FinishedWithResults),
            "finished-empty" => Some(JobStatus::FinishedEmpty),
            "error" => Some(JobStatus::Error),
            // timeout 是本地状态，出现在 Store 里说明记录有问题
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::FinishedWithResults => "finished-with-results",
            JobStatus::FinishedEmpty => "finished-empty",
            JobStatus::Error => "error",
            JobStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 5. 命中结果 (Finding)
// ==========================================

/// Evaluator 返回的一条命中
///
/// 只要求是 JSON 对象。常用字段提供访问器，其余字段原样保留。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Finding(Map<String, Value>);

impl Finding {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// 受影响的包
    pub fn pkg(&self) -> Option<&str> {
        self.get_str("pkg")
    }

    /// CVE 编号
    pub fn cve(&self) -> Option<&str> {
        self.get_str("cve")
    }

    /// 对应的检测脚本 OID
    pub fn oid(&self) -> Option<&str> {
        self.get_str("oid")
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }
}

// ==========================================
// 6. 状态报告 (StatusReport)
// ==========================================

/// Status Reader 的分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: JobStatus,
    /// 仅在 `finished-*` 时非空
    pub results: Vec<Finding>,
    /// 仅在 `error` 时存在
    pub error: Option<String>,
    /// 是否因为记录损坏 (而非 Evaluator 主动报错) 被判定为 error
    pub malformed: bool,
}

impl StatusReport {
    pub fn queued() -> Self {
        Self::bare(JobStatus::Queued)
    }

    pub fn running() -> Self {
        Self::bare(JobStatus::Running)
    }

    /// `finished-with-results`，状态以 Evaluator 写入的为准，不根据 results 是否为空推断
    pub fn finished_with_results(results: Vec<Finding>) -> Self {
        Self {
            status: JobStatus::FinishedWithResults,
            results,
            error: None,
            malformed: false,
        }
    }

    pub fn finished_empty() -> Self {
        Self::bare(JobStatus::FinishedEmpty)
    }

    /// Evaluator 主动上报的错误
    pub fn evaluator_error(detail: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            results: Vec::new(),
            error: Some(detail.into()),
            malformed: false,
        }
    }

    /// 记录存在但无法解析
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            results: Vec::new(),
            error: Some(detail.into()),
            malformed: true,
        }
    }

    fn bare(status: JobStatus) -> Self {
        Self {
            status,
            results: Vec::new(),
            error: None,
            malformed: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ==========================================
// 7. 最终结果 (RunOutcome)
// ==========================================

/// 失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Evaluator 写回了 `status: error`
    Evaluator(String),
    /// 记录存在但损坏
    MalformedRecord(String),
    /// 扫描被中止
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Evaluator(msg) => write!(f, "evaluator error: {}", msg),
            FailureReason::MalformedRecord(msg) => write!(f, "malformed status record: {}", msg),
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// 一次 run / status_check 的最终结论
///
/// 只有 `Done` 携带结果；失败与超时不会返回任何部分结果。
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// 终态: finished-with-results / finished-empty
    Done(StatusReport),
    /// 在截止时间内未等到终态 (任务可能稍后完成)
    TimedOut { elapsed: Duration },
    /// Evaluator 报错、记录损坏或被取消
    Failed(FailureReason),
}

impl RunOutcome {
    /// 对外暴露的状态枚举
    pub fn status(&self) -> JobStatus {
        match self {
            RunOutcome::Done(report) => report.status,
            RunOutcome::TimedOut { .. } => JobStatus::Timeout,
            RunOutcome::Failed(_) => JobStatus::Error,
        }
    }

    pub fn findings(&self) -> &[Finding] {
        match self {
            RunOutcome::Done(report) => &report.results,
            _ => &[],
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Failed(FailureReason::Cancelled))
    }

    /// 从终态报告推导最终结论
    ///
    /// 非终态报告没有对应结论，返回 None。
    pub(crate) fn from_terminal(report: StatusReport) -> Option<Self> {
        match report.status {
            JobStatus::FinishedWithResults | JobStatus::FinishedEmpty => {
                Some(RunOutcome::Done(report))
            }
            JobStatus::Error => {
                let detail = report.error.unwrap_or_default();
                let reason = if report.malformed {
                    FailureReason::MalformedRecord(detail)
                } else {
                    FailureReason::Evaluator(detail)
                };
                Some(RunOutcome::Failed(reason))
            }
            JobStatus::Queued | JobStatus::Running | JobStatus::Timeout => None,
        }
    }
}
