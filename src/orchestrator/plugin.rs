use crate::{
    common::{JobKey, JobRequest, LscError, RunOutcome, StatusReport},
    orchestrator::context::OrchestratorContext,
};
use async_trait::async_trait;

/// 编排器插件/钩子接口
///
/// 用户可以通过实现此 Trait 来介入每个任务的生命周期。
/// 常见用途：
/// - 自定义日志/监控 (Metrics)
/// - 把命中结果转发给报告模块
/// - 错误报警 (Alerting)
///
/// 钩子在任务所在的协程里同步执行，不要在里面做长时间阻塞。
#[async_trait]
pub trait OrchestratorPlugin: Send + Sync + 'static {
    /// 请求已成功写入 Store
    async fn on_publish(&self, _ctx: &OrchestratorContext, _request: &JobRequest) {}

    /// 每次读取并分类状态记录后调用
    async fn on_poll(&self, _ctx: &OrchestratorContext, _key: &JobKey, _report: &StatusReport) {}

    /// Store 暂时性故障，即将退避重试
    async fn on_store_retry(&self, _ctx: &OrchestratorContext, _key: &JobKey, _error: &LscError) {}

    /// 任务得出最终结论 (Done / TimedOut / Failed)
    async fn on_finish(&self, _ctx: &OrchestratorContext, _key: &JobKey, _outcome: &RunOutcome) {}
}

// ==========================================
// 默认的空插件 (No-Op)
// ==========================================

pub struct NoOpPlugin;

#[async_trait]
impl OrchestratorPlugin for NoOpPlugin {}
