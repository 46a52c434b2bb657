use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    common::{FailureReason, JobKey, JobRequest, LscError, RunOutcome, StatusReport},
    orchestrator::{OrchestratorContext, OrchestratorMetrics, OrchestratorPlugin},
};

/// 指标插件，由 Builder 自动注入到插件链最前面
pub struct MetricsPlugin {
    metrics: Arc<OrchestratorMetrics>,
}

impl MetricsPlugin {
    pub fn new(metrics: Arc<OrchestratorMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl OrchestratorPlugin for MetricsPlugin {
    async fn on_publish(&self, _ctx: &OrchestratorContext, _request: &JobRequest) {
        self.metrics.inc_published();
    }

    async fn on_poll(&self, _ctx: &OrchestratorContext, _key: &JobKey, _report: &StatusReport) {
        self.metrics.inc_polls();
    }

    async fn on_store_retry(&self, _ctx: &OrchestratorContext, _key: &JobKey, _error: &LscError) {
        self.metrics.inc_store_retries();
    }

    // 终态分类计数
    async fn on_finish(&self, _ctx: &OrchestratorContext, _key: &JobKey, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Done(_) => self.metrics.inc_done(),
            RunOutcome::TimedOut { .. } => self.metrics.inc_timed_out(),
            RunOutcome::Failed(FailureReason::Cancelled) => self.metrics.inc_cancelled(),
            RunOutcome::Failed(_) => self.metrics.inc_failed(),
        }
    }
}
