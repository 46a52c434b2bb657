// 1. 基础模块
pub mod common;

// 2. 存储与等待策略
pub mod persistence;
pub mod policy;

// 3. LSC 记录编解码
pub mod lsc;

// 4. 编排器核心
pub mod orchestrator;

pub use common::{
    FailureReason, Finding, JobKey, JobRequest, JobStatus, LscConfig, LscError, PackageList,
    Result, RunOutcome, StatusReport,
};
pub use lsc::{encode_request, read_status};
pub use orchestrator::{LscOrchestrator, OrchestratorBuilder};
pub use persistence::{KvStore, MemoryStore};
