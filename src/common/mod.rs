pub mod config;
pub mod error;
pub mod model;
pub(crate) mod utils;

// 导出配置
pub use config::{LscConfig, PolicyConfig, PollConfig, PollMode, StoreConfig};

// 导出错误类型
pub use error::{LscError, Result};

// 导出核心模型
pub use model::{
    FailureReason, Finding, JobKey, JobRequest, JobStatus, PackageList, RunOutcome, StatusReport,
};

// 内部工具的快捷访问
pub(crate) use utils::calculate_backoff;
