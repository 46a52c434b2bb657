pub mod builder;
pub mod context;
pub mod core;
pub mod metrics;
mod pacemaker;
pub mod plugin;
pub mod plugins;

pub use builder::OrchestratorBuilder;
pub use context::OrchestratorContext;
pub use core::LscOrchestrator;
pub use metrics::{MetricsSnapshot, OrchestratorMetrics};
pub use plugin::{NoOpPlugin, OrchestratorPlugin};
