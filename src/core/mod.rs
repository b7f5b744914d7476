//! 核心编排层：Agent 目录、状态看板、运行器、监测调度、主控循环

pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod status;

pub use error::AgentError;
pub use orchestrator::{create_orchestrator, Command};
pub use registry::{AgentDefinition, AgentId, AgentInput, AgentRegistry};
pub use runner::{AgentRunner, RunOverrides};
pub use scheduler::MonitoringScheduler;
pub use status::{AgentState, AgentStatus, StatusBoard};
