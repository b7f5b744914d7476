//! 权限工作流
//!
//! 动作模型、风险分级与审批闸门。

pub mod action;
pub mod gate;
pub mod risk;

pub use action::{Action, ActionExecutor, ActionKind, GardenActionExecutor, Severity};
pub use gate::{ActionRequest, AutoApprovalPolicy, PermissionGate, RequestStatus};
pub use risk::{classify, ActionRisk};
