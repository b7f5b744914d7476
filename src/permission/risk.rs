//! 动作风险分级
//!
//! 纯函数：任何动作都落入四级之一，分级决定能否按策略自动通过。
//! 优先级自上而下，首条命中生效。

use serde::Serialize;

use crate::permission::{Action, ActionKind, Severity};

/// 风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRisk {
    /// 只读数据采集
    Data,
    /// 仅产生提醒
    Notification,
    /// 轻微的计划调整
    Low,
    /// 其余一律高风险，永不自动通过
    High,
}

/// 为动作分级；对所有输入组合都有定义
pub fn classify(action: &Action) -> ActionRisk {
    match action.kind {
        ActionKind::DataCollection | ActionKind::Monitoring => ActionRisk::Data,
        ActionKind::Notification | ActionKind::Reminder => ActionRisk::Notification,
        ActionKind::ScheduleAdjustment if action.severity == Some(Severity::Minor) => {
            ActionRisk::Low
        }
        _ => ActionRisk::High,
    }
}
