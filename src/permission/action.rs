//! 动作定义与执行器
//!
//! Agent 提议的动作（调整养护计划、提醒、采集数据）要先过审批闸门；
//! 通过后由 ActionExecutor 按类型落地。执行器只在审批之后被调用。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::garden::{GardenStore, ScheduleAdjustment};
use crate::notify::{NoticeKind, Notifier};

/// 动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ScheduleAdjustment,
    Notification,
    DataCollection,
    Monitoring,
    Reminder,
    /// LLM 给出的未识别类型统一归为 other（一律按高风险处理）
    #[serde(other)]
    Other,
}

/// 动作影响程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
}

/// Agent 提议的一个动作
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub severity: Option<Severity>,
    pub description: String,
    #[serde(default)]
    pub expected_outcome: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// 动作执行接口：审批通过后按类型分派
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn adjust_schedule(&self, action: &Action) -> Result<(), String>;
    async fn send_notification(&self, action: &Action) -> Result<(), String>;
    async fn collect_data(&self, action: &Action) -> Result<(), String>;
}

/// 默认执行器：计划调整写回花园文档，提醒走通知面板，数据采集记为植物观察
pub struct GardenActionExecutor {
    store: Arc<dyn GardenStore>,
    notifier: Notifier,
}

impl GardenActionExecutor {
    pub fn new(store: Arc<dyn GardenStore>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }
}

#[async_trait]
impl ActionExecutor for GardenActionExecutor {
    async fn adjust_schedule(&self, action: &Action) -> Result<(), String> {
        let adjustment = ScheduleAdjustment {
            description: action.description.clone(),
            details: action.details.clone(),
            applied_at: Utc::now(),
        };
        // 同一批结果的动作并发落地，读改写必须在存储端串行
        self.store
            .update_garden(Box::new(move |doc| {
                doc.schedule_adjustments.push(adjustment);
                Ok(())
            }))
            .await
    }

    async fn send_notification(&self, action: &Action) -> Result<(), String> {
        self.notifier
            .notify(NoticeKind::Info, action.description.clone());
        Ok(())
    }

    async fn collect_data(&self, action: &Action) -> Result<(), String> {
        // details.instanceId 指定了目标植物时，把采集请求挂到它的观察记录上
        let instance_id = action
            .details
            .get("instanceId")
            .and_then(|v| v.as_str())
            .map(String::from);

        match instance_id {
            Some(instance_id) => {
                let observation = action.description.clone();
                self.store
                    .update_garden(Box::new(move |doc| {
                        let plant = doc
                            .plants
                            .iter_mut()
                            .find(|p| p.instance_id == instance_id)
                            .ok_or_else(|| {
                                format!("No plant with instance id {}", instance_id)
                            })?;
                        plant.observations.push(observation);
                        Ok(())
                    }))
                    .await
            }
            None => {
                tracing::debug!("Data collection noted: {}", action.description);
                Ok(())
            }
        }
    }
}
