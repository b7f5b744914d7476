//! 花园快照
//!
//! 每次 Agent 调用前从存储文档构建的只读视图：推导种植天数、养护日志截取最近若干条。
//! 快照只进不出，核心从不把快照写回存储。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::garden::store::GardenDocument;

/// 快照中保留的养护日志条数上限
pub const CARE_LOG_RECENT: usize = 10;

/// 单条养护日志
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareLogEntry {
    /// watering / fertilizing / pruning / harvesting ...
    pub activity: String,
    #[serde(default)]
    pub note: Option<String>,
    pub logged_at: DateTime<Utc>,
}

/// 快照中的单株植物
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantSnapshot {
    pub instance_id: String,
    pub plant_id: String,
    pub name: String,
    /// 自种植日起的天数（由 planted_on 推导）
    pub planting_age_days: i64,
    /// 品种从种植到成熟所需天数
    pub days_to_maturity: i64,
    pub last_health_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub observations: Vec<String>,
    /// 最近 CARE_LOG_RECENT 条养护记录（最新在后）
    #[serde(default)]
    pub care_log: Vec<CareLogEntry>,
}

/// 花园快照：一次 Agent 调用的花园侧输入
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GardenSnapshot {
    pub taken_at: DateTime<Utc>,
    pub plants: Vec<PlantSnapshot>,
}

impl GardenSnapshot {
    /// 从存储文档构建快照
    pub fn from_document(doc: &GardenDocument, now: DateTime<Utc>) -> Self {
        let plants = doc
            .plants
            .iter()
            .map(|p| {
                let age = (now.date_naive() - p.planted_on).num_days();
                let mut care_log = p.care_log.clone();
                if care_log.len() > CARE_LOG_RECENT {
                    care_log.drain(..care_log.len() - CARE_LOG_RECENT);
                }
                PlantSnapshot {
                    instance_id: p.instance_id.clone(),
                    plant_id: p.plant_id.clone(),
                    name: p.name.clone(),
                    planting_age_days: age,
                    days_to_maturity: p.days_to_maturity,
                    last_health_check: p.last_health_check,
                    notes: p.notes.clone(),
                    observations: p.observations.clone(),
                    care_log,
                }
            })
            .collect();

        Self {
            taken_at: now,
            plants,
        }
    }
}
