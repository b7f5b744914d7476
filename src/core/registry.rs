//! Agent 目录
//!
//! 固定的五个 Agent：每个声明显示名、所需输入与结果字段，进程启动时定死、从不变更。
//! `AgentId::parse` 是唯一的字符串入口，未知名字返回 `UnknownAgent`。

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// Agent 标识（wire 名为 camelCase，与前端/LLM 约定一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentId {
    ProactiveCare,
    HealthMonitor,
    HarvestOptimizer,
    GardenPlanner,
    EnvironmentalIntelligence,
}

impl AgentId {
    /// 全部 Agent，按监测周期的执行优先级排序
    pub const ALL: [AgentId; 5] = [
        AgentId::ProactiveCare,
        AgentId::HealthMonitor,
        AgentId::HarvestOptimizer,
        AgentId::GardenPlanner,
        AgentId::EnvironmentalIntelligence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::ProactiveCare => "proactiveCare",
            AgentId::HealthMonitor => "healthMonitor",
            AgentId::HarvestOptimizer => "harvestOptimizer",
            AgentId::GardenPlanner => "gardenPlanner",
            AgentId::EnvironmentalIntelligence => "environmentalIntelligence",
        }
    }

    /// 解析 wire 名；未知名字返回 UnknownAgent，调用方不应在此之前触碰任何状态
    pub fn parse(s: &str) -> Result<AgentId, AgentError> {
        match s {
            "proactiveCare" => Ok(AgentId::ProactiveCare),
            "healthMonitor" => Ok(AgentId::HealthMonitor),
            "harvestOptimizer" => Ok(AgentId::HarvestOptimizer),
            "gardenPlanner" => Ok(AgentId::GardenPlanner),
            "environmentalIntelligence" => Ok(AgentId::EnvironmentalIntelligence),
            _ => Err(AgentError::UnknownAgent(s.to_string())),
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent 运行所需的输入种类（请求 payload 中只带声明过的子集）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentInput {
    GardenSnapshot,
    WeatherSnapshot,
    StorageCapacity,
    SeasonData,
    PlanningGoals,
}

/// 单个 Agent 的静态定义
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub id: AgentId,
    pub display_name: &'static str,
    pub required_inputs: &'static [AgentInput],
    /// LLM 响应 JSON 中承载主要结果的字段名
    pub result_key: &'static str,
    /// 拼入 system prompt 的任务说明
    pub instructions: &'static str,
}

/// 固定目录：五个 Agent 的定义表，纯查找、无副作用
pub struct AgentRegistry {
    definitions: [AgentDefinition; 5],
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            definitions: [
                AgentDefinition {
                    id: AgentId::ProactiveCare,
                    display_name: "Proactive Care",
                    required_inputs: &[AgentInput::GardenSnapshot, AgentInput::WeatherSnapshot],
                    result_key: "recommendations",
                    instructions: "Review every plant's care log, observations and the weather \
                        outlook, then recommend the care tasks the gardener should do next \
                        (watering, feeding, pruning, protection). Be specific about which plant \
                        and why.",
                },
                AgentDefinition {
                    id: AgentId::HealthMonitor,
                    display_name: "Health Monitor",
                    required_inputs: &[AgentInput::GardenSnapshot],
                    result_key: "healthAssessment",
                    instructions: "Assess the health of each plant from its notes, observations \
                        and care history. Flag signs of disease, pests or stress, and rate \
                        overall garden health.",
                },
                AgentDefinition {
                    id: AgentId::HarvestOptimizer,
                    display_name: "Harvest Optimizer",
                    required_inputs: &[
                        AgentInput::GardenSnapshot,
                        AgentInput::WeatherSnapshot,
                        AgentInput::StorageCapacity,
                    ],
                    result_key: "harvestSchedule",
                    instructions: "Plan the coming harvests: which plants are at or near \
                        maturity, the best picking window given the weather, and how to use \
                        the available storage capacity.",
                },
                AgentDefinition {
                    id: AgentId::GardenPlanner,
                    display_name: "Garden Planner",
                    required_inputs: &[
                        AgentInput::GardenSnapshot,
                        AgentInput::SeasonData,
                        AgentInput::PlanningGoals,
                    ],
                    result_key: "plan",
                    instructions: "Propose a forward plan for the garden: what to sow or \
                        transplant next, succession planting, and bed rotation, aligned with \
                        the season and the gardener's stated goals.",
                },
                AgentDefinition {
                    id: AgentId::EnvironmentalIntelligence,
                    display_name: "Environmental Intelligence",
                    required_inputs: &[AgentInput::GardenSnapshot, AgentInput::WeatherSnapshot],
                    result_key: "analysis",
                    instructions: "Analyze how the current and forecast weather affects the \
                        garden: frost or heat risk, watering adjustments, and any protective \
                        measures worth taking now.",
                },
            ],
        }
    }

    /// 目录查询：AgentId 必然在目录中，查询是全函数
    pub fn get(&self, id: AgentId) -> &AgentDefinition {
        &self.definitions[Self::index(id)]
    }

    /// 按优先级顺序遍历全部定义
    pub fn all(&self) -> impl Iterator<Item = &AgentDefinition> {
        self.definitions.iter()
    }

    fn index(id: AgentId) -> usize {
        match id {
            AgentId::ProactiveCare => 0,
            AgentId::HealthMonitor => 1,
            AgentId::HarvestOptimizer => 2,
            AgentId::GardenPlanner => 3,
            AgentId::EnvironmentalIntelligence => 4,
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
