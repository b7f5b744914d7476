//! Agent 运行器
//!
//! 单次 Agent 运行的全流程：查目录 → 置 running → 采集输入 → 一次 LLM 调用 →
//! 取 result 字段 → 置 complete/error 并通知。LLM 调用失败不重试；结果由调用方
//! 决定是否落库。同一 Agent 允许并发运行，状态行 last-write-wins。

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};

use crate::config::GardenSection;
use crate::core::{AgentDefinition, AgentError, AgentId, AgentInput, AgentRegistry, AgentState, StatusBoard};
use crate::garden::{GardenSnapshot, GardenStore, WeatherCache, WeatherSnapshot};
use crate::llm::{ChatMessage, LlmClient};
use crate::notify::{NoticeKind, Notifier};
use crate::results::AgentResult;

/// 调用方注入的输入覆盖；调度器用它复用本轮已采集的快照
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub garden: Option<GardenSnapshot>,
    pub weather: Option<WeatherSnapshot>,
}

/// Agent 运行器
pub struct AgentRunner {
    registry: AgentRegistry,
    store: Arc<dyn GardenStore>,
    weather: Arc<WeatherCache>,
    llm: Arc<dyn LlmClient>,
    status: Arc<StatusBoard>,
    notifier: Notifier,
    garden_cfg: GardenSection,
}

impl AgentRunner {
    pub fn new(
        store: Arc<dyn GardenStore>,
        weather: Arc<WeatherCache>,
        llm: Arc<dyn LlmClient>,
        status: Arc<StatusBoard>,
        notifier: Notifier,
        garden_cfg: GardenSection,
    ) -> Self {
        Self {
            registry: AgentRegistry::new(),
            store,
            weather,
            llm,
            status,
            notifier,
            garden_cfg,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// 按 wire 名运行。未知名字在触碰任何状态之前返回 UnknownAgent。
    pub async fn run_named(&self, name: &str) -> Result<AgentResult, AgentError> {
        let id = AgentId::parse(name)?;
        self.run(id).await
    }

    pub async fn run(&self, id: AgentId) -> Result<AgentResult, AgentError> {
        self.run_with_inputs(id, RunOverrides::default()).await
    }

    /// 运行一个 Agent；无论成败都以终态状态行收尾
    pub async fn run_with_inputs(
        &self,
        id: AgentId,
        overrides: RunOverrides,
    ) -> Result<AgentResult, AgentError> {
        let def = self.registry.get(id).clone();
        tracing::info!("Running agent: {}", def.display_name);
        self.status.set(id, AgentState::Running, None).await;

        match self.execute(&def, overrides).await {
            Ok(result) => {
                self.status
                    .set(
                        id,
                        AgentState::Complete,
                        Some(format!("{} ready", def.result_key)),
                    )
                    .await;
                self.notifier
                    .notify(NoticeKind::Success, format!("{} finished", def.display_name));
                Ok(result)
            }
            Err(e) => {
                self.status
                    .set(id, AgentState::Error, Some(e.to_string()))
                    .await;
                self.notifier.notify(
                    NoticeKind::Error,
                    format!("{} failed: {}", def.display_name, e),
                );
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        def: &AgentDefinition,
        overrides: RunOverrides,
    ) -> Result<AgentResult, AgentError> {
        let now = Utc::now();

        let garden = match overrides.garden {
            Some(snapshot) => snapshot,
            None => {
                let doc = self
                    .store
                    .load_garden()
                    .await
                    .map_err(AgentError::StoreUnavailable)?;
                GardenSnapshot::from_document(&doc, now)
            }
        };

        // 天气只在声明需要时采集；拉取失败由缓存兜底，不算错误
        let weather = if def.required_inputs.contains(&AgentInput::WeatherSnapshot) {
            Some(match overrides.weather {
                Some(snapshot) => snapshot,
                None => self.weather.refresh().await,
            })
        } else {
            None
        };

        let payload = self.build_payload(def, &garden, weather.as_ref(), now);
        let messages = [
            ChatMessage::system(build_system_prompt(def)),
            ChatMessage::user(format!(
                "Here is the current garden context:\n```json\n{}\n```",
                serde_json::to_string_pretty(&payload).unwrap_or_default()
            )),
        ];

        // 恰好一次，不重试
        let reply = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;

        let parsed = extract_json(&reply)?;
        let result_data = parsed
            .get(def.result_key)
            .cloned()
            .ok_or_else(|| {
                AgentError::MalformedResponse(format!(
                    "response missing '{}' field",
                    def.result_key
                ))
            })?;

        Ok(AgentResult::new(def.id, result_data))
    }

    /// 请求 payload 只包含该 Agent 声明过的输入
    fn build_payload(
        &self,
        def: &AgentDefinition,
        garden: &GardenSnapshot,
        weather: Option<&WeatherSnapshot>,
        now: DateTime<Utc>,
    ) -> serde_json::Value {
        let mut payload = serde_json::Map::new();
        for input in def.required_inputs {
            match input {
                AgentInput::GardenSnapshot => {
                    payload.insert(
                        "gardenSnapshot".to_string(),
                        serde_json::to_value(garden).unwrap_or_default(),
                    );
                }
                AgentInput::WeatherSnapshot => {
                    payload.insert(
                        "weatherSnapshot".to_string(),
                        weather
                            .map(|w| serde_json::to_value(w).unwrap_or_default())
                            .unwrap_or_default(),
                    );
                }
                AgentInput::StorageCapacity => {
                    let storage = &self.garden_cfg.storage;
                    payload.insert(
                        "storageCapacity".to_string(),
                        serde_json::json!({
                            "fridgeLiters": storage.fridge_liters,
                            "pantryLiters": storage.pantry_liters,
                            "freezerLiters": storage.freezer_liters,
                        }),
                    );
                }
                AgentInput::SeasonData => {
                    payload.insert(
                        "seasonData".to_string(),
                        serde_json::json!({
                            "season": season_for(&self.garden_cfg.hemisphere, now.month()),
                            "month": now.month(),
                            "hemisphere": self.garden_cfg.hemisphere,
                        }),
                    );
                }
                AgentInput::PlanningGoals => {
                    payload.insert(
                        "planningGoals".to_string(),
                        serde_json::json!(self.garden_cfg.planning_goals),
                    );
                }
            }
        }
        serde_json::Value::Object(payload)
    }
}

fn build_system_prompt(def: &AgentDefinition) -> String {
    format!(
        "You are the {} agent of a home garden assistant.\n\n{}\n\n\
         Respond with a single JSON object. Put your main output in the \"{}\" field \
         as an object. Inside it you may add a \"proposedActions\" array for concrete \
         follow-ups you want applied; each entry has \"type\" (one of schedule_adjustment, \
         notification, reminder, data_collection, monitoring), an optional \"severity\" \
         (minor, moderate, major), a \"description\", an optional \"expectedOutcome\" \
         and a \"details\" object.",
        def.display_name, def.instructions, def.result_key
    )
}

/// 提取 LLM 回复中的 JSON（```json 块或首尾大括号之间）
fn extract_json(reply: &str) -> Result<serde_json::Value, AgentError> {
    let trimmed = reply.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end >= start {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        trimmed
    };

    serde_json::from_str(json_str)
        .map_err(|e| AgentError::MalformedResponse(format!("not valid JSON: {}", e)))
}

/// 按半球换算月份对应的季节
fn season_for(hemisphere: &str, month: u32) -> &'static str {
    let month = if hemisphere.eq_ignore_ascii_case("southern") {
        (month + 5) % 12 + 1
    } else {
        month
    };
    match month {
        3..=5 => "spring",
        6..=8 => "summer",
        9..=11 => "autumn",
        _ => "winter",
    }
}
