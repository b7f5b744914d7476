//! Agent 结果仓库
//!
//! 三层存放：会话内每 Agent 最新一条（UI 重绘用）、经花园存储落盘的历史、
//! 落盘失败时兜底的本地环形缓存。save 对调用方永不报错。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::AgentId;
use crate::garden::GardenStore;
use crate::permission::Action;

/// 兜底缓存总条数上限，超出先淘汰最旧
pub const RESULT_FALLBACK_CAP: usize = 100;
/// 单 Agent 近期查询上限
pub const RECENT_PER_AGENT: usize = 10;
/// 全体 Agent 合并近期查询上限
pub const RECENT_COMBINED: usize = 20;

/// 一次 Agent 运行的产出；创建后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    pub agent_id: AgentId,
    /// LLM 回复中 result_key 对应的字段，原样保留
    pub result_data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

impl AgentResult {
    pub fn new(agent_id: AgentId, result_data: serde_json::Value) -> Self {
        Self {
            agent_id,
            result_data,
            timestamp: Utc::now(),
            success: true,
        }
    }

    /// 结果里附带的待审批动作；缺失或格式不符的条目直接跳过
    pub fn proposed_actions(&self) -> Vec<Action> {
        self.result_data
            .get("proposedActions")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// 结果仓库
pub struct ResultStore {
    store: Arc<dyn GardenStore>,
    fallback: RwLock<VecDeque<AgentResult>>,
    session_latest: RwLock<HashMap<AgentId, AgentResult>>,
}

impl ResultStore {
    pub fn new(store: Arc<dyn GardenStore>) -> Self {
        Self {
            store,
            fallback: RwLock::new(VecDeque::new()),
            session_latest: RwLock::new(HashMap::new()),
        }
    }

    /// 保存一条结果。落盘失败转入兜底缓存，任何情况下都不向调用方报错。
    pub async fn save(&self, result: AgentResult) {
        if let Err(e) = self.store.append_result(&result).await {
            tracing::warn!(
                "Durable result write failed ({}), keeping '{}' in local cache",
                e,
                result.agent_id
            );
            let mut fallback = self.fallback.write().await;
            fallback.push_back(result);
            while fallback.len() > RESULT_FALLBACK_CAP {
                fallback.pop_front();
            }
        }
    }

    /// 按日历日查询历史；持久层不可用时过滤兜底缓存
    pub async fn get_by_date(&self, date: NaiveDate) -> Vec<AgentResult> {
        match self.store.load_results().await {
            Ok(history) => history
                .into_iter()
                .filter(|r| r.timestamp.date_naive() == date)
                .collect(),
            Err(e) => {
                tracing::warn!("Result history unavailable ({}), serving local cache", e);
                self.fallback
                    .read()
                    .await
                    .iter()
                    .filter(|r| r.timestamp.date_naive() == date)
                    .cloned()
                    .collect()
            }
        }
    }

    /// 全部历史；持久层不可用时返回兜底缓存
    pub async fn get_all(&self) -> Vec<AgentResult> {
        match self.store.load_results().await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!("Result history unavailable ({}), serving local cache", e);
                self.fallback.read().await.iter().cloned().collect()
            }
        }
    }

    /// 近期结果，新的在前。给了 agent_id 取该 Agent 最近 10 条，否则合并取 20 条。
    pub async fn get_recent(&self, agent_id: Option<AgentId>) -> Vec<AgentResult> {
        let mut history = self.get_all().await;
        if let Some(id) = agent_id {
            history.retain(|r| r.agent_id == id);
        }
        let limit = if agent_id.is_some() {
            RECENT_PER_AGENT
        } else {
            RECENT_COMBINED
        };
        history.sort_by_key(|r| std::cmp::Reverse(r.timestamp));
        history.truncate(limit);
        history
    }

    /// 本会话内该 Agent 的最新结果；仅供界面重绘，不作为历史来源
    pub async fn session_latest(&self, agent_id: AgentId) -> Option<AgentResult> {
        self.session_latest.read().await.get(&agent_id).cloned()
    }

    pub async fn set_session_latest(&self, result: AgentResult) {
        self.session_latest
            .write()
            .await
            .insert(result.agent_id, result);
    }
}
