//! Agent 状态看板
//!
//! 每个 Agent 固定一行（idle/running/complete/error），初始化时创建、每次运行覆写、从不删除。
//! 并发运行同一 Agent 时为 last-write-wins。看板通过 watch 通道投影快照，供界面订阅。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};

use crate::core::AgentId;

/// Agent 运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Running,
    Complete,
    Error,
}

/// 看板中单个 Agent 的一行
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub agent_id: AgentId,
    pub state: AgentState,
    /// 最近一次运行的简述（完成摘要或错误信息）
    pub last_description: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// 状态看板：一行 / Agent；set 覆写并向 watch 投影最新快照
pub struct StatusBoard {
    rows: RwLock<HashMap<AgentId, AgentStatus>>,
    tx: watch::Sender<Vec<AgentStatus>>,
}

impl StatusBoard {
    pub fn new() -> (Arc<Self>, watch::Receiver<Vec<AgentStatus>>) {
        let rows: HashMap<AgentId, AgentStatus> = AgentId::ALL
            .iter()
            .map(|id| {
                (
                    *id,
                    AgentStatus {
                        agent_id: *id,
                        state: AgentState::Idle,
                        last_description: None,
                        last_run_at: None,
                    },
                )
            })
            .collect();
        let (tx, rx) = watch::channel(Self::snapshot_of(&rows));
        (Arc::new(Self { rows: RwLock::new(rows), tx }), rx)
    }

    /// 覆写一行并投影快照
    pub async fn set(&self, id: AgentId, state: AgentState, description: Option<String>) {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.get_mut(&id) {
            row.state = state;
            row.last_description = description;
            row.last_run_at = Some(Utc::now());
        }
        let _ = self.tx.send(Self::snapshot_of(&rows));
    }

    pub async fn get(&self, id: AgentId) -> Option<AgentStatus> {
        self.rows.read().await.get(&id).cloned()
    }

    /// 当前全部行（按目录优先级顺序）
    pub async fn snapshot(&self) -> Vec<AgentStatus> {
        Self::snapshot_of(&*self.rows.read().await)
    }

    fn snapshot_of(rows: &HashMap<AgentId, AgentStatus>) -> Vec<AgentStatus> {
        AgentId::ALL
            .iter()
            .filter_map(|id| rows.get(id).cloned())
            .collect()
    }
}
