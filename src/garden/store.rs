//! 花园存储
//!
//! GardenStore 是核心对外部花园数据的唯一出入口：读文档、读改写文档、追加/查询 Agent 结果。
//! 文档变更一律走 update_garden：持锁完成整个读改写，并发写方彼此串行，不会互相覆盖。
//! FileGardenStore 落两个 JSON 文件（garden.json / agent_results.json），结果历史封顶、
//! 最旧先淘汰；MemoryGardenStore 供测试注入故障。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::garden::snapshot::CareLogEntry;
use crate::results::AgentResult;

/// 花园持久化文档（garden.json 顶层）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GardenDocument {
    pub plants: Vec<PlantRecord>,
    /// 调度器上次巡检时间
    pub last_check_at: Option<DateTime<Utc>>,
    /// 审批通过的养护计划调整（执行器追加）
    pub schedule_adjustments: Vec<ScheduleAdjustment>,
}

/// 文档中的单株植物
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantRecord {
    pub instance_id: String,
    pub plant_id: String,
    pub name: String,
    pub planted_on: NaiveDate,
    pub days_to_maturity: i64,
    #[serde(default)]
    pub last_health_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub observations: Vec<String>,
    #[serde(default)]
    pub care_log: Vec<CareLogEntry>,
}

/// 审批通过后落地的计划调整记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleAdjustment {
    pub description: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub applied_at: DateTime<Utc>,
}

/// 文档读改写操作；返回 Err 时本次变更整体放弃，不落盘
pub type GardenUpdate = Box<dyn FnOnce(&mut GardenDocument) -> Result<(), String> + Send>;

/// 花园存储接口
#[async_trait]
pub trait GardenStore: Send + Sync {
    async fn load_garden(&self) -> Result<GardenDocument, String>;
    /// 整体替换文档，用于初始化导入；常规变更走 update_garden
    async fn save_garden(&self, doc: &GardenDocument) -> Result<(), String>;
    /// 持锁执行读改写：并发更新彼此串行，后来者在前者保存后的文档上继续改
    async fn update_garden(&self, apply: GardenUpdate) -> Result<(), String>;
    /// 追加一条 Agent 结果；历史超过上限时淘汰最旧
    async fn append_result(&self, result: &AgentResult) -> Result<(), String>;
    async fn load_results(&self) -> Result<Vec<AgentResult>, String>;
}

/// 文件存储：garden.json + agent_results.json，父目录不存在时自动创建
pub struct FileGardenStore {
    garden_path: PathBuf,
    results_path: PathBuf,
    history_cap: usize,
    /// 两个 JSON 文件共用的读改写锁
    io_lock: Mutex<()>,
}

impl FileGardenStore {
    pub fn new(data_dir: impl AsRef<Path>, history_cap: usize) -> Self {
        let dir = data_dir.as_ref();
        Self {
            garden_path: dir.join("garden.json"),
            results_path: dir.join("agent_results.json"),
            history_cap,
            io_lock: Mutex::new(()),
        }
    }

    fn read_json<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T, String> {
        if !path.exists() {
            return Ok(T::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&data).map_err(|e| e.to_string())
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let data = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
        std::fs::write(path, data).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl GardenStore for FileGardenStore {
    async fn load_garden(&self) -> Result<GardenDocument, String> {
        let _guard = self.io_lock.lock().await;
        Self::read_json(&self.garden_path)
    }

    async fn save_garden(&self, doc: &GardenDocument) -> Result<(), String> {
        let _guard = self.io_lock.lock().await;
        Self::write_json(&self.garden_path, doc)
    }

    async fn update_garden(&self, apply: GardenUpdate) -> Result<(), String> {
        let _guard = self.io_lock.lock().await;
        let mut doc: GardenDocument = Self::read_json(&self.garden_path)?;
        apply(&mut doc)?;
        Self::write_json(&self.garden_path, &doc)
    }

    async fn append_result(&self, result: &AgentResult) -> Result<(), String> {
        let _guard = self.io_lock.lock().await;
        let mut history: Vec<AgentResult> = Self::read_json(&self.results_path)?;
        history.push(result.clone());
        if history.len() > self.history_cap {
            let drop = history.len() - self.history_cap;
            history.drain(..drop);
        }
        Self::write_json(&self.results_path, &history)
    }

    async fn load_results(&self) -> Result<Vec<AgentResult>, String> {
        let _guard = self.io_lock.lock().await;
        Self::read_json(&self.results_path)
    }
}

/// 内存存储：单测与集成测试用；fail_writes/fail_reads 模拟持久层不可用
#[derive(Default)]
pub struct MemoryGardenStore {
    garden: RwLock<GardenDocument>,
    results: RwLock<Vec<AgentResult>>,
    fail_writes: RwLock<bool>,
    fail_reads: RwLock<bool>,
}

impl MemoryGardenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_garden(&self, doc: GardenDocument) {
        *self.garden.write().await = doc;
    }

    pub async fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.write().await = fail;
    }

    pub async fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.write().await = fail;
    }
}

#[async_trait]
impl GardenStore for MemoryGardenStore {
    async fn load_garden(&self) -> Result<GardenDocument, String> {
        if *self.fail_reads.read().await {
            return Err("store offline".to_string());
        }
        Ok(self.garden.read().await.clone())
    }

    async fn save_garden(&self, doc: &GardenDocument) -> Result<(), String> {
        if *self.fail_writes.read().await {
            return Err("store offline".to_string());
        }
        *self.garden.write().await = doc.clone();
        Ok(())
    }

    async fn update_garden(&self, apply: GardenUpdate) -> Result<(), String> {
        if *self.fail_writes.read().await {
            return Err("store offline".to_string());
        }
        // 改在副本上，Err 时不回写，语义对齐文件存储
        let mut doc = self.garden.write().await;
        let mut draft = doc.clone();
        apply(&mut draft)?;
        *doc = draft;
        Ok(())
    }

    async fn append_result(&self, result: &AgentResult) -> Result<(), String> {
        if *self.fail_writes.read().await {
            return Err("store offline".to_string());
        }
        self.results.write().await.push(result.clone());
        Ok(())
    }

    async fn load_results(&self) -> Result<Vec<AgentResult>, String> {
        if *self.fail_reads.read().await {
            return Err("store offline".to_string());
        }
        Ok(self.results.read().await.clone())
    }
}
