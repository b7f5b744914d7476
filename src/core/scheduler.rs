//! 监测调度器
//!
//! 周期性决定哪些 Agent「到期」并依次运行。start 后立即执行一轮，之后按固定周期；
//! stop 只取消后续周期，正在执行的一轮允许跑完。Agent 之间固定间隔 2 秒，
//! 这是对 LLM 限流的背压，不是性能优化。周期内任何异常只记日志，不影响后续周期。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::MonitoringSection;
use crate::core::{AgentId, AgentRunner, RunOverrides};
use crate::garden::{GardenSnapshot, GardenStore, WeatherCache, WeatherSnapshot};
use crate::notify::{NoticeKind, Notifier};
use crate::permission::PermissionGate;
use crate::results::ResultStore;

/// 监测调度器
pub struct MonitoringScheduler {
    runner: Arc<AgentRunner>,
    results: Arc<ResultStore>,
    store: Arc<dyn GardenStore>,
    weather: Arc<WeatherCache>,
    gate: Arc<PermissionGate>,
    notifier: Notifier,
    pacing: Duration,
    health_check_stale_days: i64,
    harvest_window_days: i64,
    weather_delta_degrees: f64,
    active: AtomicBool,
    cancel: tokio::sync::RwLock<CancellationToken>,
}

impl MonitoringScheduler {
    pub fn new(
        runner: Arc<AgentRunner>,
        results: Arc<ResultStore>,
        store: Arc<dyn GardenStore>,
        weather: Arc<WeatherCache>,
        gate: Arc<PermissionGate>,
        notifier: Notifier,
        cfg: &MonitoringSection,
    ) -> Arc<Self> {
        Arc::new(Self {
            runner,
            results,
            store,
            weather,
            gate,
            notifier,
            pacing: Duration::from_secs(cfg.agent_pacing_secs),
            health_check_stale_days: cfg.health_check_stale_days,
            harvest_window_days: cfg.harvest_window_days,
            weather_delta_degrees: cfg.weather_delta_degrees,
            active: AtomicBool::new(false),
            cancel: tokio::sync::RwLock::new(CancellationToken::new()),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// 启动监测：已在运行时为 no-op。改周期需先 stop 再 start。
    pub async fn start(self: Arc<Self>, interval: Duration) {
        if self.active.swap(true, Ordering::SeqCst) {
            tracing::debug!("Monitoring already active, ignoring start");
            return;
        }

        let token = CancellationToken::new();
        *self.cancel.write().await = token.clone();
        tracing::info!("Monitoring started, interval {:?}", interval);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 一轮超时不补跑，顺延到下个完整周期
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => self.run_cycle().await,
                }
            }
            tracing::info!("Monitoring loop exited");
        });
    }

    /// 停止监测：取消后续周期；正在执行的一轮跑完为止
    pub async fn stop(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.read().await.cancel();
        tracing::info!("Monitoring stopped");
    }

    /// 执行一轮巡检。stop 之后计时器残留触发时直接返回。
    pub async fn run_cycle(&self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.cycle_inner().await {
            tracing::error!("Monitoring cycle failed: {}", e);
            self.notifier
                .notify(NoticeKind::Warning, format!("Monitoring cycle failed: {}", e));
        }
    }

    async fn cycle_inner(&self) -> Result<(), String> {
        let now = Utc::now();
        let doc = self.store.load_garden().await?;
        let garden = GardenSnapshot::from_document(&doc, now);

        // 先留住上一轮的缓存再刷新，气温阈值要对比的是前后两份
        let previous = self.weather.cached().await;
        let current = self.weather.refresh().await;

        let due = self.select_agents(&garden, now, &previous, &current);
        tracing::info!(
            "Monitoring cycle: {} plants, agents due: {:?}",
            garden.plants.len(),
            due.iter().map(|id| id.as_str()).collect::<Vec<_>>()
        );

        for (i, id) in due.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pacing).await;
            }
            let overrides = RunOverrides {
                garden: Some(garden.clone()),
                weather: Some(current.clone()),
            };
            match self.runner.run_with_inputs(*id, overrides).await {
                Ok(result) => {
                    self.results.set_session_latest(result.clone()).await;
                    let actions = result.proposed_actions();
                    self.results.save(result).await;
                    PermissionGate::submit_proposed(&self.gate, actions);
                }
                Err(e) => {
                    // 运行器已置 error 状态并发过通知，这里只记下继续跑其余 Agent
                    tracing::warn!("Agent {} failed during monitoring: {}", id, e);
                }
            }
        }

        // 巡检时间戳走读改写，不覆盖执行器刚并发写入的动作结果
        self.store
            .update_garden(Box::new(move |doc| {
                doc.last_check_at = Some(now);
                Ok(())
            }))
            .await
    }

    /// 本轮到期的 Agent，按固定优先级排列；每条启发彼此独立
    fn select_agents(
        &self,
        garden: &GardenSnapshot,
        now: DateTime<Utc>,
        previous: &WeatherSnapshot,
        current: &WeatherSnapshot,
    ) -> Vec<AgentId> {
        let mut due = vec![AgentId::ProactiveCare];

        let stale = chrono::Duration::days(self.health_check_stale_days);
        if garden.plants.iter().any(|p| match p.last_health_check {
            None => true,
            Some(t) => now - t > stale,
        }) {
            due.push(AgentId::HealthMonitor);
        }

        if garden.plants.iter().any(|p| {
            let remaining = p.days_to_maturity - p.planting_age_days;
            (0..=self.harvest_window_days).contains(&remaining)
        }) {
            due.push(AgentId::HarvestOptimizer);
        }

        if previous.is_empty()
            || (current.temperature - previous.temperature).abs() > self.weather_delta_degrees
        {
            due.push(AgentId::EnvironmentalIntelligence);
        }

        due
    }
}
