//! 编排集成测试：监测周期、审批工作流与结果兜底贯通

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use sprout::config::{GardenSection, MonitoringSection};
    use sprout::core::{AgentId, AgentRunner, AgentState, MonitoringScheduler, StatusBoard};
    use sprout::garden::{
        GardenDocument, GardenStore, MemoryGardenStore, PlantRecord, WeatherCache,
        WeatherProvider, WeatherSnapshot,
    };
    use sprout::llm::{LlmClient, MockLlmClient};
    use sprout::notify::{NoticeKind, Notifier};
    use sprout::permission::{
        Action, ActionKind, AutoApprovalPolicy, GardenActionExecutor, PermissionGate,
        RequestStatus, Severity,
    };
    use sprout::results::ResultStore;

    struct SteadyWeather;

    #[async_trait]
    impl WeatherProvider for SteadyWeather {
        async fn fetch_forecast(&self) -> Result<WeatherSnapshot, String> {
            let mut snapshot = WeatherSnapshot::empty();
            snapshot.temperature = 19.0;
            snapshot.fetched_at = Some(Utc::now());
            Ok(snapshot)
        }
    }

    fn unchecked_plant() -> PlantRecord {
        // 从未做过健康检查：每轮巡检都会选中 healthMonitor
        PlantRecord {
            instance_id: "inst_1".to_string(),
            plant_id: "chard".to_string(),
            name: "Rainbow Chard".to_string(),
            planted_on: (Utc::now() - chrono::Duration::days(10)).date_naive(),
            days_to_maturity: 120,
            last_health_check: None,
            notes: None,
            observations: vec![],
            care_log: vec![],
        }
    }

    /// healthMonitor 的结果里带一条待审批的数据采集动作
    fn proposing_reply() -> String {
        serde_json::json!({
            "recommendations": { "summary": "keep watering as scheduled" },
            "healthAssessment": {
                "overall": "fair",
                "proposedActions": [{
                    "type": "data_collection",
                    "description": "Inspect chard leaves for miner damage",
                    "details": { "instanceId": "inst_1" }
                }]
            },
            "harvestSchedule": { "upcoming": [] },
            "plan": { "nextSteps": [] },
            "analysis": { "risk": "none" }
        })
        .to_string()
    }

    struct Stack {
        store: Arc<MemoryGardenStore>,
        gate: Arc<PermissionGate>,
        runner: Arc<AgentRunner>,
        results: Arc<ResultStore>,
        scheduler: Arc<MonitoringScheduler>,
        status: Arc<StatusBoard>,
        notifier: Notifier,
    }

    async fn build_stack(llm: Arc<dyn LlmClient>) -> Stack {
        let store = Arc::new(MemoryGardenStore::new());
        store
            .seed_garden(GardenDocument {
                plants: vec![unchecked_plant()],
                ..Default::default()
            })
            .await;

        let garden_store: Arc<dyn GardenStore> = store.clone();
        let (status, _status_rx) = StatusBoard::new();
        let (notifier, _notice_rx) = Notifier::new(64);
        let weather = Arc::new(WeatherCache::new(Arc::new(SteadyWeather)));
        let gate = PermissionGate::new(
            Arc::new(GardenActionExecutor::new(
                garden_store.clone(),
                notifier.clone(),
            )),
            notifier.clone(),
            Duration::from_secs(3600),
            None,
        );
        let runner = Arc::new(AgentRunner::new(
            garden_store.clone(),
            weather.clone(),
            llm,
            status.clone(),
            notifier.clone(),
            GardenSection::default(),
        ));
        let results = Arc::new(ResultStore::new(garden_store.clone()));
        let scheduler = MonitoringScheduler::new(
            runner.clone(),
            results.clone(),
            garden_store,
            weather,
            gate.clone(),
            notifier.clone(),
            &MonitoringSection::default(),
        );

        Stack {
            store,
            gate,
            runner,
            results,
            scheduler,
            status,
            notifier,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitoring_cycle_applies_auto_approved_action() {
        let stack = build_stack(Arc::new(MockLlmClient::with_reply(proposing_reply()))).await;
        stack
            .gate
            .set_policy(AutoApprovalPolicy {
                data_collection: true,
                notifications: false,
                low_risk_actions: false,
            })
            .await;

        stack.scheduler.clone().start(Duration::from_secs(600)).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        stack.scheduler.stop().await;

        // 本轮应跑 proactiveCare + healthMonitor + environmentalIntelligence
        let history = stack.results.get_all().await;
        assert_eq!(history.len(), 3);
        let ids: Vec<AgentId> = history.iter().map(|r| r.agent_id).collect();
        assert!(ids.contains(&AgentId::HealthMonitor));
        assert!(!ids.contains(&AgentId::GardenPlanner));

        // healthMonitor 的采集动作被自动批准并落到植物观察记录
        let doc = stack.store.load_garden().await.unwrap();
        assert_eq!(doc.plants[0].observations.len(), 1);
        assert!(doc.plants[0].observations[0].contains("miner damage"));
        assert!(doc.last_check_at.is_some());
        assert!(stack.gate.pending().await.is_empty());

        // 会话缓存里能取到本轮最新结果
        let latest = stack
            .results
            .session_latest(AgentId::HealthMonitor)
            .await
            .unwrap();
        assert_eq!(latest.result_data["overall"], "fair");

        let row = stack.status.get(AgentId::HealthMonitor).await.unwrap();
        assert_eq!(row.state, AgentState::Complete);
    }

    #[tokio::test]
    async fn test_manual_approval_round_trip() {
        let stack = build_stack(Arc::new(MockLlmClient::new())).await;

        let action = Action {
            kind: ActionKind::ScheduleAdjustment,
            severity: Some(Severity::Major),
            description: "Switch the whole garden to drip irrigation".to_string(),
            expected_outcome: None,
            details: serde_json::json!({}),
        };
        let waiter = {
            let gate = stack.gate.clone();
            tokio::spawn(async move { gate.request_permission(action).await })
        };
        tokio::task::yield_now().await;

        let pending = stack.gate.pending().await;
        assert_eq!(pending.len(), 1);
        let id = pending[0].id.clone();

        assert!(stack.gate.approve(&id).await);
        assert!(waiter.await.unwrap());
        assert_eq!(
            stack.gate.get(&id).await.unwrap().status,
            RequestStatus::Approved
        );

        // 批准后的计划调整写回了花园文档
        let doc = stack.store.load_garden().await.unwrap();
        assert_eq!(doc.schedule_adjustments.len(), 1);
        assert!(doc.schedule_adjustments[0]
            .description
            .contains("drip irrigation"));

        // 第二条走拒绝：不执行任何变更
        let action = Action {
            kind: ActionKind::ScheduleAdjustment,
            severity: None,
            description: "Remove the chard bed entirely".to_string(),
            expected_outcome: None,
            details: serde_json::json!({}),
        };
        let waiter = {
            let gate = stack.gate.clone();
            tokio::spawn(async move { gate.request_permission(action).await })
        };
        tokio::task::yield_now().await;
        let pending = stack.gate.pending().await;
        assert_eq!(pending.len(), 1);
        assert!(stack.gate.reject(&pending[0].id).await);
        assert!(!waiter.await.unwrap());

        let doc = stack.store.load_garden().await.unwrap();
        assert_eq!(doc.schedule_adjustments.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_request_comes_back_for_decision() {
        let stack = build_stack(Arc::new(MockLlmClient::new())).await;
        let mut notices = stack.notifier.subscribe();

        let action = Action {
            kind: ActionKind::Monitoring,
            severity: None,
            description: "Enable hourly soil moisture readings".to_string(),
            expected_outcome: None,
            details: serde_json::json!({}),
        };
        let waiter = {
            let gate = stack.gate.clone();
            tokio::spawn(async move { gate.request_permission(action).await })
        };
        tokio::task::yield_now().await;
        let id = stack.gate.pending().await[0].id.clone();

        assert!(stack.gate.delay(&id).await);
        assert!(stack.gate.pending().await.is_empty());

        // 一小时后同一条请求回到待审批队列并再次提醒
        tokio::time::sleep(Duration::from_secs(3700)).await;
        let pending = stack.gate.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);

        let mut resurfaced = false;
        while let Ok(notice) = notices.try_recv() {
            if notice.kind == NoticeKind::Info && notice.message.contains("still needed") {
                resurfaced = true;
            }
        }
        assert!(resurfaced);

        assert!(stack.gate.approve(&id).await);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_results_survive_durable_store_outage() {
        let stack = build_stack(Arc::new(MockLlmClient::new())).await;
        stack.store.set_fail_writes(true).await;

        let result = stack.runner.run(AgentId::HealthMonitor).await.unwrap();
        let when = result.timestamp;
        stack.results.save(result).await;

        // 持久层读也挂掉后，历史查询仍由兜底缓存服务
        stack.store.set_fail_reads(true).await;
        let all = stack.results.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].agent_id, AgentId::HealthMonitor);

        let today = stack.results.get_by_date(when.date_naive()).await;
        assert_eq!(today.len(), 1);
    }
}
