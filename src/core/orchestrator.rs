//! 花园编排器：主控循环
//!
//! 负责：加载配置、创建存储/天气/LLM/审批闸门/运行器/调度器，建立 cmd/status/notice 三通道，
//! 并在后台任务中消费用户命令（RunAgent/StartMonitoring/Approve/…），驱动 Agent 运行与审批流。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};

use crate::config::{load_config, AppConfig};
use crate::core::{AgentError, AgentRunner, AgentStatus, MonitoringScheduler, StatusBoard};
use crate::garden::{FileGardenStore, HttpWeatherProvider, WeatherCache};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::notify::{Notice, NoticeKind, Notifier};
use crate::permission::{AutoApprovalPolicy, GardenActionExecutor, PermissionGate};
use crate::results::ResultStore;

/// 从 UI 发往编排器的用户命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 手动运行一个 Agent（wire 名，如 "proactiveCare"）
    RunAgent(String),
    /// 启动周期监测
    StartMonitoring,
    /// 停止周期监测
    StopMonitoring,
    /// 批准一条待审批动作
    Approve(String),
    /// 拒绝一条待审批动作
    Reject(String),
    /// 稍后处理一条待审批动作
    Delay(String),
    /// 更新自动通过策略
    SetAutoApproval(AutoApprovalPolicy),
    /// 退出应用
    Quit,
}

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub(crate) fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM (configured)");
        return Arc::new(MockLlmClient::new());
    }

    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .or_else(|| Some(cfg.llm.model.clone()))
            .unwrap_or_else(|| "deepseek-chat".to_string());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(&model)))
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let base = cfg.llm.base_url.as_deref();
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            base,
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

/// 创建花园运行时：返回命令发送端、状态接收端、通知接收端；后台任务消费命令。
pub async fn create_orchestrator(
    config_path: Option<PathBuf>,
) -> anyhow::Result<(
    mpsc::UnboundedSender<Command>,
    watch::Receiver<Vec<AgentStatus>>,
    broadcast::Receiver<Notice>,
)> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let data_dir = cfg.garden.data_dir.clone();
    std::fs::create_dir_all(&data_dir).ok();

    let store = Arc::new(FileGardenStore::new(&data_dir, cfg.results.history_cap));
    let weather = Arc::new(WeatherCache::new(Arc::new(HttpWeatherProvider::new(
        cfg.weather.latitude,
        cfg.weather.longitude,
        cfg.weather.timeout_secs,
    ))));
    let llm = create_llm_from_config(&cfg);

    // 三通道：UI -> Core 命令；Core -> UI 状态快照；Core -> UI 通知流
    let (status, status_rx) = StatusBoard::new();
    let (notifier, notice_rx) = Notifier::new(64);
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();

    let gate = PermissionGate::new(
        Arc::new(GardenActionExecutor::new(store.clone(), notifier.clone())),
        notifier.clone(),
        Duration::from_secs(cfg.permission.reprompt_delay_secs),
        Some(data_dir.join("approval_policy.json")),
    );
    let runner = Arc::new(AgentRunner::new(
        store.clone(),
        weather.clone(),
        llm,
        status,
        notifier.clone(),
        cfg.garden.clone(),
    ));
    let results = Arc::new(ResultStore::new(store.clone()));
    let scheduler = MonitoringScheduler::new(
        runner.clone(),
        results.clone(),
        store,
        weather,
        gate.clone(),
        notifier.clone(),
        &cfg.monitoring,
    );
    let monitor_interval = Duration::from_secs(cfg.monitoring.interval_secs);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => {
                    match cmd {
                        Command::RunAgent(name) => {
                            // 独立任务：长 LLM 调用不阻塞审批等后续命令
                            let runner = runner.clone();
                            let results = results.clone();
                            let gate = gate.clone();
                            let notifier = notifier.clone();
                            tokio::spawn(async move {
                                match runner.run_named(&name).await {
                                    Ok(result) => {
                                        results.set_session_latest(result.clone()).await;
                                        let actions = result.proposed_actions();
                                        results.save(result).await;
                                        PermissionGate::submit_proposed(&gate, actions);
                                    }
                                    Err(AgentError::UnknownAgent(name)) => {
                                        notifier.notify(
                                            NoticeKind::Error,
                                            format!("Unknown agent: {}", name),
                                        );
                                    }
                                    // 其余失败运行器已置状态并通知
                                    Err(e) => {
                                        tracing::debug!("Manual run failed: {}", e);
                                    }
                                }
                            });
                        }
                        Command::StartMonitoring => {
                            scheduler.clone().start(monitor_interval).await;
                        }
                        Command::StopMonitoring => {
                            scheduler.stop().await;
                        }
                        Command::Approve(id) => {
                            if !gate.approve(&id).await {
                                tracing::debug!("Approve ignored, no open request {}", id);
                            }
                        }
                        Command::Reject(id) => {
                            if !gate.reject(&id).await {
                                tracing::debug!("Reject ignored, no open request {}", id);
                            }
                        }
                        Command::Delay(id) => {
                            if !gate.delay(&id).await {
                                tracing::debug!("Delay ignored, no open request {}", id);
                            }
                        }
                        Command::SetAutoApproval(policy) => {
                            gate.set_policy(policy).await;
                        }
                        Command::Quit => {
                            scheduler.stop().await;
                            break;
                        }
                    }
                }
                else => break,  // cmd_tx 已关闭，退出循环
            }
        }
    });

    Ok((cmd_tx, status_rx, notice_rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentState;

    fn write_test_config(dir: &std::path::Path) -> PathBuf {
        let data_dir = dir.join("data");
        let path = dir.join("sprout.toml");
        std::fs::write(
            &path,
            format!(
                r#"
[llm]
provider = "mock"

[garden]
data_dir = "{}"
"#,
                data_dir.display()
            ),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_manual_run_reaches_complete_status() {
        let dir = tempfile::tempdir().unwrap();
        let (cmd_tx, mut status_rx, _notice_rx) =
            create_orchestrator(Some(write_test_config(dir.path())))
                .await
                .unwrap();

        // healthMonitor 只依赖花园快照，不会触发天气请求
        cmd_tx
            .send(Command::RunAgent("healthMonitor".to_string()))
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            tokio::time::timeout_at(deadline, status_rx.changed())
                .await
                .expect("status update before deadline")
                .unwrap();
            let done = status_rx
                .borrow_and_update()
                .iter()
                .any(|s| s.state == AgentState::Complete);
            if done {
                break;
            }
        }

        cmd_tx.send(Command::Quit).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_agent_surfaces_a_notice() {
        let dir = tempfile::tempdir().unwrap();
        let (cmd_tx, _status_rx, mut notice_rx) =
            create_orchestrator(Some(write_test_config(dir.path())))
                .await
                .unwrap();

        cmd_tx
            .send(Command::RunAgent("weedWhacker".to_string()))
            .unwrap();

        let notice = tokio::time::timeout(Duration::from_secs(5), notice_rx.recv())
            .await
            .expect("notice before deadline")
            .unwrap();
        assert_eq!(notice.kind, NoticeKind::Error);
        assert!(notice.message.contains("weedWhacker"));

        cmd_tx.send(Command::Quit).unwrap();
    }

    #[tokio::test]
    async fn test_quit_closes_the_command_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (cmd_tx, _status_rx, _notice_rx) =
            create_orchestrator(Some(write_test_config(dir.path())))
                .await
                .unwrap();

        cmd_tx.send(Command::Quit).unwrap();
        // 命令循环退出后发送端失效
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cmd_tx.send(Command::StopMonitoring).is_err());
    }
}
