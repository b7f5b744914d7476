//! 权限审批闸门
//!
//! Agent 提议的动作先进审批队列：按风险与策略自动通过，或等用户 Approve/Reject/Delay。
//! Delay 挂一个可取消的一次性定时器，到点时仅当请求仍是 delayed 才重新置为 pending 再次提醒。
//! 批准即终态：随后的执行失败只通知，不回退 approved。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;

use crate::notify::{NoticeKind, Notifier};
use crate::permission::{classify, Action, ActionExecutor, ActionKind, ActionRisk};

/// 审批请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// 等待用户决定
    Pending,
    /// 已批准（终态）
    Approved,
    /// 已拒绝（终态）
    Rejected,
    /// 用户选择稍后处理；定时器到点后重回 pending
    Delayed,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }
}

/// 队列中的一条审批请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub id: String,
    pub action: Action,
    pub risk: ActionRisk,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl ActionRequest {
    fn new(action: Action) -> Self {
        Self {
            id: format!("action_{}", uuid::Uuid::new_v4()),
            risk: classify(&action),
            action,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// 自动通过策略：三个独立开关，用户可改、落盘保存
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoApprovalPolicy {
    pub data_collection: bool,
    pub notifications: bool,
    pub low_risk_actions: bool,
}

/// 审批闸门
pub struct PermissionGate {
    requests: RwLock<HashMap<String, ActionRequest>>,
    /// 完成句柄侧表：请求被 approve/reject 时回填结果
    waiters: RwLock<HashMap<String, oneshot::Sender<bool>>>,
    /// delayed 请求的重提醒定时器；请求转出 delayed 时取消
    delay_timers: RwLock<HashMap<String, CancellationToken>>,
    policy: RwLock<AutoApprovalPolicy>,
    policy_path: Option<PathBuf>,
    executor: Arc<dyn ActionExecutor>,
    notifier: Notifier,
    reprompt_delay: Duration,
    requeue_tx: mpsc::UnboundedSender<String>,
    /// 闸门被丢弃时取消：终止回收循环并连带取消所有挂着的延迟定时器
    shutdown: CancellationToken,
}

impl PermissionGate {
    /// 创建闸门并启动重提醒回收循环（需在 tokio 运行时内调用）
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        notifier: Notifier,
        reprompt_delay: Duration,
        policy_path: Option<PathBuf>,
    ) -> Arc<Self> {
        let policy = policy_path
            .as_deref()
            .map(load_policy)
            .unwrap_or_default();

        let (requeue_tx, mut requeue_rx) = mpsc::unbounded_channel::<String>();
        let shutdown = CancellationToken::new();
        let gate = Arc::new(Self {
            requests: RwLock::new(HashMap::new()),
            waiters: RwLock::new(HashMap::new()),
            delay_timers: RwLock::new(HashMap::new()),
            policy: RwLock::new(policy),
            policy_path,
            executor,
            notifier,
            reprompt_delay,
            requeue_tx,
            shutdown: shutdown.clone(),
        });

        // 循环只持弱引用；外部句柄全部释放后随 Drop 触发的 shutdown 退出
        let loop_gate: Weak<Self> = Arc::downgrade(&gate);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    id = requeue_rx.recv() => {
                        let Some(id) = id else { break };
                        let Some(gate) = loop_gate.upgrade() else { break };
                        gate.requeue_if_delayed(&id).await;
                    }
                }
            }
        });

        gate
    }

    /// 提交动作审批：能自动通过的立刻执行，否则等待用户决定。
    /// 拒绝是正常结果（false），不是错误。
    pub async fn request_permission(&self, action: Action) -> bool {
        let request = ActionRequest::new(action);
        let id = request.id.clone();
        let description = request.action.description.clone();
        let auto = self.can_auto_approve(&request.action).await;

        let (tx, rx) = oneshot::channel();
        self.waiters.write().await.insert(id.clone(), tx);
        self.requests.write().await.insert(id.clone(), request);

        if auto {
            tracing::debug!("Auto-approving action: {}", description);
            return self.approve(&id).await;
        }

        self.notifier.notify(
            NoticeKind::Info,
            format!("Approval needed: {}", description),
        );
        rx.await.unwrap_or(false)
    }

    /// 按当前策略判断动作能否免审批：high 永远不能
    pub async fn can_auto_approve(&self, action: &Action) -> bool {
        let policy = *self.policy.read().await;
        match classify(action) {
            ActionRisk::Data => policy.data_collection,
            ActionRisk::Notification => policy.notifications,
            ActionRisk::Low => policy.low_risk_actions,
            ActionRisk::High => false,
        }
    }

    /// 批准：置 approved、取消重提醒定时器、执行动作、回填 true。
    /// 未知 id 或已终态返回 false。执行失败只通知，approved 不回退。
    pub async fn approve(&self, id: &str) -> bool {
        let action = {
            let mut requests = self.requests.write().await;
            match requests.get_mut(id) {
                Some(req) if !req.status.is_terminal() => {
                    req.status = RequestStatus::Approved;
                    req.action.clone()
                }
                _ => return false,
            }
        };
        self.cancel_delay_timer(id).await;

        match self.execute(&action).await {
            Ok(()) => {
                self.notifier.notify(
                    NoticeKind::Success,
                    format!("Action applied: {}", action.description),
                );
            }
            Err(e) => {
                tracing::warn!("Approved action failed to execute: {}", e);
                self.notifier.notify(
                    NoticeKind::Error,
                    format!("Action '{}' failed: {}", action.description, e),
                );
            }
        }

        self.resolve(id, true).await;
        true
    }

    /// 拒绝：置 rejected、取消重提醒定时器、回填 false。未知 id 或已终态返回 false。
    pub async fn reject(&self, id: &str) -> bool {
        {
            let mut requests = self.requests.write().await;
            match requests.get_mut(id) {
                Some(req) if !req.status.is_terminal() => {
                    req.status = RequestStatus::Rejected;
                }
                _ => return false,
            }
        }
        self.cancel_delay_timer(id).await;
        self.resolve(id, false).await;
        true
    }

    /// 稍后再说：置 delayed 并挂一次性重提醒定时器；等待方继续等待。
    /// 重复 delay 会替换旧定时器。未知 id 或已终态返回 false。
    pub async fn delay(&self, id: &str) -> bool {
        {
            let mut requests = self.requests.write().await;
            match requests.get_mut(id) {
                Some(req) if !req.status.is_terminal() => {
                    req.status = RequestStatus::Delayed;
                }
                _ => return false,
            }
        }

        // 子 token：单独可取消，闸门整体丢弃时也一并取消
        let token = self.shutdown.child_token();
        if let Some(old) = self
            .delay_timers
            .write()
            .await
            .insert(id.to_string(), token.clone())
        {
            old.cancel();
        }

        let tx = self.requeue_tx.clone();
        let delay = self.reprompt_delay;
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(id);
                }
            }
        });
        true
    }

    /// 更新自动通过策略并落盘
    pub async fn set_policy(&self, policy: AutoApprovalPolicy) {
        *self.policy.write().await = policy;
        if let Some(path) = &self.policy_path {
            if let Err(e) = persist_policy(path, &policy) {
                tracing::warn!("Failed to persist approval policy: {}", e);
            }
        }
    }

    pub async fn policy(&self) -> AutoApprovalPolicy {
        *self.policy.read().await
    }

    /// 等待用户决定的请求（按创建时间排序）
    pub async fn pending(&self) -> Vec<ActionRequest> {
        let mut list: Vec<ActionRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        list.sort_by_key(|r| r.created_at);
        list
    }

    pub async fn get(&self, id: &str) -> Option<ActionRequest> {
        self.requests.read().await.get(id).cloned()
    }

    /// 把结果中提议的动作逐个送入审批流程，后台等待用户决定
    pub fn submit_proposed(gate: &Arc<Self>, actions: Vec<Action>) {
        for action in actions {
            let gate = Arc::clone(gate);
            tokio::spawn(async move {
                gate.request_permission(action).await;
            });
        }
    }

    /// 按动作类型分派到执行器；other 没有对应实现
    async fn execute(&self, action: &Action) -> Result<(), String> {
        match action.kind {
            ActionKind::ScheduleAdjustment => self.executor.adjust_schedule(action).await,
            ActionKind::Notification | ActionKind::Reminder => {
                self.executor.send_notification(action).await
            }
            ActionKind::DataCollection | ActionKind::Monitoring => {
                self.executor.collect_data(action).await
            }
            ActionKind::Other => Err("no executor for action type 'other'".to_string()),
        }
    }

    /// 定时器到点：仅当请求仍是 delayed 时重回 pending 并再次提醒
    async fn requeue_if_delayed(&self, id: &str) {
        let description = {
            let mut requests = self.requests.write().await;
            match requests.get_mut(id) {
                Some(req) if req.status == RequestStatus::Delayed => {
                    req.status = RequestStatus::Pending;
                    Some(req.action.description.clone())
                }
                _ => None,
            }
        };
        self.delay_timers.write().await.remove(id);

        if let Some(description) = description {
            self.notifier.notify(
                NoticeKind::Info,
                format!("Approval still needed: {}", description),
            );
        }
    }

    async fn cancel_delay_timer(&self, id: &str) {
        if let Some(token) = self.delay_timers.write().await.remove(id) {
            token.cancel();
        }
    }

    async fn resolve(&self, id: &str, decision: bool) {
        if let Some(tx) = self.waiters.write().await.remove(id) {
            let _ = tx.send(decision);
        }
    }
}

impl Drop for PermissionGate {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// 从 JSON 文件读策略；文件缺失或损坏时用默认值
fn load_policy(path: &std::path::Path) -> AutoApprovalPolicy {
    if !path.exists() {
        return AutoApprovalPolicy::default();
    }
    std::fs::read_to_string(path)
        .ok()
        .and_then(|data| serde_json::from_str(&data).ok())
        .unwrap_or_default()
}

fn persist_policy(path: &std::path::Path, policy: &AutoApprovalPolicy) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let data = serde_json::to_string_pretty(policy).map_err(|e| e.to_string())?;
    std::fs::write(path, data).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Severity;
    use async_trait::async_trait;

    struct OkExecutor;

    #[async_trait]
    impl ActionExecutor for OkExecutor {
        async fn adjust_schedule(&self, _action: &Action) -> Result<(), String> {
            Ok(())
        }
        async fn send_notification(&self, _action: &Action) -> Result<(), String> {
            Ok(())
        }
        async fn collect_data(&self, _action: &Action) -> Result<(), String> {
            Ok(())
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl ActionExecutor for FailingExecutor {
        async fn adjust_schedule(&self, _action: &Action) -> Result<(), String> {
            Err("collaborator down".to_string())
        }
        async fn send_notification(&self, _action: &Action) -> Result<(), String> {
            Err("collaborator down".to_string())
        }
        async fn collect_data(&self, _action: &Action) -> Result<(), String> {
            Err("collaborator down".to_string())
        }
    }

    fn gate_with(executor: Arc<dyn ActionExecutor>) -> Arc<PermissionGate> {
        let (notifier, _rx) = Notifier::new(32);
        PermissionGate::new(executor, notifier, Duration::from_secs(3600), None)
    }

    fn high_risk_action() -> Action {
        Action {
            kind: ActionKind::ScheduleAdjustment,
            severity: Some(Severity::Major),
            description: "Rip out the entire north bed".to_string(),
            expected_outcome: None,
            details: serde_json::Value::Null,
        }
    }

    fn data_action() -> Action {
        Action {
            kind: ActionKind::DataCollection,
            severity: None,
            description: "Log soil temperature".to_string(),
            expected_outcome: None,
            details: serde_json::Value::Null,
        }
    }

    async fn sole_request_id(gate: &PermissionGate) -> String {
        gate.requests
            .read()
            .await
            .keys()
            .next()
            .cloned()
            .expect("a request should exist")
    }

    #[tokio::test]
    async fn test_auto_approval_follows_policy() {
        let gate = gate_with(Arc::new(OkExecutor));

        // 默认策略全关：数据采集也要人工审批
        assert!(!gate.can_auto_approve(&data_action()).await);

        gate.set_policy(AutoApprovalPolicy {
            data_collection: true,
            notifications: true,
            low_risk_actions: true,
        })
        .await;
        assert!(gate.can_auto_approve(&data_action()).await);
        // high 在任何策略下都不能自动通过
        assert!(!gate.can_auto_approve(&high_risk_action()).await);

        let approved = gate.request_permission(data_action()).await;
        assert!(approved);
        let id = sole_request_id(&gate).await;
        assert_eq!(gate.get(&id).await.unwrap().status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn test_manual_approve_resolves_waiter() {
        let gate = gate_with(Arc::new(OkExecutor));

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.request_permission(high_risk_action()).await })
        };
        tokio::task::yield_now().await;

        let id = sole_request_id(&gate).await;
        assert_eq!(gate.pending().await.len(), 1);
        assert!(gate.approve(&id).await);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_reject_is_a_normal_false_outcome() {
        let gate = gate_with(Arc::new(OkExecutor));

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.request_permission(high_risk_action()).await })
        };
        tokio::task::yield_now().await;

        let id = sole_request_id(&gate).await;
        assert!(gate.reject(&id).await);
        assert!(!waiter.await.unwrap());
        assert_eq!(gate.get(&id).await.unwrap().status, RequestStatus::Rejected);
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let gate = gate_with(Arc::new(OkExecutor));
        let _waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.request_permission(high_risk_action()).await })
        };
        tokio::task::yield_now().await;
        let id = sole_request_id(&gate).await;

        assert!(gate.approve(&id).await);
        // 终态后的任何决定都是 no-op
        assert!(!gate.approve(&id).await);
        assert!(!gate.reject(&id).await);
        assert!(!gate.delay(&id).await);
        assert_eq!(gate.get(&id).await.unwrap().status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn test_unknown_id_decisions_are_noops() {
        let gate = gate_with(Arc::new(OkExecutor));
        assert!(!gate.approve("action_missing").await);
        assert!(!gate.reject("action_missing").await);
        assert!(!gate.delay("action_missing").await);
    }

    #[tokio::test]
    async fn test_execution_failure_keeps_approved_status() {
        let gate = gate_with(Arc::new(FailingExecutor));
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.request_permission(high_risk_action()).await })
        };
        tokio::task::yield_now().await;
        let id = sole_request_id(&gate).await;

        // 执行失败不影响审批结果
        assert!(gate.approve(&id).await);
        assert!(waiter.await.unwrap());
        assert_eq!(gate.get(&id).await.unwrap().status, RequestStatus::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_request_resurfaces_after_timer() {
        let gate = gate_with(Arc::new(OkExecutor));
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.request_permission(high_risk_action()).await })
        };
        tokio::task::yield_now().await;
        let id = sole_request_id(&gate).await;

        assert!(gate.delay(&id).await);
        assert_eq!(gate.get(&id).await.unwrap().status, RequestStatus::Delayed);
        // 等待方不因 delay 得到结果
        assert!(!waiter.is_finished());

        // 一小时后回到 pending，恰好一次
        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(gate.get(&id).await.unwrap().status, RequestStatus::Pending);
        assert_eq!(gate.pending().await.len(), 1);

        assert!(gate.approve(&id).await);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_before_timer_cancels_resurfacing() {
        let gate = gate_with(Arc::new(OkExecutor));
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.request_permission(high_risk_action()).await })
        };
        tokio::task::yield_now().await;
        let id = sole_request_id(&gate).await;

        assert!(gate.delay(&id).await);
        assert!(gate.reject(&id).await);
        assert!(!waiter.await.unwrap());

        // 定时器已取消：一小时后仍是 rejected
        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(gate.get(&id).await.unwrap().status, RequestStatus::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_gate_cancels_reprompt_timer() {
        let (notifier, mut rx) = Notifier::new(8);
        let gate = PermissionGate::new(
            Arc::new(OkExecutor),
            notifier,
            Duration::from_secs(3600),
            None,
        );

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.request_permission(high_risk_action()).await })
        };
        tokio::task::yield_now().await;
        let id = sole_request_id(&gate).await;
        assert!(gate.delay(&id).await);

        // 放掉全部句柄；等待任务随 abort 释放它那份引用
        waiter.abort();
        let _ = waiter.await;
        drop(gate);

        // 定时器随闸门一起取消：超过延迟窗口也不再有重提醒
        tokio::time::sleep(Duration::from_secs(7200)).await;
        let mut reprompted = false;
        while let Ok(notice) = rx.try_recv() {
            if notice.message.contains("still needed") {
                reprompted = true;
            }
        }
        assert!(!reprompted);
    }

    #[tokio::test]
    async fn test_policy_persists_across_gates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("approval_policy.json");
        let (notifier, _rx) = Notifier::new(4);

        let gate = PermissionGate::new(
            Arc::new(OkExecutor),
            notifier.clone(),
            Duration::from_secs(3600),
            Some(path.clone()),
        );
        gate.set_policy(AutoApprovalPolicy {
            data_collection: true,
            notifications: false,
            low_risk_actions: true,
        })
        .await;

        let reloaded = PermissionGate::new(
            Arc::new(OkExecutor),
            notifier,
            Duration::from_secs(3600),
            Some(path),
        );
        let policy = reloaded.policy().await;
        assert!(policy.data_collection);
        assert!(!policy.notifications);
        assert!(policy.low_risk_actions);
    }
}
