//! 通知面板
//!
//! 系统向用户推送的轻量通知（完成、告警、错误）。broadcast 扇出，fire-and-forget：
//! 无订阅者或订阅者落后时直接丢弃，同时镜像一份到 tracing 日志。

use serde::Serialize;
use tokio::sync::broadcast;

/// 通知级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

/// 单条通知
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// 通知发送器；clone 共享同一底层通道
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<Notice>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn notify(&self, kind: NoticeKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            NoticeKind::Error => tracing::error!("{}", message),
            NoticeKind::Warning => tracing::warn!("{}", message),
            _ => tracing::info!("{}", message),
        }
        let _ = self.tx.send(Notice { kind, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_fans_out() {
        let (notifier, mut rx) = Notifier::new(16);
        notifier.notify(NoticeKind::Success, "Harvest Optimizer finished");

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.kind, NoticeKind::Success);
        assert_eq!(notice.message, "Harvest Optimizer finished");
    }

    #[tokio::test]
    async fn test_notify_without_subscribers_is_silent() {
        let (notifier, rx) = Notifier::new(4);
        drop(rx);
        // 没有订阅者时发送端不报错
        notifier.notify(NoticeKind::Warning, "nobody listening");
    }
}
