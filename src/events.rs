use tokio::sync::broadcast;

/// 应用级事件。
///
/// Web 版里登录态失效靠 DOM 自定义事件广播，这里改成显式的
/// 事件总线，依赖清楚也好测。
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// 后端返回 401 或业务码 40100
    AuthFailure { reason: String },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// 没有订阅者时事件直接丢弃
    pub fn publish(&self, event: AppEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Event dropped: no active subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(AppEvent::AuthFailure {
            reason: "token expired".to_string(),
        });
        let AppEvent::AuthFailure { reason } = rx.recv().await.unwrap();
        assert_eq!(reason, "token expired");
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::default();
        bus.publish(AppEvent::AuthFailure {
            reason: "nobody listens".to_string(),
        });
    }
}
