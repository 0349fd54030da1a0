use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// 支付订单，创建成功后不可变；重置或重新发起时整体丢弃
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub trade_no: String,
    pub order_id: String,
    #[serde(default)]
    pub payment_url: Option<String>,
    /// 二维码原始内容，由前端自行渲染
    pub qr_code: String,
    pub channel: String,
    pub pay_type: String,
    pub price: f64,
    pub package_name: String,
}

/// 轮询得到的订单支付状态，只保留最新一次的值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatus {
    pub status: OrderStatusKind,
    pub order_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusKind {
    Pending,
    Success,
    /// 后端的 failed 表示"尚未支付完成"而非硬失败，轮询继续
    Failed,
}

impl OrderStatus {
    pub fn is_paid(&self) -> bool {
        self.status == OrderStatusKind::Success
    }
}

/// 二维码有效期窗口。
///
/// 剩余秒数每次都从绝对截止时刻重新计算，而不是简单递减，
/// 这样页面/进程被挂起后恢复仍然是准的。过期是单向的：
/// 一旦过期只能整体重置后重新下单。
#[derive(Debug, Clone)]
pub struct QrExpiry {
    deadline: Instant,
}

impl QrExpiry {
    pub fn new(window: Duration) -> Self {
        Self {
            deadline: Instant::now() + window,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.deadline
            .saturating_duration_since(Instant::now())
            .as_secs()
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_countdown_recomputed_from_deadline() {
        let expiry = QrExpiry::new(Duration::from_secs(300));
        assert_eq!(expiry.remaining_seconds(), 300);
        assert!(!expiry.is_expired());

        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(expiry.remaining_seconds(), 200);

        // 模拟挂起后一次性跳过大段时间，剩余值依然正确
        tokio::time::advance(Duration::from_secs(199)).await;
        assert_eq!(expiry.remaining_seconds(), 1);
        assert!(!expiry.is_expired());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(expiry.remaining_seconds(), 0);
        assert!(expiry.is_expired());

        // 永不回升
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(expiry.remaining_seconds(), 0);
        assert!(expiry.is_expired());
    }

    #[test]
    fn test_order_status_deserialize() {
        let st: OrderStatus =
            serde_json::from_str(r#"{"status":"pending","order_id":"O1"}"#).unwrap();
        assert_eq!(st.status, OrderStatusKind::Pending);
        assert!(!st.is_paid());

        let st: OrderStatus =
            serde_json::from_str(r#"{"status":"success","order_id":"O1","message":"paid"}"#)
                .unwrap();
        assert!(st.is_paid());
    }
}
