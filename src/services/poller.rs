use crate::error::AppError;
use crate::external::StarShareBackend;
use crate::models::QrExpiry;
use std::time::Duration;
use tokio::sync::watch;

/// 一轮支付轮询的收场方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// 后端确认已支付
    Paid,
    /// 二维码窗口耗尽
    Expired,
    /// 登录态失效，继续轮询没有意义
    AuthFailed(String),
    /// 收到取消信号
    Cancelled,
}

/// 固定间隔轮询订单支付状态。
///
/// pending 与 failed 一视同仁地继续轮询（微信扫码后取消会报 failed，
/// 换个方式重扫仍可能成功），网络错误同理。唯一立即终止的错误是
/// 鉴权失败，重试只会刷出同样的 401。
pub struct PaymentPoller {
    interval: Duration,
}

impl PaymentPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// 轮询直到支付成功、二维码过期、鉴权失效或被取消。
    /// 过期判定在每轮回调开头，基于绝对截止时刻，不受轮询耗时漂移影响。
    pub async fn run<B: StarShareBackend>(
        &self,
        backend: &B,
        order_id: &str,
        expiry: &QrExpiry,
        cancel: &mut watch::Receiver<bool>,
    ) -> PollOutcome {
        loop {
            if expiry.is_expired() {
                log::info!("QR code for order {order_id} expired, stopping polling");
                return PollOutcome::Expired;
            }
            if *cancel.borrow() {
                return PollOutcome::Cancelled;
            }

            match backend.poll_order(order_id).await {
                Ok(status) if status.is_paid() => {
                    log::info!("Order {order_id} paid");
                    return PollOutcome::Paid;
                }
                Ok(status) => {
                    log::debug!("Order {order_id} not paid yet: {:?}", status.status);
                }
                Err(AppError::AuthError(reason)) => {
                    log::warn!("Auth failure while polling order {order_id}: {reason}");
                    return PollOutcome::AuthFailed(reason);
                }
                Err(e) => {
                    log::warn!("Order status check failed, will retry: {e}");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = tokio::time::sleep_until(expiry.deadline()) => {
                    log::info!("QR code for order {order_id} expired, stopping polling");
                    return PollOutcome::Expired;
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return PollOutcome::Cancelled;
                    }
                }
            }
        }
    }
}
