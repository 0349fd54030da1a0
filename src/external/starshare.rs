use crate::config::ApiConfig;
use crate::error::{AppError, AppResult};
use crate::events::{AppEvent, EventBus};
use crate::models::{ApiEnvelope, CODE_AUTH_FAILURE, CdkCode, Order, OrderStatus, SessionCredential};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// 充值流程用到的四个后端调用。
///
/// 状态机只依赖这个 trait，测试时换成脚本化的假后端。
pub trait StarShareBackend {
    fn create_order(&self) -> impl Future<Output = AppResult<Order>> + Send;
    fn poll_order(&self, order_id: &str) -> impl Future<Output = AppResult<OrderStatus>> + Send;
    fn recharge(
        &self,
        order_id: &str,
        user_data: &SessionCredential,
    ) -> impl Future<Output = AppResult<ApiEnvelope<Value>>> + Send;
    fn recharge_cdk(
        &self,
        user_data: &SessionCredential,
        cdk: &CdkCode,
    ) -> impl Future<Output = AppResult<ApiEnvelope<Value>>> + Send;
}

/// `/u/go_plus_order` 创建订单的返回体
#[derive(Debug, Serialize, Deserialize)]
struct CreateOrderData {
    success: bool,
    order_id: String,
    qr_code: String,
    pay_type: String,
    price: f64,
    package_name: String,
    trade_no: String,
    #[serde(default)]
    payment_url: Option<String>,
    channel: String,
}

#[derive(Clone)]
pub struct StarShareApi {
    http: Client,
    base_url: String,
    auth_token: Option<String>,
    bus: EventBus,
}

impl StarShareApi {
    pub fn new(cfg: &ApiConfig, bus: EventBus) -> Self {
        let http = Client::builder()
            .user_agent("goplus-client")
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            bus,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// HTTP 层的登录态检查：401 上报事件总线并短路
    fn ensure_authorized(&self, status: StatusCode) -> AppResult<()> {
        if status == StatusCode::UNAUTHORIZED {
            let reason = "HTTP 401".to_string();
            self.bus.publish(AppEvent::AuthFailure {
                reason: reason.clone(),
            });
            return Err(AppError::AuthError(reason));
        }
        Ok(())
    }

    /// 业务层的登录态检查：`code == 40100` 与 401 同等对待
    fn accept_envelope<T>(&self, envelope: ApiEnvelope<T>) -> AppResult<ApiEnvelope<T>> {
        if envelope.code == CODE_AUTH_FAILURE {
            self.bus.publish(AppEvent::AuthFailure {
                reason: envelope.msg.clone(),
            });
            return Err(AppError::AuthError(envelope.msg));
        }
        Ok(envelope)
    }

    /// 发请求并解出统一信封；401 / 40100 统一走事件总线上报
    async fn send_envelope<T: serde::de::DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> AppResult<ApiEnvelope<T>> {
        let resp = self.authed(req).send().await?;
        self.ensure_authorized(resp.status())?;
        let envelope: ApiEnvelope<T> = resp.json().await?;
        self.accept_envelope(envelope)
    }
}

impl StarShareBackend for StarShareApi {
    async fn create_order(&self) -> AppResult<Order> {
        let url = format!("{}/u/go_plus_order", self.base_url);
        let envelope: ApiEnvelope<CreateOrderData> = self
            .send_envelope(self.http.post(&url).json(&serde_json::json!({})))
            .await?;

        if !envelope.is_success() {
            return Err(AppError::ExternalApiError(format!(
                "创建订单失败: {}",
                envelope.msg
            )));
        }

        let data = envelope
            .data
            .ok_or_else(|| AppError::ExternalApiError("创建订单响应数据为空".to_string()))?;

        if !data.success {
            return Err(AppError::ExternalApiError(
                "创建订单失败: 后端返回 success=false".to_string(),
            ));
        }

        log::info!(
            "Order created: order_id={}, trade_no={}, pay_type={}, price={}",
            data.order_id,
            data.trade_no,
            data.pay_type,
            data.price
        );

        Ok(Order {
            trade_no: data.trade_no,
            order_id: data.order_id,
            payment_url: data.payment_url,
            qr_code: data.qr_code,
            channel: data.channel,
            pay_type: data.pay_type,
            price: data.price,
            package_name: data.package_name,
        })
    }

    async fn poll_order(&self, order_id: &str) -> AppResult<OrderStatus> {
        let url = format!("{}/u/go_plus_order", self.base_url);
        let envelope: ApiEnvelope<OrderStatus> = self
            .send_envelope(self.http.get(&url).query(&[("order_id", order_id)]))
            .await?;

        if !envelope.is_success() {
            return Err(AppError::ExternalApiError(format!(
                "查询订单状态失败: {}",
                envelope.msg
            )));
        }

        envelope
            .data
            .ok_or_else(|| AppError::ExternalApiError("订单状态数据为空".to_string()))
    }

    async fn recharge(
        &self,
        order_id: &str,
        user_data: &SessionCredential,
    ) -> AppResult<ApiEnvelope<Value>> {
        let url = format!("{}/u/go_plus", self.base_url);
        let body = serde_json::json!({
            "order_id": order_id,
            "user_data": user_data.as_value(),
        });
        self.send_envelope(self.http.post(&url).json(&body)).await
    }

    async fn recharge_cdk(
        &self,
        user_data: &SessionCredential,
        cdk: &CdkCode,
    ) -> AppResult<ApiEnvelope<Value>> {
        let url = format!("{}/u/go_plus_cdk", self.base_url);
        let body = serde_json::json!({
            "user_data": user_data.as_value(),
            "cdk": cdk.as_str(),
        });
        self.send_envelope(self.http.post(&url).json(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_with_bus() -> (StarShareApi, tokio::sync::broadcast::Receiver<AppEvent>) {
        let bus = EventBus::new(4);
        let rx = bus.subscribe();
        let cfg = ApiConfig {
            base_url: "https://api.example.com".to_string(),
            timeout_secs: 15,
        };
        (StarShareApi::new(&cfg, bus), rx)
    }

    #[test]
    fn test_http_401_publishes_auth_failure() {
        let (api, mut rx) = api_with_bus();

        let err = api.ensure_authorized(StatusCode::UNAUTHORIZED).unwrap_err();
        assert!(matches!(err, AppError::AuthError(ref r) if r == "HTTP 401"));

        let AppEvent::AuthFailure { reason } = rx.try_recv().unwrap();
        assert_eq!(reason, "HTTP 401");
    }

    #[test]
    fn test_auth_failure_code_publishes_auth_failure() {
        let (api, mut rx) = api_with_bus();
        let envelope: ApiEnvelope<Value> = ApiEnvelope {
            code: CODE_AUTH_FAILURE,
            msg: "登录已过期".to_string(),
            data: None,
        };

        let err = api.accept_envelope(envelope).unwrap_err();
        assert!(matches!(err, AppError::AuthError(ref r) if r == "登录已过期"));

        let AppEvent::AuthFailure { reason } = rx.try_recv().unwrap();
        assert_eq!(reason, "登录已过期");
    }

    #[test]
    fn test_ordinary_responses_stay_quiet() {
        let (api, mut rx) = api_with_bus();

        api.ensure_authorized(StatusCode::OK).unwrap();
        let envelope: ApiEnvelope<Value> = ApiEnvelope {
            code: 50000,
            msg: "internal error".to_string(),
            data: None,
        };
        // 普通业务失败由调用方处理，不触发登录态事件
        let passed = api.accept_envelope(envelope).unwrap();
        assert!(!passed.is_success());
        assert!(rx.try_recv().is_err());
    }
}

/// 测试用假后端：轮询结果按脚本依次吐出，耗尽后一直 pending
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::models::{CODE_OK, OrderStatusKind};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct MockBackend {
        pub create_calls: AtomicUsize,
        pub poll_calls: AtomicUsize,
        pub recharge_calls: AtomicUsize,
        pub cdk_calls: AtomicUsize,
        pub poll_script: Mutex<VecDeque<AppResult<OrderStatus>>>,
        pub recharge_response: Mutex<Option<ApiEnvelope<Value>>>,
        pub cdk_response: Mutex<Option<ApiEnvelope<Value>>>,
    }

    impl MockBackend {
        pub fn ok_envelope() -> ApiEnvelope<Value> {
            ApiEnvelope {
                code: CODE_OK,
                msg: "ok".to_string(),
                data: None,
            }
        }

        pub fn status(kind: OrderStatusKind) -> OrderStatus {
            OrderStatus {
                status: kind,
                order_id: "O1".to_string(),
                message: None,
            }
        }

        pub fn push_poll(&self, result: AppResult<OrderStatus>) {
            self.poll_script.lock().unwrap().push_back(result);
        }

        pub fn set_recharge_response(&self, envelope: ApiEnvelope<Value>) {
            *self.recharge_response.lock().unwrap() = Some(envelope);
        }

        pub fn set_cdk_response(&self, envelope: ApiEnvelope<Value>) {
            *self.cdk_response.lock().unwrap() = Some(envelope);
        }
    }

    impl StarShareBackend for MockBackend {
        async fn create_order(&self) -> AppResult<Order> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Order {
                trade_no: "T1".to_string(),
                order_id: "O1".to_string(),
                payment_url: Some("https://pay.example.com/O1".to_string()),
                qr_code: "Q1".to_string(),
                channel: "native".to_string(),
                pay_type: "wxpay".to_string(),
                price: 99.0,
                package_name: "ChatGPT Plus 1个月".to_string(),
            })
        }

        async fn poll_order(&self, _order_id: &str) -> AppResult<OrderStatus> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            self.poll_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Self::status(OrderStatusKind::Pending)))
        }

        async fn recharge(
            &self,
            _order_id: &str,
            _user_data: &SessionCredential,
        ) -> AppResult<ApiEnvelope<Value>> {
            self.recharge_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .recharge_response
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(Self::ok_envelope))
        }

        async fn recharge_cdk(
            &self,
            _user_data: &SessionCredential,
            _cdk: &CdkCode,
        ) -> AppResult<ApiEnvelope<Value>> {
            self.cdk_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .cdk_response
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(Self::ok_envelope))
        }
    }
}
