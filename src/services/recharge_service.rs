use crate::external::StarShareBackend;
use crate::models::{ApiEnvelope, CODE_OK, CdkCode, RechargeOutcome, SessionCredential};
use serde_json::Value;

/// 充值调用的成功判据：`code == 20000` 且 `msg == "ok"`。
///
/// 其余一律判为失败，并把完整响应体塞进结果里展示给用户
/// （后端没有结构化错误码，只能截图找客服）。
fn outcome_from_envelope(envelope: ApiEnvelope<Value>) -> RechargeOutcome {
    if envelope.code == CODE_OK && envelope.msg == "ok" {
        let raw = serde_json::to_value(&envelope).ok();
        RechargeOutcome::success("充值成功", raw)
    } else {
        let message = format!("充值失败: {} (code={})", envelope.msg, envelope.code);
        let raw = serde_json::to_value(&envelope).ok();
        RechargeOutcome::error(message, raw)
    }
}

/// 订单路径：支付确认之后调用一次充值接口
pub async fn run_order_path<B: StarShareBackend>(
    backend: &B,
    order_id: &str,
    session: &SessionCredential,
) -> RechargeOutcome {
    log::info!("Invoking recharge for order {order_id}");
    match backend.recharge(order_id, session).await {
        Ok(envelope) => outcome_from_envelope(envelope),
        Err(e) => {
            log::error!("Recharge request failed for order {order_id}: {e}");
            RechargeOutcome::error(format!("充值请求失败: {e}"), None)
        }
    }
}

/// CDK 路径：跳过订单和支付，直接兑换
pub async fn run_cdk_path<B: StarShareBackend>(
    backend: &B,
    session: &SessionCredential,
    cdk: &CdkCode,
) -> RechargeOutcome {
    log::info!("Invoking CDK redemption");
    match backend.recharge_cdk(session, cdk).await {
        Ok(envelope) => outcome_from_envelope(envelope),
        Err(e) => {
            log::error!("CDK redemption request failed: {e}");
            RechargeOutcome::error(format!("兑换请求失败: {e}"), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::external::testing::MockBackend;
    use crate::models::OutcomeStatus;
    use std::sync::atomic::Ordering;

    fn session() -> SessionCredential {
        SessionCredential::parse(
            r#"{"user":{"id":"u1","email":"e@x.y"},"account":{"id":"a1"},"accessToken":"t"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_outcome_requires_code_and_msg() {
        let ok = outcome_from_envelope(ApiEnvelope {
            code: CODE_OK,
            msg: "ok".to_string(),
            data: None,
        });
        assert!(ok.is_success());

        // code 对但 msg 不对也算失败
        let bad_msg = outcome_from_envelope(ApiEnvelope {
            code: CODE_OK,
            msg: "queued".to_string(),
            data: None,
        });
        assert_eq!(bad_msg.status, OutcomeStatus::Error);

        let bad_code = outcome_from_envelope(ApiEnvelope {
            code: 50000,
            msg: "internal error".to_string(),
            data: None,
        });
        assert_eq!(bad_code.status, OutcomeStatus::Error);
        let raw = bad_code.raw_response.unwrap().to_string();
        assert!(raw.contains("internal error"));
    }

    #[tokio::test]
    async fn test_order_path_transport_error_is_terminal() {
        // 脚本化的假后端只能吐成功信封，这里用一个始终失败的实现
        struct FailingBackend;
        impl StarShareBackend for FailingBackend {
            async fn create_order(&self) -> crate::error::AppResult<crate::models::Order> {
                unreachable!()
            }
            async fn poll_order(
                &self,
                _: &str,
            ) -> crate::error::AppResult<crate::models::OrderStatus> {
                unreachable!()
            }
            async fn recharge(
                &self,
                _: &str,
                _: &SessionCredential,
            ) -> crate::error::AppResult<ApiEnvelope<serde_json::Value>> {
                Err(AppError::ExternalApiError("connection refused".into()))
            }
            async fn recharge_cdk(
                &self,
                _: &SessionCredential,
                _: &CdkCode,
            ) -> crate::error::AppResult<ApiEnvelope<serde_json::Value>> {
                unreachable!()
            }
        }

        let outcome = run_order_path(&FailingBackend, "O1", &session()).await;
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_cdk_path_never_touches_order_endpoints() {
        let backend = MockBackend::default();
        let cdk = CdkCode::parse("GOPLUS-ABC123").unwrap();

        let outcome = run_cdk_path(&backend, &session(), &cdk).await;
        assert!(outcome.is_success());
        assert_eq!(backend.cdk_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.poll_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.recharge_calls.load(Ordering::SeqCst), 0);
    }
}
