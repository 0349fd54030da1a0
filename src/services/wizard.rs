use crate::config::WizardConfig;
use crate::error::{AppError, AppResult};
use crate::external::StarShareBackend;
use crate::models::{
    CdkCode, Order, QrExpiry, RechargeOutcome, SessionCredential, ValidationState,
};
use crate::services::poller::{PaymentPoller, PollOutcome};
use crate::services::recharge_service;
use crate::services::validator::validate_session_json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// 一次充值尝试的状态。
///
/// ```text
/// JsonInput --(校验通过+下单)--> Payment --(轮询成功)--> Processing --> Success | Error
///                                Payment --(CDK 兑换)--> Processing --> Success | Error
///                                Payment --(窗口耗尽)--> Expired（只能整体重置）
/// 任意状态 --(手动取消=停止轮询后 reset)--> JsonInput
/// ```
#[derive(Debug, Clone)]
pub enum WizardState {
    /// 初始态：等待粘贴并校验会话 JSON
    JsonInput,
    /// 订单已创建，二维码待支付
    Payment { order: Order, expiry: QrExpiry },
    /// 充值调用进行中（outcome 停在 waiting），禁止重复提交（后端无幂等键）
    Processing { outcome: RechargeOutcome },
    Success { outcome: RechargeOutcome },
    Error { outcome: RechargeOutcome },
    /// 二维码过期，区别于失败，需要整体重置
    Expired,
}

impl WizardState {
    pub fn name(&self) -> &'static str {
        match self {
            WizardState::JsonInput => "json_input",
            WizardState::Payment { .. } => "payment",
            WizardState::Processing { .. } => "processing",
            WizardState::Success { .. } => "success",
            WizardState::Error { .. } => "error",
            WizardState::Expired => "expired",
        }
    }
}

/// 取消句柄：轮询期间向导被独占借用，UI 线程靠它发取消信号
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// GoPlus 充值向导：校验 -> 下单 -> 轮询 -> 充值，外加可选的 CDK 直达路径。
///
/// 早期前端里带 CDK 和不带 CDK 的两份近似拷贝在这里合并成一个实现，
/// CDK 入口由 `cdk_enabled` 开关控制。
pub struct RechargeWizard<B: StarShareBackend> {
    backend: B,
    config: WizardConfig,
    attempt_id: Uuid,
    session: Option<SessionCredential>,
    state: WizardState,
    // send_replace 直接改值，没有订阅者时信号也不会丢
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl<B: StarShareBackend> RechargeWizard<B> {
    pub fn new(backend: B, config: WizardConfig) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            backend,
            config,
            attempt_id: Uuid::new_v4(),
            session: None,
            state: WizardState::JsonInput,
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn cdk_enabled(&self) -> bool {
        self.config.cdk_enabled
    }

    pub fn session_verified(&self) -> bool {
        self.session.is_some()
    }

    /// 当前二维码剩余秒数；不在支付态时为 None
    pub fn remaining_seconds(&self) -> Option<u64> {
        match &self.state {
            WizardState::Payment { expiry, .. } => Some(expiry.remaining_seconds()),
            _ => None,
        }
    }

    pub fn qr_expiry(&self) -> Option<&QrExpiry> {
        match &self.state {
            WizardState::Payment { expiry, .. } => Some(expiry),
            _ => None,
        }
    }

    /// 校验会话 JSON；只有全部字段齐备才会存下凭证放行后续步骤。
    /// 不满足时 UI 展示 error_message 并拒绝前进，没有静默兜底。
    pub fn submit_session(&mut self, raw: &str) -> ValidationState {
        let validation = validate_session_json(raw);
        if validation.has_all_fields {
            // 校验已确认可解析，这里不会失败
            self.session = SessionCredential::parse(raw).ok();
            log::info!("[{}] Session credential verified", self.attempt_id);
        } else {
            self.session = None;
            log::debug!(
                "[{}] Session rejected: {}",
                self.attempt_id,
                validation.error_message
            );
        }
        validation
    }

    /// 创建支付订单并进入支付态。失败时状态不变，由调用方提示重试。
    pub async fn create_order(&mut self) -> AppResult<&Order> {
        if self.session.is_none() {
            return Err(AppError::ValidationError(
                "会话凭证尚未通过校验".to_string(),
            ));
        }
        if !matches!(self.state, WizardState::JsonInput) {
            return Err(AppError::InternalError(format!(
                "当前状态 {} 不能创建订单",
                self.state.name()
            )));
        }

        let order = self.backend.create_order().await?;
        let expiry = QrExpiry::new(Duration::from_secs(self.config.qr_expiry_secs));
        log::info!(
            "[{}] Entering payment state, order {} valid for {}s",
            self.attempt_id,
            order.order_id,
            self.config.qr_expiry_secs
        );
        self.state = WizardState::Payment { order, expiry };
        Ok(match &self.state {
            WizardState::Payment { order, .. } => order,
            _ => unreachable!(),
        })
    }

    /// 驱动支付阶段：轮询直到支付成功，然后调用充值接口。
    ///
    /// 返回时 state 已落到 Success / Error / Expired；被取消时回到
    /// Payment（二维码仍有效），由调用方决定是 reset 还是改走 CDK。
    pub async fn run_payment(&mut self) -> AppResult<&WizardState> {
        let (order_id, expiry) = match &self.state {
            WizardState::Payment { order, expiry } => (order.order_id.clone(), expiry.clone()),
            _ => {
                return Err(AppError::InternalError(format!(
                    "当前状态 {} 不能进入支付轮询",
                    self.state.name()
                )));
            }
        };

        let mut cancel_rx = self.cancel_tx.subscribe();
        let poller = PaymentPoller::new(Duration::from_secs(self.config.poll_interval_secs));

        match poller
            .run(&self.backend, &order_id, &expiry, &mut cancel_rx)
            .await
        {
            PollOutcome::Paid => {
                self.state = WizardState::Processing {
                    outcome: RechargeOutcome::waiting(),
                };
                let session = self
                    .session
                    .as_ref()
                    .ok_or_else(|| AppError::InternalError("支付态缺少会话凭证".to_string()))?;
                let outcome =
                    recharge_service::run_order_path(&self.backend, &order_id, session).await;
                self.finish(outcome);
            }
            PollOutcome::Expired => {
                self.state = WizardState::Expired;
            }
            PollOutcome::AuthFailed(reason) => {
                log::warn!("[{}] Attempt aborted by auth failure: {reason}", self.attempt_id);
                self.state = WizardState::Error {
                    outcome: RechargeOutcome::error(
                        format!("登录态已失效（{reason}），请重新登录后再试"),
                        None,
                    ),
                };
            }
            PollOutcome::Cancelled => {
                // 取消只停轮询，订单和会话保留；重新武装取消信号
                self.cancel_tx.send_replace(false);
            }
        }
        Ok(&self.state)
    }

    /// CDK 兑换：不需要订单，但必须已有通过校验的会话凭证。
    /// 支付态、失败态、甚至还没下单时都可以走这条路。
    pub async fn submit_cdk(&mut self, raw_code: &str) -> AppResult<&WizardState> {
        if !self.config.cdk_enabled {
            return Err(AppError::ValidationError("CDK 兑换未开放".to_string()));
        }
        let cdk = CdkCode::parse(raw_code)?;
        if matches!(
            self.state,
            WizardState::Processing { .. } | WizardState::Success { .. }
        ) {
            return Err(AppError::InternalError(format!(
                "当前状态 {} 不能提交 CDK",
                self.state.name()
            )));
        }
        let Some(session) = self.session.clone() else {
            return Err(AppError::ValidationError(
                "会话凭证尚未通过校验".to_string(),
            ));
        };

        // 进入 Processing 挡住重复提交
        self.state = WizardState::Processing {
            outcome: RechargeOutcome::waiting(),
        };

        let outcome = recharge_service::run_cdk_path(&self.backend, &session, &cdk).await;
        self.finish(outcome);
        Ok(&self.state)
    }

    /// 请求停止当前轮询。没有轮询在跑时信号也会被记住，
    /// 下一次 run_payment 一进循环就会退出。
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// 轮询期间向导被 run_payment 独占借用，取消信号走这个句柄发
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// 一次性清空会话、订单、倒计时与结果，回到初始态。
    /// 手动取消 = cancel 停掉轮询后调这里。
    pub fn reset(&mut self) {
        self.cancel_tx.send_replace(false);
        self.session = None;
        self.state = WizardState::JsonInput;
        self.attempt_id = Uuid::new_v4();
        log::info!("[{}] Wizard reset", self.attempt_id);
    }

    fn finish(&mut self, outcome: RechargeOutcome) {
        log::info!(
            "[{}] Recharge finished: {:?} - {}",
            self.attempt_id,
            outcome.status,
            outcome.message
        );
        self.state = if outcome.is_success() {
            WizardState::Success { outcome }
        } else {
            WizardState::Error { outcome }
        };
    }
}
