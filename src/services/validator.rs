use crate::models::{SessionCredential, ValidationState};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// 校验粘贴的会话 JSON，产出给 UI 用的三元结果。
///
/// 纯函数：同样的输入永远得到同样的结果。
pub fn validate_session_json(raw: &str) -> ValidationState {
    if raw.trim().is_empty() {
        return ValidationState {
            is_format_valid: false,
            has_all_fields: false,
            error_message: "input required".to_string(),
        };
    }

    let credential = match SessionCredential::parse(raw) {
        Ok(c) => c,
        Err(e) => {
            return ValidationState {
                is_format_valid: false,
                has_all_fields: false,
                error_message: format!("parse error: {e}"),
            };
        }
    };

    let missing = credential.missing_paths();
    if !missing.is_empty() {
        return ValidationState {
            is_format_valid: true,
            has_all_fields: false,
            error_message: format!("missing fields: {}", missing.join(", ")),
        };
    }

    ValidationState {
        is_format_valid: true,
        has_all_fields: true,
        error_message: "ok".to_string(),
    }
}

/// 按键防抖的校验器。
///
/// 每次新输入都会中止上一次还没跑完的校验任务，所以永远只有
/// 最新的输入会被校验。结果带着代次编号走 watch 通道回来，
/// 旧任务就算在中止前抢跑完成也不会被当成最新结果。
pub struct DebouncedValidator {
    delay: Duration,
    generation: u64,
    tx: watch::Sender<Option<(u64, ValidationState)>>,
    rx: watch::Receiver<Option<(u64, ValidationState)>>,
    pending: Option<JoinHandle<()>>,
}

impl DebouncedValidator {
    pub fn new(delay: Duration) -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            delay,
            generation: 0,
            tx,
            rx,
            pending: None,
        }
    }

    /// 记录一次输入，重置防抖计时
    pub fn input(&mut self, raw: &str) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let raw = raw.to_string();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Some((generation, validate_session_json(&raw))));
        }));
    }

    /// 等待防抖结束，拿到最新一次输入的校验结果
    pub async fn settled(&mut self) -> ValidationState {
        if self.generation == 0 {
            // 从未有过输入
            return validate_session_json("");
        }
        loop {
            if let Some((generation, state)) = self.rx.borrow_and_update().clone()
                && generation == self.generation
            {
                return state;
            }
            if self.rx.changed().await.is_err() {
                // sender 不可能先于 self 释放，保底返回空输入结果
                return validate_session_json("");
            }
        }
    }
}

impl Drop for DebouncedValidator {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
