use crate::error::{AppError, AppResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// 订单路径与 CDK 路径共用的终态：waiting -> success | error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Waiting,
    Success,
    Error,
}

/// 充值调用的最终结果。
///
/// 后端没有结构化错误码，出错时把原始响应体原样带回，
/// 用户截图发给客服即可。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RechargeOutcome {
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(default)]
    pub raw_response: Option<Value>,
}

impl RechargeOutcome {
    pub fn waiting() -> Self {
        Self {
            status: OutcomeStatus::Waiting,
            message: "waiting".to_string(),
            raw_response: None,
        }
    }

    pub fn success(message: impl Into<String>, raw_response: Option<Value>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            message: message.into(),
            raw_response,
        }
    }

    pub fn error(message: impl Into<String>, raw_response: Option<Value>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            message: message.into(),
            raw_response,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

static CDK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]{6,64}$").expect("cdk regex"));

/// 兑换码，与订单完全无关；提交前先做本地格式检查
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdkCode(String);

impl CdkCode {
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::ValidationError("CDK 不能为空".to_string()));
        }
        if !CDK_RE.is_match(trimmed) {
            return Err(AppError::ValidationError(
                "CDK 格式不正确（6-64 位字母、数字或连字符）".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdk_rejects_empty_and_garbage() {
        assert!(CdkCode::parse("").is_err());
        assert!(CdkCode::parse("   ").is_err());
        assert!(CdkCode::parse("ab").is_err());
        assert!(CdkCode::parse("has space").is_err());
    }

    #[test]
    fn test_cdk_accepts_normal_codes() {
        let code = CdkCode::parse("  GOPLUS-2024-ABCDEF  ").unwrap();
        assert_eq!(code.as_str(), "GOPLUS-2024-ABCDEF");
    }
}
