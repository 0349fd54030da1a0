use serde::{Deserialize, Serialize};

/// 后端约定：`code == 20000` 表示成功
pub const CODE_OK: i64 = 20000;
/// 登录态失效时后端返回的业务码
pub const CODE_AUTH_FAILURE: i64 = 40100;

/// Star Share 后端统一响应信封 `{code, msg, data}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    pub msg: String,
    // 裸 #[serde(default)] 会让 derive 给 T 加 Default 约束，这里只需要 Option 自己的
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_success(&self) -> bool {
        self.code == CODE_OK
    }
}
