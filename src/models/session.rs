use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 充值自动化所需的四个必填字段（点分路径）
pub const REQUIRED_PATHS: [&str; 4] = ["user.id", "user.email", "account.id", "accessToken"];

/// 用户从 ChatGPT 会话接口粘贴的凭证 JSON。
///
/// 对本客户端而言内容是不透明的：只校验四个必填路径存在，
/// 其余字段原样透传给后端。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCredential(Value);

impl SessionCredential {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Value>(raw).map(Self)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// 按点分路径查值，`null` 视作缺失
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = &self.0;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        if current.is_null() { None } else { Some(current) }
    }

    pub fn missing_paths(&self) -> Vec<&'static str> {
        REQUIRED_PATHS
            .iter()
            .copied()
            .filter(|p| self.lookup(p).is_none())
            .collect()
    }
}

/// JSON 校验结果，随输入变化重新计算，不做持久化
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationState {
    pub is_format_valid: bool,
    pub has_all_fields: bool,
    pub error_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_nested_path() {
        let cred =
            SessionCredential::parse(r#"{"user":{"id":"u1","email":"a@b.c"}}"#).unwrap();
        assert_eq!(cred.lookup("user.id").unwrap(), "u1");
        assert!(cred.lookup("user.name").is_none());
        assert!(cred.lookup("accessToken").is_none());
    }

    #[test]
    fn test_null_counts_as_missing() {
        let cred = SessionCredential::parse(r#"{"accessToken":null}"#).unwrap();
        assert!(cred.lookup("accessToken").is_none());
        assert!(cred.missing_paths().contains(&"accessToken"));
    }

    #[test]
    fn test_missing_paths_enumerates_all() {
        let cred = SessionCredential::parse(r#"{"user":{"id":"u1"}}"#).unwrap();
        assert_eq!(
            cred.missing_paths(),
            vec!["user.email", "account.id", "accessToken"]
        );
    }
}
