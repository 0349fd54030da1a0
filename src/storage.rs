use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

/// 持久化的凭证：登录 token 和最近一次通过校验的会话 JSON。
///
/// Web 版直接读写 localStorage，这里抽成可注入的接口，
/// 测试时换内存实现即可。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub session_json: Option<String>,
}

pub trait CredentialStore {
    fn load(&self) -> AppResult<Option<StoredCredentials>>;
    fn save(&self, creds: &StoredCredentials) -> AppResult<()>;
    fn clear(&self) -> AppResult<()>;
}

/// JSON 文件实现，路径来自配置
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileStore {
    fn load(&self) -> AppResult<Option<StoredCredentials>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let creds = serde_json::from_str(&raw).map_err(|e| {
                    AppError::StorageError(format!(
                        "无法解析凭证文件 {}: {e}",
                        self.path.display()
                    ))
                })?;
                Ok(Some(creds))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, creds: &StoredCredentials) -> AppResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(creds)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 测试用内存实现
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Option<StoredCredentials>>,
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> AppResult<Option<StoredCredentials>> {
        Ok(self.inner.lock().unwrap().clone())
    }

    fn save(&self, creds: &StoredCredentials) -> AppResult<()> {
        *self.inner.lock().unwrap() = Some(creds.clone());
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        *self.inner.lock().unwrap() = None;
        Ok(())
    }
}
