use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub wizard: WizardConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardConfig {
    /// 二维码有效期（秒）
    #[serde(default = "default_qr_expiry_secs")]
    pub qr_expiry_secs: u64,
    /// 支付状态轮询间隔（秒），固定间隔无退避
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// 会话 JSON 校验防抖（毫秒）
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// 是否开放 CDK 兑换入口
    #[serde(default = "default_cdk_enabled")]
    pub cdk_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
}

fn default_timeout_secs() -> u64 {
    15
}
fn default_qr_expiry_secs() -> u64 {
    300
}
fn default_poll_interval_secs() -> u64 {
    2
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_cdk_enabled() -> bool {
    true
}
fn default_credentials_path() -> String {
    "goplus-credentials.json".to_string()
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            qr_expiry_secs: default_qr_expiry_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            debounce_ms: default_debounce_ms(),
            cdk_enabled: default_cdk_enabled(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
        }
    }
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                // 有配置文件：先解析再用环境变量覆盖
                toml::from_str(&config_str).map_err(|e| format!("解析配置文件失败: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // 无配置文件：使用环境变量与默认值构建
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                // 无配置文件时后端地址必须提供
                let base_url = get_env("STARSHARE_BASE_URL")
                    .ok_or("缺少 STARSHARE_BASE_URL 环境变量，且未找到配置文件 config.toml")?;

                Config {
                    api: ApiConfig {
                        base_url,
                        timeout_secs: get_env_parse("STARSHARE_TIMEOUT_SECS", default_timeout_secs()),
                    },
                    wizard: WizardConfig {
                        qr_expiry_secs: get_env_parse(
                            "GOPLUS_QR_EXPIRY_SECS",
                            default_qr_expiry_secs(),
                        ),
                        poll_interval_secs: get_env_parse(
                            "GOPLUS_POLL_INTERVAL_SECS",
                            default_poll_interval_secs(),
                        ),
                        debounce_ms: get_env_parse("GOPLUS_DEBOUNCE_MS", default_debounce_ms()),
                        cdk_enabled: get_env_parse("GOPLUS_CDK_ENABLED", default_cdk_enabled()),
                    },
                    storage: StorageConfig {
                        credentials_path: get_env("GOPLUS_CREDENTIALS_PATH")
                            .unwrap_or_else(default_credentials_path),
                    },
                }
            }
            Err(e) => {
                return Err(format!("无法读取配置文件 {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        if let Ok(v) = env::var("STARSHARE_BASE_URL") {
            config.api.base_url = v;
        }
        if let Ok(v) = env::var("STARSHARE_TIMEOUT_SECS")
            && let Ok(n) = v.parse()
        {
            config.api.timeout_secs = n;
        }
        if let Ok(v) = env::var("GOPLUS_QR_EXPIRY_SECS")
            && let Ok(n) = v.parse()
        {
            config.wizard.qr_expiry_secs = n;
        }
        if let Ok(v) = env::var("GOPLUS_POLL_INTERVAL_SECS")
            && let Ok(n) = v.parse()
        {
            config.wizard.poll_interval_secs = n;
        }
        if let Ok(v) = env::var("GOPLUS_DEBOUNCE_MS")
            && let Ok(n) = v.parse()
        {
            config.wizard.debounce_ms = n;
        }
        if let Ok(v) = env::var("GOPLUS_CDK_ENABLED")
            && let Ok(b) = v.parse()
        {
            config.wizard.cdk_enabled = b;
        }
        if let Ok(v) = env::var("GOPLUS_CREDENTIALS_PATH") {
            config.storage.credentials_path = v;
        }

        Ok(config)
    }
}
