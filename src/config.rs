use crate::alipay::AlipayConfig;
use crate::core::PayError;
use crate::weixin::WechatConfig;
use serde::{Deserialize, Serialize};

/// Environment variable holding the json encoded [`PayConfig`].
pub const PAY_CONFIG_ENV: &str = "PAY_CONFIG";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String, // EnvFilter 语法, 比如 "warn" 或 "gateway_pay=debug"
    #[serde(default)]
    pub file: Option<String>,
}

fn default_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

/**
 * {
 *   "log": {"level": "debug", "file": "/var/log/pay.log"},
 *   "alipay": {"app_id": "...", "private_key": "...", "ali_public_key": "...", "mode": "dev"},
 *   "wechat": {"app_id": "...", "mch_id": "...", "key": "...", "mode": "service"}
 * }
 */
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PayConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub alipay: Option<AlipayConfig>,
    #[serde(default)]
    pub wechat: Option<WechatConfig>,
}

impl PayConfig {
    /// Reads `PAY_CONFIG`, a `.env` file is loaded first when present.
    pub fn from_env() -> Result<Self, PayError> {
        dotenvy::dotenv().ok();
        let raw = std::env::var(PAY_CONFIG_ENV)
            .map_err(|e| PayError::InvalidConfig(format!("error reading {}: {}", PAY_CONFIG_ENV, e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, PayError> {
        serde_json::from_str(raw)
            .map_err(|e| PayError::InvalidConfig(format!("error deserializing pay config: {:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alipay::AlipayMode;
    use crate::weixin::WechatMode;

    #[test]
    fn test_from_json() {
        let config = PayConfig::from_json(
            r#"{
                "alipay": {"app_id": "2016082000295641", "private_key": "a", "ali_public_key": "b", "mode": "dev"},
                "wechat": {"app_id": "wx_mp_appid", "mch_id": "1900000109", "key": "k", "mode": "hk"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.log.level, "warn");
        assert!(config.log.file.is_none());

        let alipay = config.alipay.unwrap();
        assert_eq!(alipay.mode, AlipayMode::Dev);
        assert_eq!(alipay.gateway_url(), "https://openapi.alipaydev.com/gateway.do");
        assert!(alipay.pid.is_none());

        let wechat = config.wechat.unwrap();
        assert_eq!(wechat.mode, WechatMode::Hk);
        assert_eq!(wechat.base_url(), "https://apihk.mch.weixin.qq.com/");
        assert!(!wechat.is_service());
    }

    #[test]
    fn test_endpoint_override_and_bad_mode() {
        let config = PayConfig::from_json(
            r#"{"wechat": {"mch_id": "1900000109", "key": "k", "mode": "service", "endpoint": "http://127.0.0.1:9000"}}"#,
        )
        .unwrap();
        let wechat = config.wechat.unwrap();
        assert_eq!(wechat.base_url(), "http://127.0.0.1:9000/");
        assert!(wechat.is_service());
        assert!(config.alipay.is_none());

        assert!(matches!(
            PayConfig::from_json(r#"{"wechat": {"mch_id": "1", "key": "k", "mode": "sandbox"}}"#),
            Err(PayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_env() {
        std::env::set_var(PAY_CONFIG_ENV, r#"{"log": {"level": "debug"}}"#);
        let config = PayConfig::from_env().unwrap();
        assert_eq!(config.log.level, "debug");
        assert!(config.alipay.is_none() && config.wechat.is_none());
    }
}
