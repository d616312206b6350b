pub mod channels;
mod gateway;
pub mod v2api;

mod config {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
    pub enum WechatMode {
        #[default]
        #[serde(rename = "normal")]
        Normal, // 普通模式
        #[serde(rename = "dev")]
        Dev, // 沙箱模式
        #[serde(rename = "hk")]
        Hk, // 香港钱包
        #[serde(rename = "service")]
        Service, // 服务商
    }

    impl WechatMode {
        pub fn base_url(&self) -> &'static str {
            match self {
                WechatMode::Normal | WechatMode::Service => "https://api.mch.weixin.qq.com/",
                WechatMode::Dev => "https://api.mch.weixin.qq.com/sandboxnew/",
                WechatMode::Hk => "https://apihk.mch.weixin.qq.com/",
            }
        }
    }

    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    pub struct WechatConfig {
        #[serde(default)]
        pub app_id: String, // 公众号 APPID
        #[serde(default)]
        pub appid: String, // APP 支付用的开放平台 APPID
        #[serde(default)]
        pub miniapp_id: String, // 小程序 APPID
        pub mch_id: String,
        pub key: String, // 商户 API 密钥
        #[serde(default)]
        pub notify_url: String,
        #[serde(default)]
        pub return_url: String, // H5 支付完成后的跳转地址
        #[serde(default)]
        pub cert_client: Option<String>, // apiclient_cert.pem, 文本或路径, 退款/红包/转账需要
        #[serde(default)]
        pub cert_key: Option<String>, // apiclient_key.pem
        #[serde(default)]
        pub mode: WechatMode,
        #[serde(default)]
        pub sub_mch_id: String,
        #[serde(default)]
        pub sub_app_id: String,
        #[serde(default)]
        pub sub_appid: String,
        #[serde(default)]
        pub sub_miniapp_id: String,
        #[serde(default)]
        pub endpoint: Option<String>, // 覆盖 mode 对应的网关地址
    }

    impl WechatConfig {
        pub fn base_url(&self) -> String {
            match self.endpoint.as_deref() {
                Some(endpoint) if !endpoint.is_empty() => {
                    format!("{}/", endpoint.trim_end_matches('/'))
                }
                _ => self.mode.base_url().to_string(),
            }
        }

        pub fn is_service(&self) -> bool {
            self.mode == WechatMode::Service
        }
    }
}

pub use config::*;
pub use gateway::Wechat;
