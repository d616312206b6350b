pub mod channels;
mod gateway;
pub mod openapi;

mod config {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
    pub enum AlipayMode {
        #[default]
        #[serde(rename = "normal")]
        Normal,
        #[serde(rename = "dev")]
        Dev,
    }

    impl AlipayMode {
        pub fn endpoint(&self) -> &'static str {
            match self {
                AlipayMode::Normal => "https://openapi.alipay.com/gateway.do",
                AlipayMode::Dev => "https://openapi.alipaydev.com/gateway.do",
            }
        }
    }

    /**
     * private_key / ali_public_key 可以是 pem 文本, 去掉头尾的 base64 内容, 或者 .pem 文件路径
     */
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    pub struct AlipayConfig {
        pub app_id: String, // 支付宝分配给开发者的应用 ID
        #[serde(default)]
        pub pid: Option<String>, // 服务商模式下的服务商 PID
        pub private_key: String,    // 应用私钥, RSA2
        pub ali_public_key: String, // 支付宝公钥
        #[serde(default)]
        pub notify_url: String,
        #[serde(default)]
        pub return_url: String,
        #[serde(default)]
        pub mode: AlipayMode,
        #[serde(default)]
        pub endpoint: Option<String>, // 覆盖 mode 对应的网关地址
    }

    impl AlipayConfig {
        pub fn gateway_url(&self) -> String {
            match self.endpoint.as_deref() {
                Some(endpoint) if !endpoint.is_empty() => endpoint.to_string(),
                _ => self.mode.endpoint().to_string(),
            }
        }
    }
}

pub use config::*;
pub use gateway::Alipay;
