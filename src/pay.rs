use crate::alipay::Alipay;
use crate::config::PayConfig;
use crate::core::{GatewayApplication, PayError, Provider, Transport};
use crate::weixin::Wechat;
use std::sync::Arc;

/**
 * 按名字创建网关: Pay::new(config)?.create("wechat")
 * 每次调用都会用配置新建一个网关, 网关本身不可变, 可以在多个任务间共享
 */
pub struct Pay {
    config: PayConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl Pay {
    /// Installs logging when a log file is configured.
    pub fn new(config: PayConfig) -> Result<Self, PayError> {
        if config.log.file.is_some() {
            crate::logging::init(&config.log)?;
        }
        Ok(Self {
            config,
            transport: None,
        })
    }

    pub fn from_env() -> Result<Self, PayError> {
        Self::new(PayConfig::from_env()?)
    }

    /// Every gateway created afterwards shares `transport` instead of its own reqwest client.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(&self) -> &PayConfig {
        &self.config
    }

    pub fn alipay(&self) -> Result<Alipay, PayError> {
        let config = self
            .config
            .alipay
            .clone()
            .ok_or_else(|| PayError::InvalidConfig("missing alipay config".into()))?;
        match &self.transport {
            Some(transport) => Alipay::with_transport(config, transport.clone()),
            None => Alipay::new(config),
        }
    }

    pub fn wechat(&self) -> Result<Wechat, PayError> {
        let config = self
            .config
            .wechat
            .clone()
            .ok_or_else(|| PayError::InvalidConfig("missing wechat config".into()))?;
        match &self.transport {
            Some(transport) => Wechat::with_transport(config, transport.clone()),
            None => Wechat::new(config),
        }
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn GatewayApplication>, PayError> {
        match name.parse::<Provider>()? {
            Provider::Alipay => Ok(Box::new(self.alipay()?)),
            Provider::Wechat => Ok(Box::new(self.wechat()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec;
    use crate::core::{OrderRef, Payload};
    use crate::weixin::v2api::v2api_md5;
    use httpmock::prelude::*;

    const KEY: &str = "192006250b4c09247ec02edce69f6a2d";

    fn config(endpoint: Option<String>) -> PayConfig {
        PayConfig::from_json(
            &serde_json::json!({
                "wechat": {
                    "app_id": "wx_mp_appid",
                    "mch_id": "1900000109",
                    "key": KEY,
                    "endpoint": endpoint,
                }
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_by_name() {
        let pay = Pay::new(config(None)).unwrap();
        let wechat = pay.create("wechat").unwrap();
        assert_eq!(
            wechat.success().body,
            "<xml><return_code><![CDATA[SUCCESS]]></return_code></xml>"
        );
        assert!(matches!(
            pay.create("unionpay"),
            Err(PayError::UnknownGateway(_))
        ));
        assert!(matches!(pay.create("alipay"), Err(PayError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_wechat_find_over_http() {
        let server = MockServer::start_async().await;
        let mut answer: Payload = [
            ("return_code", "SUCCESS"),
            ("result_code", "SUCCESS"),
            ("out_trade_no", "T1"),
            ("trade_state", "NOTPAY"),
        ]
        .into_iter()
        .collect();
        answer.insert("sign", v2api_md5::sign(&answer, KEY).unwrap());
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/pay/orderquery")
                    .body_contains("<out_trade_no><![CDATA[T1]]></out_trade_no>");
                then.status(200).body(codec::encode_xml(&answer));
            })
            .await;

        let pay = Pay::new(config(Some(server.base_url()))).unwrap();
        let wechat = pay.create("wechat").unwrap();
        let data = wechat.find(OrderRef::from("T1")).await.unwrap();
        mock.assert_async().await;
        assert_eq!(data.get("trade_state"), Some("NOTPAY"));
    }
}
