use super::channels::{self, Delivery};
use super::openapi::{self, openapi_rsa2};
use super::AlipayConfig;
use crate::core::codec;
use crate::core::{
    AlipayChannel, Channel, GatewayApplication, InboundRequest, OrderRef, Params, PayError,
    PayResponse, Payload, Provider, Reply, ReqwestTransport, RequestOrigin, Transport,
    Verification,
};
use async_trait::async_trait;
use openssl::pkey::{PKey, Private, Public};
use std::sync::Arc;

pub struct Alipay {
    config: AlipayConfig,
    private_key: PKey<Private>,
    public_key: PKey<Public>,
    endpoint: String,
    transport: Arc<dyn Transport>,
}

impl Alipay {
    pub fn new(config: AlipayConfig) -> Result<Self, PayError> {
        let transport = ReqwestTransport::new()
            .map_err(|e| PayError::InvalidConfig(format!("error building http client: {}", e)))?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Keys are parsed here, bad key material fails now rather than at the first payment.
    pub fn with_transport(
        config: AlipayConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, PayError> {
        if config.app_id.is_empty() {
            return Err(PayError::InvalidConfig("missing alipay app_id".into()));
        }
        let private_key = openapi::load_private_key(&config.private_key)
            .map_err(|e| PayError::InvalidConfig(format!("alipay private_key: {}", e)))?;
        let public_key = openapi::load_public_key(&config.ali_public_key)
            .map_err(|e| PayError::InvalidConfig(format!("alipay ali_public_key: {}", e)))?;
        let endpoint = config.gateway_url();
        Ok(Self {
            config,
            private_key,
            public_key,
            endpoint,
            transport,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn base_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("app_id", self.config.app_id.as_str());
        payload.insert("method", "");
        payload.insert("format", "JSON");
        payload.insert("charset", "utf-8");
        payload.insert("sign_type", "RSA2");
        payload.insert("version", "1.0");
        payload.insert("return_url", self.config.return_url.as_str());
        payload.insert("notify_url", self.config.notify_url.as_str());
        payload.insert("timestamp", crate::utils::alipay_timestamp());
        payload.insert("biz_content", "");
        payload
    }

    /// Drops empty fields so the wire carries exactly the signed fields, then attaches `sign`.
    fn signed(&self, mut payload: Payload) -> Result<Payload, PayError> {
        payload.retain_non_empty();
        let sign = openapi_rsa2::sign(&payload, &self.private_key)?;
        payload.insert("sign", sign);
        Ok(payload)
    }

    pub async fn pay_with(
        &self,
        channel: AlipayChannel,
        params: Params,
    ) -> Result<PayResponse, PayError> {
        let payload = channels::build(
            channel,
            self.base_payload(),
            &params,
            self.config.pid.as_deref(),
        )?;
        let payload = self.signed(payload)?;
        tracing::debug!(channel = %channel, endpoint = %self.endpoint, "paying an alipay order: {:?}", payload);

        match channels::descriptor(channel).delivery {
            Delivery::Query => Ok(PayResponse::Query(codec::encode_form(&payload))),
            Delivery::Form => Ok(PayResponse::Html(self.build_form(&payload))),
            Delivery::Api => {
                let data = openapi::request_api(
                    self.transport.as_ref(),
                    &self.endpoint,
                    &payload,
                    &self.public_key,
                )
                .await?;
                Ok(PayResponse::Collection(data))
            }
        }
    }

    /**
     * 电脑网站 / 手机网站支付返回一个自动提交的表单
     */
    fn build_form(&self, payload: &Payload) -> String {
        let mut html = format!(
            "<form id='alipaysubmit' name='alipaysubmit' action='{}?charset=utf-8' method='POST'>",
            self.endpoint
        );
        for (k, v) in payload.iter() {
            html.push_str(&format!(
                "<input type='hidden' name='{}' value='{}'/>",
                html_escape(k),
                html_escape(v)
            ));
        }
        html.push_str("<input type='submit' value='ok' style='display:none;'></form>");
        html.push_str("<script>document.forms['alipaysubmit'].submit();</script>");
        html
    }

    async fn request_order_api(&self, method: &str, order: OrderRef) -> Result<Payload, PayError> {
        let biz_content = serde_json::to_string(&order.into_params())
            .map_err(|e| PayError::malformed(format!("error serializing biz_content: {}", e), ""))?;
        let mut payload = self.base_payload();
        payload.insert("method", method);
        payload.insert("biz_content", biz_content);
        let payload = self.signed(payload)?;
        tracing::debug!(endpoint = %self.endpoint, "{}: {:?}", method, payload);

        openapi::request_api(
            self.transport.as_ref(),
            &self.endpoint,
            &payload,
            &self.public_key,
        )
        .await
    }

    /**
     * 异步通知验签
     * 优先读 body, body 为空时读 query string
     * 字符集: 请求声明的 charset > 通知里的 charset 字段 > utf-8
     */
    pub fn inspect(&self, request: &InboundRequest) -> Verification {
        let raw: &[u8] = if request.body.is_empty() {
            request.query.trim_start_matches('?').as_bytes()
        } else {
            &request.body
        };
        let data = match codec::decode_form_bytes(raw, request.charset.as_deref()) {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => {
                return Verification::Malformed {
                    raw: String::new(),
                    reason: "empty alipay notification".into(),
                }
            }
            Err(e) => {
                return Verification::Malformed {
                    raw: String::from_utf8_lossy(raw).to_string(),
                    reason: e.to_string(),
                }
            }
        };
        tracing::debug!("receive alipay request: {:?}", data);

        if openapi_rsa2::verify(&data, &self.public_key) {
            Verification::Verified(data)
        } else {
            tracing::warn!("alipay sign verify failed: {:?}", data);
            Verification::Rejected {
                data,
                reason: "alipay sign verify failed".into(),
            }
        }
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('\'', "&apos;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl GatewayApplication for Alipay {
    async fn pay(
        &self,
        channel: &str,
        params: Params,
        _origin: &RequestOrigin,
    ) -> Result<PayResponse, PayError> {
        match crate::core::resolve(Provider::Alipay, channel)? {
            Channel::Alipay(channel) => self.pay_with(channel, params).await,
            Channel::Wechat(_) => Err(PayError::InvalidGatewayType {
                gateway: format!("alipay.{}", channel),
                provider: Provider::Alipay,
            }),
        }
    }

    async fn find(&self, order: OrderRef) -> Result<Payload, PayError> {
        self.request_order_api("alipay.trade.query", order).await
    }

    async fn refund(&self, order: OrderRef) -> Result<Payload, PayError> {
        self.request_order_api("alipay.trade.refund", order).await
    }

    async fn cancel(&self, order: OrderRef) -> Result<Payload, PayError> {
        self.request_order_api("alipay.trade.cancel", order).await
    }

    async fn close(&self, order: OrderRef) -> Result<Payload, PayError> {
        self.request_order_api("alipay.trade.close", order).await
    }

    fn verify(&self, request: &InboundRequest) -> Result<Payload, PayError> {
        self.inspect(request).into_result(Provider::Alipay)
    }

    fn success(&self) -> Reply {
        Reply::new("text/plain; charset=utf-8", "success")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alipay::openapi::tests::{key_pair, sign_text};
    use crate::core::transport::mock::MockTransport;
    use crate::core::TransportError;
    use serde_json::json;

    /// Merchant key and alipay key are the same pair so tests can forge gateway answers.
    fn test_config() -> (AlipayConfig, String) {
        let (private_pem, public_pem) = key_pair();
        let config = AlipayConfig {
            app_id: "2016082000295641".into(),
            private_key: private_pem.clone(),
            ali_public_key: public_pem,
            notify_url: "https://example.com/notify".into(),
            return_url: "https://example.com/return".into(),
            ..Default::default()
        };
        (config, private_pem)
    }

    fn order() -> Params {
        match json!({"out_trade_no": "1514027114", "total_amount": "0.01", "subject": "test subject"}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn signed_answer(method: &str, content: &str, private_pem: &str) -> String {
        format!(
            r#"{{"{}":{},"sign":"{}"}}"#,
            openapi::response_key(method),
            content,
            sign_text(content, private_pem)
        )
    }

    #[tokio::test]
    async fn test_app_pay_returns_signed_query() {
        let (config, _) = test_config();
        let alipay = Alipay::with_transport(config, Arc::new(MockTransport::new())).unwrap();
        let res = alipay
            .pay("app", order(), &RequestOrigin::default())
            .await
            .unwrap();
        let query = match res {
            PayResponse::Query(query) => query,
            r => panic!("unexpected response {:?}", r),
        };
        let payload = codec::decode_form(&query).unwrap();
        assert_eq!(payload.get("method"), Some("alipay.trade.app.pay"));
        assert_eq!(payload.get("sign_type"), Some("RSA2"));
        let biz: serde_json::Value =
            serde_json::from_str(payload.get("biz_content").unwrap()).unwrap();
        assert_eq!(biz["product_code"], "QUICK_MSECURITY_PAY");
        assert!(openapi_rsa2::verify(&payload, &alipay.public_key));
    }

    #[tokio::test]
    async fn test_web_pay_returns_form() {
        let (mut config, _) = test_config();
        config.mode = crate::alipay::AlipayMode::Dev;
        let alipay = Alipay::with_transport(config, Arc::new(MockTransport::new())).unwrap();
        let res = alipay
            .pay_with(AlipayChannel::Web, order())
            .await
            .unwrap();
        match res {
            PayResponse::Html(html) => {
                assert!(html.starts_with(
                    "<form id='alipaysubmit' name='alipaysubmit' action='https://openapi.alipaydev.com/gateway.do?charset=utf-8' method='POST'>"
                ));
                assert!(html.contains("name='method' value='alipay.trade.page.pay'"));
                assert!(html.contains("name='sign' value='"));
                assert!(html.ends_with("<script>document.forms['alipaysubmit'].submit();</script>"));
            }
            r => panic!("unexpected response {:?}", r),
        }
    }

    #[tokio::test]
    async fn test_pos_pay_calls_gateway() {
        let (config, private_pem) = test_config();
        let content = r#"{"code":"10000","msg":"Success","trade_no":"2017122321001004840200283826","out_trade_no":"1514027114","total_amount":"0.01"}"#;
        let transport = Arc::new(MockTransport::new().answer(signed_answer(
            "alipay.trade.pay",
            content,
            &private_pem,
        )));
        let alipay = Alipay::with_transport(config, transport.clone()).unwrap();
        let res = alipay
            .pay_with(AlipayChannel::Pos, order())
            .await
            .unwrap();
        match res {
            PayResponse::Collection(data) => {
                assert_eq!(data.get("trade_no"), Some("2017122321001004840200283826"))
            }
            r => panic!("unexpected response {:?}", r),
        }

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "https://openapi.alipay.com/gateway.do");
        let sent = codec::decode_form(&calls[0].body).unwrap();
        assert_eq!(sent.get("method"), Some("alipay.trade.pay"));
        assert!(sent.get("biz_content").unwrap().contains(r#""scene":"bar_code""#));
    }

    #[tokio::test]
    async fn test_find_accepts_out_trade_no() {
        let (config, private_pem) = test_config();
        let content = r#"{"code":"10000","msg":"Success","trade_status":"TRADE_SUCCESS","out_trade_no":"1514027114"}"#;
        let transport = Arc::new(MockTransport::new().answer(signed_answer(
            "alipay.trade.query",
            content,
            &private_pem,
        )));
        let alipay = Alipay::with_transport(config, transport.clone()).unwrap();
        let data = alipay.find("1514027114".into()).await.unwrap();
        assert_eq!(data.get("trade_status"), Some("TRADE_SUCCESS"));

        let sent = codec::decode_form(&transport.calls()[0].body).unwrap();
        assert_eq!(sent.get("method"), Some("alipay.trade.query"));
        assert_eq!(
            sent.get("biz_content"),
            Some(r#"{"out_trade_no":"1514027114"}"#)
        );
    }

    #[tokio::test]
    async fn test_refund_api_error() {
        let (config, _) = test_config();
        let transport = Arc::new(MockTransport::new().answer(
            r#"{"alipay_trade_refund_response":{"code":"40004","msg":"Business Failed","sub_msg":"交易不存在"},"sign":"abc"}"#,
        ));
        let alipay = Alipay::with_transport(config, transport).unwrap();
        let err = alipay.refund(OrderRef::Fields(order())).await.unwrap_err();
        assert!(matches!(
            err,
            PayError::ApiError {
                provider: Provider::Alipay,
                ..
            }
        ));
        assert_eq!(err.raw_payload().unwrap().get("code"), Some("40004"));
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let (config, _) = test_config();
        let transport = Arc::new(MockTransport::new().fail(TransportError::Status {
            status: 504,
            body: String::new(),
        }));
        let alipay = Alipay::with_transport(config, transport).unwrap();
        match alipay.close("1514027114".into()).await {
            Err(PayError::TransportFailure { endpoint, shape, .. }) => {
                assert_eq!(endpoint, "https://openapi.alipay.com/gateway.do");
                assert_eq!(shape, "alipay.trade.close");
            }
            r => panic!("unexpected result {:?}", r),
        }
    }

    #[tokio::test]
    async fn test_unparseable_answer_is_transport_failure() {
        let (config, _) = test_config();
        let transport = Arc::new(MockTransport::new().answer("<html>502 Bad Gateway</html>"));
        let alipay = Alipay::with_transport(config, transport).unwrap();
        match alipay.pay("scan", order(), &RequestOrigin::default()).await {
            Err(PayError::TransportFailure { shape, source, .. }) => {
                assert_eq!(shape, "alipay.trade.precreate");
                assert!(matches!(source, TransportError::MalformedBody(_)));
            }
            r => panic!("unexpected result {:?}", r),
        }
    }

    #[tokio::test]
    async fn test_unknown_and_foreign_channels() {
        let (config, _) = test_config();
        let alipay = Alipay::with_transport(config, Arc::new(MockTransport::new())).unwrap();
        let origin = RequestOrigin::default();
        assert!(matches!(
            alipay.pay("bitcoin", order(), &origin).await,
            Err(PayError::UnknownGateway(_))
        ));
        assert!(matches!(
            alipay.pay("mp", order(), &origin).await,
            Err(PayError::InvalidGatewayType { .. })
        ));
    }

    #[test]
    fn test_invalid_key_material() {
        let (mut config, _) = test_config();
        config.private_key = "not a key".into();
        assert!(matches!(
            Alipay::with_transport(config, Arc::new(MockTransport::new())),
            Err(PayError::InvalidConfig(_))
        ));
    }

    fn notification(private_pem: &str) -> Payload {
        let mut data: Payload = [
            ("app_id", "2016082000295641"),
            ("charset", "utf-8"),
            ("gmt_create", "2017-12-23 19:05:08"),
            ("notify_type", "trade_status_sync"),
            ("out_trade_no", "1514027114"),
            ("sign_type", "RSA2"),
            ("subject", "测试 订单"),
            ("total_amount", "0.01"),
            ("trade_status", "TRADE_SUCCESS"),
        ]
        .into_iter()
        .collect();
        let sign = sign_text(&openapi_rsa2::sign_source(&data, false), private_pem);
        data.insert("sign", sign);
        data
    }

    #[test]
    fn test_verify_notification() {
        let (config, private_pem) = test_config();
        let alipay = Alipay::with_transport(config, Arc::new(MockTransport::new())).unwrap();
        let data = notification(&private_pem);
        let body = codec::encode_form(&data);

        let verified = alipay.verify(&InboundRequest::from_body(body.clone())).unwrap();
        assert_eq!(verified, data);
        assert_eq!(verified.get("subject"), Some("测试 订单"));

        let from_query = alipay.inspect(&InboundRequest::from_query(body.clone()));
        assert!(from_query.is_verified());

        let tampered = body.replace("total_amount=0.01", "total_amount=0.02");
        match alipay.verify(&InboundRequest::from_body(tampered)) {
            Err(PayError::SignatureVerificationFailed { raw, .. }) => {
                assert_eq!(raw.get("total_amount"), Some("0.02"))
            }
            r => panic!("unexpected result {:?}", r),
        }

        assert!(matches!(
            alipay.inspect(&InboundRequest::default()),
            Verification::Malformed { .. }
        ));
    }

    fn gbk_form(data: &Payload) -> String {
        data.iter()
            .map(|(k, v)| {
                let (bytes, _, _) = encoding_rs::GBK.encode(v);
                format!(
                    "{}={}",
                    k,
                    percent_encoding::percent_encode(&bytes, percent_encoding::NON_ALPHANUMERIC)
                )
            })
            .collect::<Vec<String>>()
            .join("&")
    }

    #[test]
    fn test_verify_gbk_notification() {
        let (config, private_pem) = test_config();
        let alipay = Alipay::with_transport(config, Arc::new(MockTransport::new())).unwrap();
        let mut data = notification(&private_pem);
        data.insert("charset", "gbk");
        let sign = sign_text(&openapi_rsa2::sign_source(&data, false), &private_pem);
        data.insert("sign", sign);

        let verified = alipay.verify(&InboundRequest::from_body(gbk_form(&data))).unwrap();
        assert_eq!(verified.get("subject"), Some("测试 订单"));
    }

    #[test]
    fn test_request_charset_decodes_notification() {
        let (config, private_pem) = test_config();
        let alipay = Alipay::with_transport(config, Arc::new(MockTransport::new())).unwrap();
        let mut data = notification(&private_pem);
        data.remove("charset");
        let sign = sign_text(&openapi_rsa2::sign_source(&data, false), &private_pem);
        data.insert("sign", sign);
        let body = gbk_form(&data);

        let verified = alipay
            .verify(&InboundRequest::from_body(body.clone()).with_charset("gbk"))
            .unwrap();
        assert_eq!(verified.get("subject"), Some("测试 订单"));
        assert!(!alipay.inspect(&InboundRequest::from_body(body)).is_verified());
    }

    #[test]
    fn test_success_reply() {
        let (config, _) = test_config();
        let alipay = Alipay::with_transport(config, Arc::new(MockTransport::new())).unwrap();
        let reply = alipay.success();
        assert_eq!(reply.body, "success");
        assert_eq!(reply.status, 200);
        assert!(reply.content_type.starts_with("text/plain"));
    }
}
