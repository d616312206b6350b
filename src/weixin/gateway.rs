use super::channels::{self, Finish};
use super::v2api::{self, v2api_md5};
use super::WechatConfig;
use crate::core::codec;
use crate::core::{
    Channel, ClientIdentity, GatewayApplication, InboundRequest, OrderRef, Params, PayError,
    PayResponse, Payload, Provider, Reply, ReqwestTransport, RequestOrigin, Transport,
    Verification, WechatChannel,
};
use async_trait::async_trait;
use std::sync::Arc;

pub struct Wechat {
    config: WechatConfig,
    base_url: String,
    identity: Option<ClientIdentity>,
    transport: Arc<dyn Transport>,
}

impl Wechat {
    pub fn new(config: WechatConfig) -> Result<Self, PayError> {
        let transport = ReqwestTransport::new()
            .map_err(|e| PayError::InvalidConfig(format!("error building http client: {}", e)))?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: WechatConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, PayError> {
        if config.mch_id.is_empty() {
            return Err(PayError::InvalidConfig("missing wechat mch_id".into()));
        }
        if config.key.is_empty() {
            return Err(PayError::InvalidConfig("missing wechat key".into()));
        }
        let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.trim().is_empty());
        let identity = match (non_empty(&config.cert_client), non_empty(&config.cert_key)) {
            (Some(cert), Some(key)) => Some(ClientIdentity::load(&cert, &key)?),
            (None, None) => None,
            _ => {
                return Err(PayError::InvalidConfig(
                    "wechat cert_client and cert_key must be configured together".into(),
                ))
            }
        };
        let base_url = config.base_url();
        Ok(Self {
            config,
            base_url,
            identity,
            transport,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn identity(&self, endpoint: &str) -> Result<&ClientIdentity, PayError> {
        self.identity.as_ref().ok_or_else(|| {
            PayError::InvalidConfig(format!(
                "{} requires wechat cert_client and cert_key",
                endpoint
            ))
        })
    }

    fn base_payload(&self, origin: &RequestOrigin) -> Payload {
        let mut payload = Payload::new();
        payload.insert("appid", self.config.app_id.as_str());
        payload.insert("mch_id", self.config.mch_id.as_str());
        payload.insert("nonce_str", crate::utils::nonce_str());
        payload.insert("notify_url", self.config.notify_url.as_str());
        payload.insert("sign", "");
        payload.insert("trade_type", "");
        payload.insert(
            "spbill_create_ip",
            origin.client_ip.as_deref().unwrap_or_default(),
        );
        if self.config.is_service() {
            payload.insert("sub_mch_id", self.config.sub_mch_id.as_str());
            payload.insert("sub_appid", self.config.sub_app_id.as_str());
        }
        payload
    }

    /// Drops empty fields so the wire carries exactly the signed fields, then attaches `sign`.
    fn signed(&self, mut payload: Payload) -> Result<Payload, PayError> {
        payload.remove("sign");
        payload.retain_non_empty();
        let sign = v2api_md5::sign(&payload, &self.config.key)?;
        payload.insert("sign", sign);
        Ok(payload)
    }

    async fn request_api(
        &self,
        endpoint: &str,
        payload: &Payload,
        identity: Option<&ClientIdentity>,
    ) -> Result<Payload, PayError> {
        v2api::request_api(
            self.transport.as_ref(),
            &self.base_url,
            endpoint,
            payload,
            &self.config.key,
            identity,
        )
        .await
    }

    pub async fn pay_with(
        &self,
        channel: WechatChannel,
        params: Params,
        origin: &RequestOrigin,
    ) -> Result<PayResponse, PayError> {
        let mut payload = self.base_payload(origin);
        payload.merge(&params);
        let plan = channels::build(channel, payload, &self.config, origin)?;
        let identity = if plan.mutual_tls {
            Some(self.identity(plan.endpoint)?)
        } else {
            None
        };
        let payload = self.signed(plan.payload)?;
        tracing::debug!(channel = %channel, endpoint = plan.endpoint, "paying a wechat order: {:?}", payload);

        let data = self.request_api(plan.endpoint, &payload, identity).await?;
        match plan.finish {
            Finish::Collection => Ok(PayResponse::Collection(data)),
            Finish::App => {
                let prepay_id = required(&data, "prepay_id")?;
                let pay_request = channels::app_pay_request(&payload, prepay_id, &self.config)?;
                tracing::debug!("paying an app order: {:?}", pay_request);
                Ok(PayResponse::Json(pay_request.to_json()))
            }
            Finish::Jsapi => {
                let prepay_id = required(&data, "prepay_id")?;
                let pay_request = channels::jsapi_pay_request(&payload, prepay_id, &self.config)?;
                tracing::debug!("paying a jsapi order: {:?}", pay_request);
                Ok(PayResponse::Collection(pay_request))
            }
            Finish::Wap => {
                let mweb_url = required(&data, "mweb_url")?;
                let url = if self.config.return_url.is_empty() {
                    mweb_url.to_string()
                } else {
                    format!(
                        "{}&redirect_url={}",
                        mweb_url,
                        codec::form_escape(&self.config.return_url)
                    )
                };
                Ok(PayResponse::Redirect(url))
            }
        }
    }

    /**
     * 查询 / 退款 / 关闭订单
     * 订单参数直接合并在顶层, 不需要 trade_type 和 notify_url
     */
    async fn request_order_api(
        &self,
        endpoint: &'static str,
        order: OrderRef,
        identity: Option<&ClientIdentity>,
    ) -> Result<Payload, PayError> {
        let mut payload = self.base_payload(&RequestOrigin::default());
        payload.merge(&order.into_params());
        payload.remove("trade_type");
        payload.remove("notify_url");
        let payload = self.signed(payload)?;
        tracing::debug!(endpoint = endpoint, "wechat order api: {:?}", payload);

        self.request_api(endpoint, &payload, identity).await
    }

    /**
     * 异步通知验签
     * 字符集: 请求声明的 charset > xml 声明里的 encoding > utf-8
     */
    pub fn inspect(&self, request: &InboundRequest) -> Verification {
        let raw = String::from_utf8_lossy(&request.body).to_string();
        let charset = request
            .charset
            .clone()
            .or_else(|| codec::xml_declared_charset(&request.body))
            .unwrap_or_else(|| "utf-8".to_string());
        let decoded = codec::transcode(&request.body, &charset, "utf-8")
            .and_then(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| PayError::malformed(format!("invalid utf-8: {}", e), raw.as_str()))
            })
            .and_then(|xml| codec::decode_xml(&xml));
        let data = match decoded {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => {
                return Verification::Malformed {
                    raw,
                    reason: "empty wechat notification".into(),
                }
            }
            Err(e) => {
                return Verification::Malformed {
                    raw,
                    reason: e.to_string(),
                }
            }
        };
        tracing::debug!("receive wechat request: {:?}", data);

        if v2api_md5::verify(&data, &self.config.key) {
            Verification::Verified(data)
        } else {
            tracing::warn!("wechat sign verify failed: {:?}", data);
            Verification::Rejected {
                data,
                reason: "wechat sign verify failed".into(),
            }
        }
    }
}

fn required<'a>(data: &'a Payload, field: &str) -> Result<&'a str, PayError> {
    data.get(field)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PayError::ApiError {
            provider: Provider::Wechat,
            message: format!("missing {} in wechat response", field),
            raw: data.clone(),
        })
}

#[async_trait]
impl GatewayApplication for Wechat {
    async fn pay(
        &self,
        channel: &str,
        params: Params,
        origin: &RequestOrigin,
    ) -> Result<PayResponse, PayError> {
        match crate::core::resolve(Provider::Wechat, channel)? {
            Channel::Wechat(channel) => self.pay_with(channel, params, origin).await,
            Channel::Alipay(_) => Err(PayError::InvalidGatewayType {
                gateway: format!("wechat.{}", channel),
                provider: Provider::Wechat,
            }),
        }
    }

    async fn find(&self, order: OrderRef) -> Result<Payload, PayError> {
        self.request_order_api("pay/orderquery", order, None).await
    }

    async fn refund(&self, order: OrderRef) -> Result<Payload, PayError> {
        let endpoint = "secapi/pay/refund";
        let identity = self.identity(endpoint)?;
        self.request_order_api(endpoint, order, Some(identity)).await
    }

    async fn cancel(&self, _order: OrderRef) -> Result<Payload, PayError> {
        Err(PayError::UnsupportedOperation(
            "Wechat Do Not Have Cancel API! Please use Close API!".into(),
        ))
    }

    async fn close(&self, order: OrderRef) -> Result<Payload, PayError> {
        let mut params = order.into_params();
        params.remove("spbill_create_ip");
        self.request_order_api("pay/closeorder", OrderRef::Fields(params), None)
            .await
    }

    fn verify(&self, request: &InboundRequest) -> Result<Payload, PayError> {
        self.inspect(request).into_result(Provider::Wechat)
    }

    fn success(&self) -> Reply {
        let payload: Payload = [("return_code", "SUCCESS")].into_iter().collect();
        Reply::new("application/xml", codec::encode_xml(&payload))
    }
}
