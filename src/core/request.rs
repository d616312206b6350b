use super::error::PayError;
use super::payload::{Params, Payload};
use super::response::{PayResponse, Reply};
use async_trait::async_trait;

/// Operations every provider gateway exposes.
#[async_trait]
pub trait GatewayApplication: Send + Sync {
    /// Pays through the channel named `channel` (`app`, `web`, `mp` ...).
    async fn pay(
        &self,
        channel: &str,
        params: Params,
        origin: &RequestOrigin,
    ) -> Result<PayResponse, PayError>;

    async fn find(&self, order: OrderRef) -> Result<Payload, PayError>;

    async fn refund(&self, order: OrderRef) -> Result<Payload, PayError>;

    async fn cancel(&self, order: OrderRef) -> Result<Payload, PayError>;

    async fn close(&self, order: OrderRef) -> Result<Payload, PayError>;

    /// Validates an asynchronous notification, returning its fields when the signature holds.
    fn verify(&self, request: &InboundRequest) -> Result<Payload, PayError>;

    /// Acknowledgement body that stops the provider's notification retries.
    fn success(&self) -> Reply;
}

/**
 * 查询/退款/撤销/关闭 时的订单标识
 * 直接传商户订单号时映射到 out_trade_no, 需要其他标识 (transaction_id, trade_no ...) 时传 Fields
 */
#[derive(Debug, Clone, PartialEq)]
pub enum OrderRef {
    OutTradeNo(String),
    Fields(Params),
}

impl OrderRef {
    pub fn into_params(self) -> Params {
        match self {
            OrderRef::OutTradeNo(no) => {
                let mut params = Params::new();
                params.insert("out_trade_no".into(), serde_json::Value::String(no));
                params
            }
            OrderRef::Fields(params) => params,
        }
    }
}

impl From<&str> for OrderRef {
    fn from(no: &str) -> Self {
        OrderRef::OutTradeNo(no.to_string())
    }
}

impl From<String> for OrderRef {
    fn from(no: String) -> Self {
        OrderRef::OutTradeNo(no)
    }
}

impl From<Params> for OrderRef {
    fn from(params: Params) -> Self {
        OrderRef::Fields(params)
    }
}

/// Addresses taken from the caller's request handling layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    /// Payer's ip, sent as `spbill_create_ip`.
    pub client_ip: Option<String>,
    /// This server's ip, required by redpack and transfer calls.
    pub server_ip: Option<String>,
}

impl RequestOrigin {
    pub fn client(ip: impl Into<String>) -> Self {
        Self {
            client_ip: Some(ip.into()),
            server_ip: None,
        }
    }
}

/// An inbound notification as received by the caller's web layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundRequest {
    pub body: Vec<u8>,
    /// Raw query string without the leading `?`.
    pub query: String,
    /// Charset declared by the transport (content-type header), if any.
    pub charset: Option<String>,
}

impl InboundRequest {
    pub fn from_body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn from_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Verified(Payload),
    Rejected { data: Payload, reason: String },
    Malformed { raw: String, reason: String },
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified(_))
    }

    pub fn into_result(self, provider: super::channel::Provider) -> Result<Payload, PayError> {
        match self {
            Verification::Verified(data) => Ok(data),
            Verification::Rejected { data, .. } => {
                Err(PayError::SignatureVerificationFailed { provider, raw: data })
            }
            Verification::Malformed { raw, reason } => Err(PayError::MalformedPayload { reason, raw }),
        }
    }
}
