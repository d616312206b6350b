use super::channel::Provider;
use super::payload::Payload;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayError {
    #[error("[Unknown Gateway] Pay Gateway [{0}] not exists")]
    UnknownGateway(String),
    #[error("[Invalid Gateway Type] Pay Gateway [{gateway}] is not a {provider} gateway")]
    InvalidGatewayType { gateway: String, provider: Provider },
    #[error("[Invalid Gateway Config] {0}")]
    InvalidConfig(String),
    #[error("[Signature Verification Failed] {provider} sign verify failed")]
    SignatureVerificationFailed { provider: Provider, raw: Payload },
    #[error("[Malformed Payload] {reason}")]
    MalformedPayload { reason: String, raw: String },
    #[error("[Transport Failure] {endpoint} ({shape}): {source}")]
    TransportFailure {
        endpoint: String,
        shape: String,
        #[source]
        source: TransportError,
    },
    #[error("[Gateway Api Error] Get {provider} API Error: {message}")]
    ApiError {
        provider: Provider,
        message: String,
        raw: Payload,
    },
    #[error("[Unsupported Operation] {0}")]
    UnsupportedOperation(String),
}

impl PayError {
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        PayError::MalformedPayload {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Raw inbound data carried by verification and api failures.
    pub fn raw_payload(&self) -> Option<&Payload> {
        match self {
            PayError::SignatureVerificationFailed { raw, .. } => Some(raw),
            PayError::ApiError { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<openssl::error::ErrorStack> for PayError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        PayError::InvalidConfig(format!("[openssl] {:?}", e))
    }
}

impl From<data_encoding::DecodeError> for PayError {
    fn from(e: data_encoding::DecodeError) -> Self {
        PayError::InvalidConfig(format!("[base64] {:?}", e))
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("error sending request: {0}")]
    Request(String),
    #[error("error loading client certificate: {0}")]
    Identity(String),
    #[error("unexpected http status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(format!("{}", e))
    }
}
