use super::error::{PayError, TransportError};
use async_trait::async_trait;
use std::time::Duration;

/// Client certificate pair used for mutually authenticated calls (refund, redpack, transfer).
#[derive(Clone)]
pub struct ClientIdentity {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl ClientIdentity {
    pub fn from_pem(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }

    /// `cert` and `key` are either pem text or paths of pem files.
    pub fn load(cert: &str, key: &str) -> Result<Self, PayError> {
        Ok(Self::from_pem(read_pem(cert)?, read_pem(key)?))
    }

    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &[u8] {
        &self.key_pem
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity").finish_non_exhaustive()
    }
}

/// Pem text is used as is, anything else is read from disk.
pub(crate) fn read_pem(source: &str) -> Result<Vec<u8>, PayError> {
    if source.contains("-----BEGIN") {
        return Ok(source.as_bytes().to_vec());
    }
    std::fs::read(source.trim())
        .map_err(|e| PayError::InvalidConfig(format!("error reading pem file {}: {}", source, e)))
}

pub struct TransportRequest<'a> {
    pub url: &'a str,
    pub body: String,
    pub content_type: &'static str,
    pub identity: Option<&'a ClientIdentity>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(&self, request: TransportRequest<'_>) -> Result<Vec<u8>, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    fn client_for(&self, identity: Option<&ClientIdentity>) -> Result<reqwest::Client, TransportError> {
        match identity {
            None => Ok(self.client.clone()),
            Some(identity) => {
                let identity = reqwest::Identity::from_pkcs8_pem(identity.cert_pem(), identity.key_pem())
                    .map_err(|e| TransportError::Identity(format!("{}", e)))?;
                Ok(reqwest::Client::builder()
                    .timeout(self.timeout)
                    .identity(identity)
                    .build()?)
            }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn invoke(&self, request: TransportRequest<'_>) -> Result<Vec<u8>, TransportError> {
        let client = self.client_for(request.identity)?;
        let res = client
            .post(request.url)
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .body(request.body)
            .send()
            .await?;
        let status = res.status();
        let bytes = res.bytes().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}
