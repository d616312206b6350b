use crate::core::codec;
use crate::core::{PayError, Payload, Provider, Transport, TransportError, TransportRequest};
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Rsa;
use serde_json::value::RawValue;
use std::collections::HashMap;

pub mod openapi_rsa2 {
    use super::*;
    use openssl::{hash::MessageDigest, sign::Signer, sign::Verifier};

    /**
     * 待签名字符串: 按 key 的字节序排列, key=value 用 & 连接, 不做 urlencode
     * 发起请求时去掉 sign 和空值, 验签时只去掉 sign (空值原样参与)
     */
    pub fn sign_source(payload: &Payload, skip_empty: bool) -> String {
        payload
            .iter()
            .filter(|(k, v)| *k != "sign" && !(skip_empty && v.is_empty()))
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<String>>()
            .join("&")
    }

    pub fn sign(payload: &Payload, private_key: &PKey<Private>) -> Result<String, PayError> {
        let sign_sorted_source = sign_source(payload, true);
        tracing::debug!(sign_source = %sign_sorted_source, "alipay rsa2 sign");
        let mut signer = Signer::new(MessageDigest::sha256(), private_key)?;
        signer.update(sign_sorted_source.as_bytes())?;
        let signature_bytes = signer.sign_to_vec()?;
        Ok(data_encoding::BASE64.encode(&signature_bytes))
    }

    /// Checks the `sign` field of an inbound payload, a missing or undecodable sign is a mismatch.
    pub fn verify(payload: &Payload, public_key: &PKey<Public>) -> bool {
        match payload.get("sign") {
            Some(signature) => verify_content(&sign_source(payload, false), signature, public_key),
            None => false,
        }
    }

    pub fn verify_content(content: &str, signature: &str, public_key: &PKey<Public>) -> bool {
        // 通知里的 sign 可能带换行
        let signature: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
        let signature_bytes = match data_encoding::BASE64.decode(signature.as_bytes()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let verify = || -> Result<bool, openssl::error::ErrorStack> {
            let mut verifier = Verifier::new(MessageDigest::sha256(), public_key)?;
            verifier.update(content.as_bytes())?;
            verifier.verify(&signature_bytes)
        };
        verify().unwrap_or(false)
    }
}

/**
 * 私钥可以是 pem 文本, 去掉头尾的 base64 DER, 或者 .pem 文件路径
 */
pub fn load_private_key(source: &str) -> Result<PKey<Private>, PayError> {
    match key_source(source)? {
        KeySource::Pem(pem) => Ok(PKey::private_key_from_pem(&pem)?),
        KeySource::Der(der) => Ok(PKey::private_key_from_der(&der)?),
    }
}

/// Same accepted forms as [`load_private_key`]; pkcs#1 `RSA PUBLIC KEY` pem is accepted too.
pub fn load_public_key(source: &str) -> Result<PKey<Public>, PayError> {
    match key_source(source)? {
        KeySource::Pem(pem) => {
            if pem.windows(b"RSA PUBLIC KEY".len()).any(|w| w == b"RSA PUBLIC KEY") {
                Ok(PKey::from_rsa(Rsa::public_key_from_pem_pkcs1(&pem)?)?)
            } else {
                Ok(PKey::public_key_from_pem(&pem)?)
            }
        }
        KeySource::Der(der) => Ok(PKey::public_key_from_der(&der)?),
    }
}

enum KeySource {
    Pem(Vec<u8>),
    Der(Vec<u8>),
}

fn key_source(source: &str) -> Result<KeySource, PayError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(PayError::InvalidConfig("alipay key is empty".into()));
    }
    if source.contains("-----BEGIN") {
        return Ok(KeySource::Pem(source.as_bytes().to_vec()));
    }
    if source.ends_with(".pem") {
        return Ok(KeySource::Pem(crate::core::transport::read_pem(source)?));
    }
    let compact: String = source.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(KeySource::Der(data_encoding::BASE64.decode(compact.as_bytes())?))
}

/// `alipay.trade.query` => `alipay_trade_query_response`
pub fn response_key(method: &str) -> String {
    format!("{}_response", method.replace('.', "_"))
}

/**
 * 发送已签名的 payload 到网关并校验同步返回
 * 返回格式: {"alipay_trade_query_response": {...}, "sign": "..."}
 * 签名针对的是 xxx_response 原始 json 文本, 所以这里保留 RawValue 不做重新序列化
 */
pub async fn request_api(
    transport: &dyn Transport,
    endpoint: &str,
    payload: &Payload,
    public_key: &PKey<Public>,
) -> Result<Payload, PayError> {
    let method = payload.get("method").unwrap_or_default().to_string();
    tracing::debug!(endpoint = endpoint, method = %method, "request alipay api");

    let res = transport
        .invoke(TransportRequest {
            url: endpoint,
            body: codec::encode_form(payload),
            content_type: "application/x-www-form-urlencoded;charset=utf-8",
            identity: None,
        })
        .await
        .map_err(|e| {
            tracing::error!(endpoint = endpoint, method = %method, "alipay api transport failure: {}", e);
            PayError::TransportFailure {
                endpoint: endpoint.to_string(),
                shape: method.clone(),
                source: e,
            }
        })?;
    let malformed_body = |reason: String| PayError::TransportFailure {
        endpoint: endpoint.to_string(),
        shape: method.clone(),
        source: TransportError::MalformedBody(reason),
    };
    let res_text = String::from_utf8(res)
        .map_err(|e| malformed_body(format!("alipay response is not utf-8: {}", e)))?;
    tracing::debug!("{} response: {:?}", method, res_text);

    parse_response(&method, &res_text, public_key).map_err(|e| match e {
        PayError::MalformedPayload { reason, .. } => malformed_body(reason),
        e => e,
    })
}

pub(crate) fn parse_response(
    method: &str,
    res_text: &str,
    public_key: &PKey<Public>,
) -> Result<Payload, PayError> {
    let members: HashMap<String, Box<RawValue>> = serde_json::from_str(res_text)
        .map_err(|e| PayError::malformed(format!("error parsing alipay response: {}", e), res_text))?;
    let key = response_key(method);
    let content = members
        .get(&key)
        .ok_or_else(|| PayError::malformed(format!("missing {} in alipay response", key), res_text))?;
    let fields: crate::core::Params = serde_json::from_str(content.get())
        .map_err(|e| PayError::malformed(format!("error parsing {}: {}", key, e), res_text))?;
    let data = Payload::from_params(&fields);

    let signature = members
        .get("sign")
        .and_then(|sign| serde_json::from_str::<String>(sign.get()).ok());
    if data.get("code") != Some("10000") || signature.is_none() {
        let message = match (data.get("msg"), data.get("sub_msg")) {
            (Some(msg), Some(sub_msg)) => format!("{} - {}", msg, sub_msg),
            (Some(msg), None) => msg.to_string(),
            _ => format!("{} answered without success code", method),
        };
        return Err(PayError::ApiError {
            provider: Provider::Alipay,
            message,
            raw: data,
        });
    }

    let signature = signature.unwrap_or_default();
    if !openapi_rsa2::verify_content(content.get(), &signature, public_key) {
        tracing::warn!(method = method, "alipay response sign verify failed");
        return Err(PayError::SignatureVerificationFailed {
            provider: Provider::Alipay,
            raw: data,
        });
    }
    Ok(data)
}
