use crate::core::codec;
use crate::core::{
    ClientIdentity, PayError, Payload, Provider, Transport, TransportError, TransportRequest,
};

pub mod v2api_md5 {
    use super::*;
    use openssl::{hash::MessageDigest, pkey::PKey, sign::Signer};

    /**
     * https://pay.weixin.qq.com/wiki/doc/api/jsapi.php?chapter=4_3
     * 除 sign 以外的字段都参与签名 (空值也参与), 按 key 排序后拼上 &key=商户密钥
     */
    pub fn sign_source(payload: &Payload, sign_key: &str) -> String {
        let query_list = payload
            .iter()
            .filter(|(k, _)| *k != "sign")
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<String>>();
        format!("{}&key={}", query_list.join("&"), sign_key)
    }

    /// MD5 by default, HMAC-SHA256 when the payload declares `sign_type=HMAC-SHA256`.
    pub fn sign(payload: &Payload, sign_key: &str) -> Result<String, PayError> {
        sign_as(payload, sign_key, payload.get("sign_type"))
    }

    /// Signs with an explicit `sign_type`, answers never carry their own.
    pub fn sign_as(
        payload: &Payload,
        sign_key: &str,
        sign_type: Option<&str>,
    ) -> Result<String, PayError> {
        let sign_sorted_source = sign_source(payload, sign_key);
        tracing::debug!(sign_source = %sign_sorted_source, sign_type = ?sign_type, "wechat sign");
        if sign_type == Some("HMAC-SHA256") {
            let key = PKey::hmac(sign_key.as_bytes())?;
            let mut signer = Signer::new(MessageDigest::sha256(), &key)?;
            signer.update(sign_sorted_source.as_bytes())?;
            return Ok(data_encoding::HEXUPPER.encode(&signer.sign_to_vec()?));
        }
        let signature = md5::compute(sign_sorted_source.as_bytes());
        Ok(format!("{:x}", signature).to_uppercase())
    }

    pub fn verify(payload: &Payload, sign_key: &str) -> bool {
        verify_as(payload, sign_key, payload.get("sign_type"))
    }

    pub fn verify_as(payload: &Payload, sign_key: &str, sign_type: Option<&str>) -> bool {
        match (payload.get("sign"), sign_as(payload, sign_key, sign_type)) {
            (Some(signature), Ok(expected)) => signature == expected,
            _ => false,
        }
    }
}

/// Answers of these endpoints carry no `sign`.
fn is_unsigned_endpoint(endpoint: &str) -> bool {
    endpoint.starts_with("mmpaymkttransfers/")
}

/**
 * 发送已签名的 payload 并解析 xml 返回
 * return_code 和 result_code 都是 SUCCESS 才算成功, 之后再校验返回的 sign
 * 返回里没有 sign_type, 按请求的 sign_type 验签
 */
pub async fn request_api(
    transport: &dyn Transport,
    base_url: &str,
    endpoint: &str,
    payload: &Payload,
    sign_key: &str,
    identity: Option<&ClientIdentity>,
) -> Result<Payload, PayError> {
    let url = format!("{}{}", base_url, endpoint);
    tracing::debug!(url = %url, mutual_tls = identity.is_some(), "request wechat api");

    let res = transport
        .invoke(TransportRequest {
            url: &url,
            body: codec::encode_xml(payload),
            content_type: "text/xml; charset=utf-8",
            identity,
        })
        .await
        .map_err(|e| {
            tracing::error!(url = %url, "wechat api transport failure: {}", e);
            PayError::TransportFailure {
                endpoint: url.clone(),
                shape: endpoint.to_string(),
                source: e,
            }
        })?;
    let malformed_body = |reason: String| PayError::TransportFailure {
        endpoint: url.clone(),
        shape: endpoint.to_string(),
        source: TransportError::MalformedBody(reason),
    };
    let charset = codec::xml_declared_charset(&res).unwrap_or_else(|| "utf-8".to_string());
    let res = codec::transcode(&res, &charset, "utf-8").map_err(|e| malformed_body(e.to_string()))?;
    let res_text = String::from_utf8(res)
        .map_err(|e| malformed_body(format!("wechat response is not utf-8: {}", e)))?;
    tracing::debug!("{} response: {:?}", endpoint, res_text);

    let data = codec::decode_xml(&res_text).map_err(|e| malformed_body(e.to_string()))?;
    check_response(endpoint, data, sign_key, payload.get("sign_type"))
}

pub(crate) fn check_response(
    endpoint: &str,
    data: Payload,
    sign_key: &str,
    sign_type: Option<&str>,
) -> Result<Payload, PayError> {
    if data.get("return_code") != Some("SUCCESS") || data.get("result_code") != Some("SUCCESS") {
        let message = [data.get("return_msg"), data.get("err_code_des")]
            .into_iter()
            .flatten()
            .filter(|m| !m.is_empty())
            .collect::<Vec<&str>>()
            .join(" ");
        let message = if message.is_empty() {
            format!("{} answered without SUCCESS", endpoint)
        } else {
            message
        };
        return Err(PayError::ApiError {
            provider: Provider::Wechat,
            message,
            raw: data,
        });
    }

    if !is_unsigned_endpoint(endpoint) && !v2api_md5::verify_as(&data, sign_key, sign_type) {
        tracing::warn!(endpoint = endpoint, "wechat response sign verify failed");
        return Err(PayError::SignatureVerificationFailed {
            provider: Provider::Wechat,
            raw: data,
        });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "192006250b4c09247ec02edce69f6a2d";

    fn sample() -> Payload {
        [
            ("appid", "wxd930ea5d5a258f4f"),
            ("mch_id", "10000100"),
            ("device_info", "1000"),
            ("body", "test"),
            ("nonce_str", "ibuaiVcKdpRxkhJA"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_md5_sign_matches_documented_example() {
        // https://pay.weixin.qq.com/wiki/doc/api/jsapi.php?chapter=4_3
        let payload = sample();
        assert_eq!(
            v2api_md5::sign_source(&payload, KEY),
            "appid=wxd930ea5d5a258f4f&body=test&device_info=1000&mch_id=10000100&nonce_str=ibuaiVcKdpRxkhJA&key=192006250b4c09247ec02edce69f6a2d"
        );
        assert_eq!(
            v2api_md5::sign(&payload, KEY).unwrap(),
            "9A0A8659F005D6984697E2CA0A9CF3B7"
        );
    }

    #[test]
    fn test_hmac_sha256_sign() {
        let mut payload = sample();
        payload.insert("sign_type", "HMAC-SHA256");
        let sign = v2api_md5::sign(&payload, KEY).unwrap();
        assert_eq!(sign.len(), 64);
        assert!(sign.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_ne!(sign, v2api_md5::sign(&sample(), KEY).unwrap());

        payload.insert("sign", sign);
        assert!(v2api_md5::verify(&payload, KEY));
    }

    #[test]
    fn test_hmac_answer_checked_with_request_sign_type() {
        let mut answer: Payload = [
            ("return_code", "SUCCESS"),
            ("result_code", "SUCCESS"),
            ("prepay_id", "wx2017"),
        ]
        .into_iter()
        .collect();
        let sign = v2api_md5::sign_as(&answer, KEY, Some("HMAC-SHA256")).unwrap();
        answer.insert("sign", sign);
        assert!(!v2api_md5::verify(&answer, KEY));
        assert!(v2api_md5::verify_as(&answer, KEY, Some("HMAC-SHA256")));
        assert!(check_response("pay/unifiedorder", answer.clone(), KEY, Some("HMAC-SHA256")).is_ok());
        assert!(matches!(
            check_response("pay/unifiedorder", answer, KEY, None),
            Err(PayError::SignatureVerificationFailed { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_tampering_and_missing_sign() {
        let mut payload = sample();
        assert!(!v2api_md5::verify(&payload, KEY));

        payload.insert("sign", v2api_md5::sign(&payload, KEY).unwrap());
        assert!(v2api_md5::verify(&payload, KEY));
        assert!(!v2api_md5::verify(&payload, "another key"));

        let mut tampered = payload.clone();
        tampered.insert("body", "tesT");
        assert!(!v2api_md5::verify(&tampered, KEY));

        // 空值也参与签名
        let mut with_empty = payload.clone();
        with_empty.insert("attach", "");
        assert!(!v2api_md5::verify(&with_empty, KEY));
    }

    #[test]
    fn test_check_response() {
        let mut ok: Payload = [
            ("return_code", "SUCCESS"),
            ("result_code", "SUCCESS"),
            ("prepay_id", "wx201410272009395522657a690389285100"),
        ]
        .into_iter()
        .collect();
        ok.insert("sign", v2api_md5::sign(&ok, KEY).unwrap());
        assert!(check_response("pay/unifiedorder", ok.clone(), KEY, None).is_ok());

        let mut forged = ok.clone();
        forged.insert("prepay_id", "wx0");
        assert!(matches!(
            check_response("pay/unifiedorder", forged.clone(), KEY, None),
            Err(PayError::SignatureVerificationFailed { .. })
        ));
        assert!(check_response("mmpaymkttransfers/sendredpack", forged, KEY, None).is_ok());

        let failed: Payload = [
            ("return_code", "SUCCESS"),
            ("return_msg", "OK"),
            ("result_code", "FAIL"),
            ("err_code_des", "订单已关闭"),
        ]
        .into_iter()
        .collect();
        match check_response("pay/orderquery", failed, KEY, None) {
            Err(PayError::ApiError { message, raw, .. }) => {
                assert_eq!(message, "OK 订单已关闭");
                assert_eq!(raw.get("result_code"), Some("FAIL"));
            }
            r => panic!("unexpected result {:?}", r),
        }
    }
}
