use crate::core::{AlipayChannel, Params, PayError, Payload};
use serde_json::Value;

/// How a signed payment payload reaches the payer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Signed query string handed to the client sdk.
    Query,
    /// Auto-submitting html form posted to the gateway.
    Form,
    /// Server to server call, the verified answer is returned.
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub method: &'static str,
    pub product_code: Option<&'static str>,
    pub extra: &'static [(&'static str, &'static str)],
    pub delivery: Delivery,
}

pub fn descriptor(channel: AlipayChannel) -> ChannelDescriptor {
    match channel {
        AlipayChannel::App => ChannelDescriptor {
            method: "alipay.trade.app.pay",
            product_code: Some("QUICK_MSECURITY_PAY"),
            extra: &[],
            delivery: Delivery::Query,
        },
        AlipayChannel::Web => ChannelDescriptor {
            method: "alipay.trade.page.pay",
            product_code: Some("FAST_INSTANT_TRADE_PAY"),
            extra: &[],
            delivery: Delivery::Form,
        },
        AlipayChannel::Wap => ChannelDescriptor {
            method: "alipay.trade.wap.pay",
            product_code: Some("QUICK_WAP_WAY"),
            extra: &[],
            delivery: Delivery::Form,
        },
        AlipayChannel::Pos => ChannelDescriptor {
            method: "alipay.trade.pay",
            product_code: Some("FACE_TO_FACE_PAYMENT"),
            extra: &[("scene", "bar_code")],
            delivery: Delivery::Api,
        },
        AlipayChannel::Scan => ChannelDescriptor {
            method: "alipay.trade.precreate",
            product_code: None,
            extra: &[],
            delivery: Delivery::Api,
        },
        AlipayChannel::Transfer => ChannelDescriptor {
            method: "alipay.fund.trans.toaccount.transfer",
            product_code: None,
            extra: &[],
            delivery: Delivery::Api,
        },
    }
}

/**
 * 在公共参数上设置 method, 把订单参数和渠道固定字段合并成 biz_content
 * 渠道固定字段覆盖调用方传入的同名字段
 * 服务商模式 (配置了 pid) 且调用方没有传 extend_params 时补上 sys_service_provider_id
 */
pub fn build(
    channel: AlipayChannel,
    mut base: Payload,
    params: &Params,
    pid: Option<&str>,
) -> Result<Payload, PayError> {
    let descriptor = descriptor(channel);
    let mut biz_content = params.clone();
    if let Some(product_code) = descriptor.product_code {
        biz_content.insert("product_code".into(), Value::String(product_code.into()));
    }
    for (k, v) in descriptor.extra {
        biz_content.insert(k.to_string(), Value::String(v.to_string()));
    }
    if let Some(pid) = pid.filter(|pid| !pid.is_empty()) {
        if !biz_content.contains_key("extend_params") {
            biz_content.insert(
                "extend_params".into(),
                serde_json::json!({ "sys_service_provider_id": pid }),
            );
        }
    }
    let biz_content = serde_json::to_string(&biz_content)
        .map_err(|e| PayError::malformed(format!("error serializing biz_content: {}", e), ""))?;

    base.insert("method", descriptor.method);
    base.insert("biz_content", biz_content);
    Ok(base)
}
