use super::v2api::v2api_md5;
use super::WechatConfig;
use crate::core::{PayError, Payload, RequestOrigin, WechatChannel};

/// What happens with the answer of the first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// The verified answer is handed back as is.
    Collection,
    /// prepay_id => signed APP client payload.
    App,
    /// prepay_id => signed JSAPI client payload (mp, miniapp).
    Jsapi,
    /// mweb_url => redirect.
    Wap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPlan {
    pub endpoint: &'static str,
    pub payload: Payload,
    pub mutual_tls: bool,
    pub finish: Finish,
}

impl ChannelPlan {
    fn new(endpoint: &'static str, payload: Payload, finish: Finish) -> Self {
        Self {
            endpoint,
            payload,
            mutual_tls: false,
            finish,
        }
    }

    fn with_mutual_tls(mut self) -> Self {
        self.mutual_tls = true;
        self
    }
}

const UNIFIED_ORDER: &str = "pay/unifiedorder";

/**
 * payload 是公共参数合并了调用方参数之后的结果, 渠道在此基础上做最后的修改
 * 修改后的字段覆盖调用方传入的同名字段
 */
pub fn build(
    channel: WechatChannel,
    mut payload: Payload,
    config: &WechatConfig,
    origin: &RequestOrigin,
) -> Result<ChannelPlan, PayError> {
    let plan = match channel {
        WechatChannel::App => {
            payload.insert("appid", config.appid.as_str());
            payload.insert("trade_type", "APP");
            if config.is_service() {
                payload.insert("sub_appid", config.sub_appid.as_str());
            }
            ChannelPlan::new(UNIFIED_ORDER, payload, Finish::App)
        }
        WechatChannel::Mp => mp(payload),
        WechatChannel::Miniapp => {
            payload.insert("appid", config.miniapp_id.as_str());
            if config.is_service() {
                payload.insert("sub_appid", config.sub_miniapp_id.as_str());
            }
            mp(payload)
        }
        WechatChannel::Scan => {
            payload.insert("trade_type", "NATIVE");
            ChannelPlan::new(UNIFIED_ORDER, payload, Finish::Collection)
        }
        WechatChannel::Wap => {
            payload.insert("trade_type", "MWEB");
            ChannelPlan::new(UNIFIED_ORDER, payload, Finish::Wap)
        }
        WechatChannel::Pos => {
            payload.remove("trade_type");
            payload.remove("notify_url");
            ChannelPlan::new("pay/micropay", payload, Finish::Collection)
        }
        WechatChannel::Redpack => {
            redpack(&mut payload, config);
            if let Some(server_ip) = origin.server_ip.as_deref() {
                payload.insert("client_ip", server_ip);
            }
            ChannelPlan::new("mmpaymkttransfers/sendredpack", payload, Finish::Collection)
                .with_mutual_tls()
        }
        WechatChannel::GroupRedpack => {
            redpack(&mut payload, config);
            payload.insert("amt_type", "ALL_RAND");
            ChannelPlan::new(
                "mmpaymkttransfers/sendgroupredpack",
                payload,
                Finish::Collection,
            )
            .with_mutual_tls()
        }
        WechatChannel::Transfer => {
            let appid = payload.remove("appid").unwrap_or_default();
            let mch_id = payload.remove("mch_id").unwrap_or_default();
            payload.insert("mch_appid", appid);
            payload.insert("mchid", mch_id);
            if let Some(server_ip) = origin.server_ip.as_deref() {
                payload.insert("spbill_create_ip", server_ip);
            }
            payload.remove("trade_type");
            payload.remove("notify_url");
            ChannelPlan::new(
                "mmpaymkttransfers/promotion/transfers",
                payload,
                Finish::Collection,
            )
            .with_mutual_tls()
        }
    };
    tracing::debug!(channel = %channel, endpoint = plan.endpoint, "wechat channel plan built");
    Ok(plan)
}

fn mp(mut payload: Payload) -> ChannelPlan {
    payload.insert("trade_type", "JSAPI");
    ChannelPlan::new(UNIFIED_ORDER, payload, Finish::Jsapi)
}

fn redpack(payload: &mut Payload, config: &WechatConfig) {
    let appid = payload.remove("appid").unwrap_or_default();
    if config.is_service() {
        payload.insert("msgappid", appid.as_str());
    }
    payload.insert("wxappid", appid);
    payload.remove("trade_type");
    payload.remove("notify_url");
    payload.remove("spbill_create_ip");
}

/**
 * APP 调起支付的参数, 使用预下单返回的 prepay_id 重新签名
 * https://pay.weixin.qq.com/wiki/doc/api/app/app.php?chapter=9_12
 */
pub fn app_pay_request(
    pre_order: &Payload,
    prepay_id: &str,
    config: &WechatConfig,
) -> Result<Payload, PayError> {
    let partnerid = if config.is_service() {
        pre_order.get("sub_mch_id")
    } else {
        pre_order.get("mch_id")
    };
    let mut pay_request = Payload::new();
    pay_request.insert("appid", pre_order.get("appid").unwrap_or_default());
    pay_request.insert("partnerid", partnerid.unwrap_or_default());
    pay_request.insert("prepayid", prepay_id);
    pay_request.insert("timestamp", crate::utils::unix_timestamp());
    pay_request.insert("noncestr", crate::utils::nonce_str());
    pay_request.insert("package", "Sign=WXPay");
    let sign = v2api_md5::sign(&pay_request, &config.key)?;
    pay_request.insert("sign", sign);
    Ok(pay_request)
}

/**
 * 公众号 / 小程序 调起支付的参数, 签名放在 paySign
 * https://pay.weixin.qq.com/wiki/doc/api/jsapi.php?chapter=7_7&index=6
 */
pub fn jsapi_pay_request(
    pre_order: &Payload,
    prepay_id: &str,
    config: &WechatConfig,
) -> Result<Payload, PayError> {
    let mut pay_request = Payload::new();
    pay_request.insert("appId", pre_order.get("appid").unwrap_or_default());
    pay_request.insert("timeStamp", crate::utils::unix_timestamp());
    pay_request.insert("nonceStr", crate::utils::nonce_str());
    pay_request.insert("package", format!("prepay_id={}", prepay_id));
    pay_request.insert("signType", "MD5");
    let pay_sign = v2api_md5::sign(&pay_request, &config.key)?;
    pay_request.insert("paySign", pay_sign);
    Ok(pay_request)
}
