use super::error::PayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    #[serde(rename = "alipay")]
    Alipay,
    #[serde(rename = "wechat")]
    Wechat,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlipayChannel {
    #[serde(rename = "app")]
    App,
    #[serde(rename = "pos")]
    Pos,
    #[serde(rename = "scan")]
    Scan,
    #[serde(rename = "transfer")]
    Transfer,
    #[serde(rename = "wap")]
    Wap,
    #[serde(rename = "web")]
    Web,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WechatChannel {
    #[serde(rename = "app")]
    App,
    #[serde(rename = "groupredpack", alias = "group_redpack")]
    GroupRedpack,
    #[serde(rename = "miniapp")]
    Miniapp,
    #[serde(rename = "mp")]
    Mp,
    #[serde(rename = "pos")]
    Pos,
    #[serde(rename = "redpack")]
    Redpack,
    #[serde(rename = "scan")]
    Scan,
    #[serde(rename = "transfer")]
    Transfer,
    #[serde(rename = "wap")]
    Wap,
}

fn parse_name<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, serde_json::Error> {
    let val = serde_json::Value::String(s.trim().to_ascii_lowercase());
    serde_json::from_value::<T>(val)
}

fn name_of<T: Serialize>(val: &T) -> String {
    match serde_json::to_value(val) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

impl FromStr for Provider {
    type Err = PayError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_name(s).map_err(|_| PayError::UnknownGateway(s.to_string()))
    }
}

impl FromStr for AlipayChannel {
    type Err = PayError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        resolve(Provider::Alipay, s).and_then(|c| match c {
            Channel::Alipay(c) => Ok(c),
            Channel::Wechat(_) => Err(invalid_type(Provider::Alipay, s)),
        })
    }
}

impl FromStr for WechatChannel {
    type Err = PayError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        resolve(Provider::Wechat, s).and_then(|c| match c {
            Channel::Wechat(c) => Ok(c),
            Channel::Alipay(_) => Err(invalid_type(Provider::Wechat, s)),
        })
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&name_of(self))
    }
}

impl fmt::Display for AlipayChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&name_of(self))
    }
}

impl fmt::Display for WechatChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&name_of(self))
    }
}

/// A channel tagged with the provider it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Alipay(AlipayChannel),
    Wechat(WechatChannel),
}

impl Channel {
    pub fn provider(&self) -> Provider {
        match self {
            Channel::Alipay(_) => Provider::Alipay,
            Channel::Wechat(_) => Provider::Wechat,
        }
    }
}

fn invalid_type(provider: Provider, channel: &str) -> PayError {
    PayError::InvalidGatewayType {
        gateway: format!("{}.{}", provider, channel),
        provider,
    }
}

/**
 * 根据 provider + channel 名字找到对应的渠道
 * 名字完全不认识 => UnknownGateway
 * 名字属于另一个 provider (比如 alipay.redpack) => InvalidGatewayType
 */
pub fn resolve(provider: Provider, channel: &str) -> Result<Channel, PayError> {
    let own = match provider {
        Provider::Alipay => parse_name::<AlipayChannel>(channel).ok().map(Channel::Alipay),
        Provider::Wechat => parse_name::<WechatChannel>(channel).ok().map(Channel::Wechat),
    };
    if let Some(c) = own {
        return Ok(c);
    }
    let foreign = match provider {
        Provider::Alipay => parse_name::<WechatChannel>(channel).is_ok(),
        Provider::Wechat => parse_name::<AlipayChannel>(channel).is_ok(),
    };
    if foreign {
        return Err(invalid_type(provider, channel));
    }
    Err(PayError::UnknownGateway(format!("{}.{}", provider, channel)))
}
