pub mod alipay;
pub mod config;
pub mod core;
pub mod logging;
mod pay;
pub mod utils;
pub mod weixin;

pub use crate::alipay::{Alipay, AlipayConfig};
pub use crate::config::{LogConfig, PayConfig};
pub use crate::core::{
    GatewayApplication, InboundRequest, OrderRef, Params, PayError, PayResponse, Payload,
    Provider, Reply, RequestOrigin, Verification,
};
pub use crate::pay::Pay;
pub use crate::weixin::{Wechat, WechatConfig};
