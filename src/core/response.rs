use super::payload::Payload;
use serde::Serialize;

/// What a `pay` call hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PayResponse {
    /// Signed query string for a client sdk (alipay app).
    Query(String),
    /// Auto-submitting html form (alipay web / wap).
    Html(String),
    /// Signed parameters for a client sdk (wechat app).
    Json(serde_json::Value),
    /// Url the payer should be redirected to (wechat wap).
    Redirect(String),
    /// Parsed server answer or client parameters (pos, scan, transfer, mp ...).
    Collection(Payload),
}

impl PayResponse {
    pub fn into_reply(self) -> Reply {
        match self {
            PayResponse::Query(body) => Reply::new("text/plain; charset=utf-8", body),
            PayResponse::Html(body) => Reply::new("text/html; charset=utf-8", body),
            PayResponse::Json(value) => Reply::new("application/json", value.to_string()),
            PayResponse::Redirect(location) => Reply {
                status: 302,
                content_type: "text/plain; charset=utf-8",
                location: Some(location),
                body: String::new(),
            },
            PayResponse::Collection(payload) => {
                Reply::new("application/json", payload.to_json().to_string())
            }
        }
    }
}

/// A ready to send http response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub body: String,
}

impl Reply {
    pub fn new(content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type,
            location: None,
            body: body.into(),
        }
    }
}
