use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caller supplied order intent, e.g. `{"out_trade_no": "T1", "total_amount": "10.00"}`.
pub type Params = serde_json::Map<String, serde_json::Value>;

/**
 * 一次请求或响应的字段集合
 * key 按字节序排列, 签名时直接按这个顺序拼接即可, builder 不需要关心插入顺序
 * 嵌套结构 (比如 biz_content) 以序列化后的 json 字符串保存, 签名只作用于这个字符串
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, String>);

impl Payload {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merges caller params on top of the current fields, later values win.
    pub fn merge(&mut self, params: &Params) {
        for (k, v) in params {
            self.0.insert(k.clone(), value_to_string(v));
        }
    }

    pub fn from_params(params: &Params) -> Self {
        let mut payload = Self::new();
        payload.merge(params);
        payload
    }

    /// Drops every field whose value is empty.
    pub fn retain_non_empty(&mut self) {
        self.0.retain(|_, v| !v.is_empty());
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

/// Textual form of a json value: strings verbatim, null as empty, everything else serialized.
pub fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Payload {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
