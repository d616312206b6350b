use super::error::PayError;
use super::payload::Payload;
use encoding_rs::Encoding;
use percent_encoding::{percent_decode, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use quick_xml::events::Event;

/// application/x-www-form-urlencoded 保留字符, 与 http_build_query 一致
const FORM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'*');

pub fn encode_form(payload: &Payload) -> String {
    payload
        .iter()
        .map(|(k, v)| format!("{}={}", form_escape(k), form_escape(v)))
        .collect::<Vec<String>>()
        .join("&")
}

/// Form encodes a single component, space becomes `+`.
pub fn form_escape(s: &str) -> String {
    utf8_percent_encode(s, FORM).to_string().replace("%20", "+")
}

pub fn decode_form(form: &str) -> Result<Payload, PayError> {
    decode_form_bytes(form.as_bytes(), Some("utf-8"))
}

/**
 * convert key1=value1&key2=value2 to Payload
 * 先把 x-www-form-urlencoded 数据中的 + 还原为空格, 再做 percent decode,
 * 不然 decode 完了以后会出现新的 + 号 (比如 sign 里面, 那里的加号需要保留)
 * charset 为 None 时使用 payload 自己声明的 charset 字段, 都没有就按 utf-8 处理
 */
pub fn decode_form_bytes(form: &[u8], charset: Option<&str>) -> Result<Payload, PayError> {
    let pairs = form
        .split(|b| *b == b'&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = match pair.iter().position(|b| *b == b'=') {
                Some(idx) => (&pair[..idx], &pair[idx + 1..]),
                None => (pair, &pair[pair.len()..]),
            };
            (form_unescape(k), form_unescape(v))
        })
        .collect::<Vec<(Vec<u8>, Vec<u8>)>>();

    let declared = pairs
        .iter()
        .find(|(k, _)| k.as_slice() == b"charset")
        .and_then(|(_, v)| std::str::from_utf8(v).ok())
        .map(str::to_string);
    let charset = match (charset, declared.as_deref()) {
        (Some(c), _) => c,
        (None, Some(c)) if !c.is_empty() => c,
        _ => "utf-8",
    };

    let mut payload = Payload::new();
    for (k, v) in pairs {
        let k = to_utf8_string(&k, charset, form)?;
        let v = to_utf8_string(&v, charset, form)?;
        payload.insert(k, v);
    }
    Ok(payload)
}

fn form_unescape(bytes: &[u8]) -> Vec<u8> {
    let bytes: Vec<u8> = bytes
        .iter()
        .map(|b| if *b == b'+' { b' ' } else { *b })
        .collect();
    percent_decode(&bytes).collect()
}

fn to_utf8_string(bytes: &[u8], charset: &str, raw: &[u8]) -> Result<String, PayError> {
    let bytes = transcode(bytes, charset, "utf-8")?;
    String::from_utf8(bytes).map_err(|e| {
        PayError::malformed(
            format!("invalid utf-8 in form payload: {}", e),
            String::from_utf8_lossy(raw),
        )
    })
}

/// Converts bytes between two charsets, labels follow the WHATWG encoding standard (gbk, gb2312, utf-8 ...).
pub fn transcode(bytes: &[u8], from: &str, to: &str) -> Result<Vec<u8>, PayError> {
    let lookup = |label: &str| {
        Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
            PayError::malformed(
                format!("unknown charset: {}", label),
                String::from_utf8_lossy(bytes),
            )
        })
    };
    let from = lookup(from)?;
    let to = lookup(to)?;
    if from == to {
        return Ok(bytes.to_vec());
    }
    let (text, had_errors) = from.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(PayError::malformed(
            format!("bytes are not valid {}", from.name()),
            String::from_utf8_lossy(bytes),
        ));
    }
    let (out, _, had_errors) = to.encode(&text);
    if had_errors {
        return Err(PayError::malformed(
            format!("text can't be represented in {}", to.name()),
            text.into_owned(),
        ));
    }
    Ok(out.into_owned())
}

/**
 * 微信要求所有字段放在 <xml> 下面, 数字直接输出, 其他值放进 CDATA
 * 值里如果出现 "]]>" 需要拆成两段 CDATA, 不然会提前结束
 */
pub fn encode_xml(payload: &Payload) -> String {
    let mut xml = String::from("<xml>");
    for (k, v) in payload.iter() {
        if is_numeric(v) {
            xml.push_str(&format!("<{k}>{v}</{k}>"));
        } else {
            let v = v.replace("]]>", "]]]]><![CDATA[>");
            xml.push_str(&format!("<{k}><![CDATA[{v}]]></{k}>"));
        }
    }
    xml.push_str("</xml>");
    xml
}

fn is_numeric(v: &str) -> bool {
    !v.is_empty()
        && v.bytes().all(|b| b.is_ascii_digit() || b"+-.eE".contains(&b))
        && v.bytes().any(|b| b.is_ascii_digit())
        && v.parse::<f64>().is_ok()
}

pub fn decode_xml(xml: &str) -> Result<Payload, PayError> {
    let malformed = |reason: String| PayError::malformed(reason, xml);

    let mut payload = Payload::new();
    let mut parser = quick_xml::Reader::from_str(xml);
    parser.config_mut().trim_text(true);
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut field: Option<(String, String)> = None;
    loop {
        match parser.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth == 1 {
                    if seen_root {
                        return Err(malformed("multiple root elements".into()));
                    }
                    seen_root = true;
                } else if depth == 2 {
                    let key = std::str::from_utf8(e.name().as_ref())
                        .map_err(|e| malformed(format!("invalid element name: {}", e)))?
                        .to_string();
                    field = Some((key, String::new()));
                }
            }
            Ok(Event::Empty(e)) => {
                if depth == 0 {
                    if seen_root {
                        return Err(malformed("multiple root elements".into()));
                    }
                    seen_root = true;
                } else if depth == 1 {
                    let key = std::str::from_utf8(e.name().as_ref())
                        .map_err(|e| malformed(format!("invalid element name: {}", e)))?
                        .to_string();
                    payload.insert(key, "");
                }
            }
            Ok(Event::Text(text)) => {
                if depth == 0 {
                    return Err(malformed("text outside of root element".into()));
                }
                let text = text
                    .unescape()
                    .map_err(|e| malformed(format!("error unescaping text: {}", e)))?;
                if let Some((_, value)) = field.as_mut() {
                    value.push_str(&text);
                }
            }
            Ok(Event::CData(cdata)) => {
                if depth == 0 {
                    return Err(malformed("cdata outside of root element".into()));
                }
                let text = String::from_utf8(cdata.into_inner().into_owned())
                    .map_err(|e| malformed(format!("invalid utf-8 in cdata: {}", e)))?;
                if let Some((_, value)) = field.as_mut() {
                    value.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    return Err(malformed("unexpected closing tag".into()));
                }
                if depth == 2 {
                    if let Some((key, value)) = field.take() {
                        payload.insert(key, value);
                    }
                }
                depth -= 1;
            }
            Ok(Event::DocType(_)) => {
                return Err(malformed("doctype is not allowed".into()));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(format!("error parsing xml: {}", e))),
        }
    }
    if !seen_root || depth != 0 {
        return Err(malformed("incomplete xml document".into()));
    }
    Ok(payload)
}

/// Charset named by an xml declaration, e.g. `<?xml version="1.0" encoding="GBK"?>`.
pub fn xml_declared_charset(xml: &[u8]) -> Option<String> {
    let xml = String::from_utf8_lossy(xml);
    let xml = xml.trim_start();
    if !xml.starts_with("<?xml") {
        return None;
    }
    let decl = &xml[..xml.find("?>")?];
    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    Some(rest[..rest.find(quote)?].to_string())
}
