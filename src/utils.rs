use rand::Rng;

const NONCE_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// 32 位随机字符串, 微信的 nonce_str / noncestr / nonceStr
pub fn nonce_str() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| NONCE_CHARSET[rng.gen_range(0..NONCE_CHARSET.len())] as char)
        .collect()
}

/// 支付宝要求的 timestamp, 北京时间 yyyy-MM-dd HH:mm:ss
pub fn alipay_timestamp() -> String {
    let now = chrono::Utc::now();
    match chrono::FixedOffset::east_opt(8 * 3600) {
        Some(tz) => now.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => now.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

/// unix 时间戳 (秒), 微信二次签名时使用
pub fn unix_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}
