// src/utils.rs

use chrono::{SecondsFormat, TimeZone, Utc};

/// 当前 UTC 时间（毫秒）
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// 毫秒时间戳转 RFC3339 字符串（整秒时不输出小数部分）
pub fn rfc3339_ms(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_whole_seconds() {
        assert_eq!(rfc3339_ms(1000), "1970-01-01T00:00:01Z");
    }

    #[test]
    fn test_rfc3339_keeps_millis() {
        assert_eq!(rfc3339_ms(1500), "1970-01-01T00:00:01.500Z");
    }

    #[test]
    fn test_rfc3339_negative_in_range() {
        assert_eq!(rfc3339_ms(-1000), "1969-12-31T23:59:59Z");
    }
}
