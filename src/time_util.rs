use chrono::{DateTime, SecondsFormat, Utc};

/// 当前 UTC 时间
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// 当前毫秒时间戳（交易所签名请求用）
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 时间序列化为 RFC3339 字符串（数据库存储格式，按字典序即按时间排序）
pub fn to_ts_string(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 从 RFC3339 字符串解析，失败时回退到 Unix 纪元
pub fn parse_ts_string(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// 人类可读的时间差，如 "2h ago"
pub fn human_time_ago(now: DateTime<Utc>, t: DateTime<Utc>) -> String {
    let d = now.signed_duration_since(t);
    if d.num_minutes() < 1 {
        "just now".to_string()
    } else if d.num_hours() < 1 {
        format!("{}m ago", d.num_minutes())
    } else if d.num_hours() < 24 {
        format!("{}h ago", d.num_hours())
    } else {
        format!("{}d ago", d.num_hours() / 24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_ts_roundtrip() {
        let now = now_utc();
        let s = to_ts_string(now);
        assert_eq!(parse_ts_string(&s), now);
    }

    #[test]
    fn test_ts_string_sort_order() {
        let t1 = now_utc();
        let t2 = t1 + Duration::seconds(1);
        assert!(to_ts_string(t1) < to_ts_string(t2));
    }

    #[test]
    fn test_human_time_ago() {
        let now = now_utc();
        assert_eq!(human_time_ago(now, now), "just now");
        assert_eq!(human_time_ago(now, now - Duration::minutes(5)), "5m ago");
        assert_eq!(human_time_ago(now, now - Duration::hours(2)), "2h ago");
        assert_eq!(human_time_ago(now, now - Duration::days(3)), "3d ago");
    }
}
