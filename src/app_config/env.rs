use std::env;

/// 读取字符串环境变量，若不存在则返回默认值
pub fn env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

/// 读取布尔型环境变量：支持 true/false/1/0（大小写不敏感）
pub fn env_is_true(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v == "1"
        }
        Err(_) => default,
    }
}

/// 读取整型环境变量
pub fn env_int(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

/// 读取浮点型环境变量
pub fn env_float(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(default)
}

/// 优先读取新变量名，不存在时回退到旧变量名（向后兼容）
pub fn env_float_with_fallback(new_key: &str, old_key: &str, default: f64) -> f64 {
    if let Ok(v) = env::var(new_key) {
        if let Ok(parsed) = v.trim().parse::<f64>() {
            return parsed;
        }
    }
    env_float(old_key, default)
}
