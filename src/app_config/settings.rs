use crate::app_config::env::{
    env_float, env_float_with_fallback, env_int, env_is_true, env_or_default,
};

/// 运行时配置，全部来自环境变量（.env 自动加载），每项都有默认值
#[derive(Debug, Clone)]
pub struct Config {
    pub http_addr: String,
    pub sqlite_dsn: String,
    pub request_timeout_sec: u64,

    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_base_url: String,

    pub crypto_panic_api_key: String,
    pub lunar_crush_api_key: String,

    pub exchange_base_url: String,
    pub futures_base_url: String,
    pub exchange_api_key: String,
    pub exchange_secret_key: String,

    /// 单笔最大下单金额上限
    pub max_single_stake_usdt: f64,
    pub max_daily_loss_usdt: f64,
    pub max_exposure_usdt: f64,
    pub min_confidence: f64,

    pub dry_run: bool,

    /// 交易模式: "spot"（现货）或 "futures"（永续合约）
    pub trading_mode: String,
    pub futures_leverage: i32,
    /// "CROSSED" 或 "ISOLATED"
    pub futures_margin_type: String,

    /// 定时任务
    pub auto_run_enabled: bool,
    pub auto_run_interval_sec: u64,
    pub auto_run_pairs: String,

    /// LLM 认证配置: "api_key" / "oauth" / "auto"
    pub llm_auth_mode: String,
    pub llm_auth_provider: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            http_addr: env_or_default("HTTP_ADDR", ":8080"),
            sqlite_dsn: env_or_default("SQLITE_DSN", "sqlite://./ai_quant.db"),
            request_timeout_sec: env_int("REQUEST_TIMEOUT_SEC", 15) as u64,

            llm_api_key: env_or_default("LLM_API_KEY", ""),
            llm_model: env_or_default("LLM_MODEL", "gpt-4o-mini"),
            llm_base_url: env_or_default("LLM_BASE_URL", ""),

            crypto_panic_api_key: env_or_default("CRYPTOPANIC_API_KEY", ""),
            lunar_crush_api_key: env_or_default("LUNARCRUSH_API_KEY", ""),

            exchange_base_url: env_or_default("EXCHANGE_BASE_URL", "https://api.binance.com"),
            futures_base_url: env_or_default("FUTURES_BASE_URL", "https://fapi.binance.com"),
            exchange_api_key: env_or_default("EXCHANGE_API_KEY", ""),
            exchange_secret_key: env_or_default("EXCHANGE_SECRET_KEY", ""),

            max_single_stake_usdt: env_float_with_fallback(
                "MAX_SINGLE_STAKE_USDT",
                "DEFAULT_STAKE_USDT",
                50.0,
            ),
            max_daily_loss_usdt: env_float("MAX_DAILY_LOSS_USDT", 100.0),
            max_exposure_usdt: env_float("MAX_EXPOSURE_USDT", 200.0),
            min_confidence: env_float("MIN_CONFIDENCE", 0.55),

            dry_run: env_is_true("DRY_RUN", true),

            trading_mode: env_or_default("TRADING_MODE", "spot"),
            futures_leverage: env_int("FUTURES_LEVERAGE", 3) as i32,
            futures_margin_type: env_or_default("FUTURES_MARGIN_TYPE", "CROSSED"),

            auto_run_enabled: env_is_true("AUTO_RUN_ENABLED", false),
            auto_run_interval_sec: env_int("AUTO_RUN_INTERVAL_SEC", 60) as u64,
            auto_run_pairs: env_or_default("AUTO_RUN_PAIRS", "BTC/USDT"),

            llm_auth_mode: env_or_default("LLM_AUTH_MODE", "auto"),
            llm_auth_provider: env_or_default("LLM_AUTH_PROVIDER", "openai"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: ":8080".to_string(),
            sqlite_dsn: "sqlite://./ai_quant.db".to_string(),
            request_timeout_sec: 15,
            llm_api_key: String::new(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_base_url: String::new(),
            crypto_panic_api_key: String::new(),
            lunar_crush_api_key: String::new(),
            exchange_base_url: "https://api.binance.com".to_string(),
            futures_base_url: "https://fapi.binance.com".to_string(),
            exchange_api_key: String::new(),
            exchange_secret_key: String::new(),
            max_single_stake_usdt: 50.0,
            max_daily_loss_usdt: 100.0,
            max_exposure_usdt: 200.0,
            min_confidence: 0.55,
            dry_run: true,
            trading_mode: "spot".to_string(),
            futures_leverage: 3,
            futures_margin_type: "CROSSED".to_string(),
            auto_run_enabled: false,
            auto_run_interval_sec: 60,
            auto_run_pairs: "BTC/USDT".to_string(),
            llm_auth_mode: "auto".to_string(),
            llm_auth_provider: "openai".to_string(),
        }
    }
}
