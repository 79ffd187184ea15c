use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app_config::Config;
use crate::auth::LlmAuthManager;
use crate::error::AppError;
use crate::time_util;
use crate::trading::domain::{MarketSnapshot, Side, Signal};
use crate::trading::market::prompt::{render_prompt, AccountInfo};
use crate::trading::market::MarketClient;

/// 信号生成输入。账户信息由协调器提供（真实余额与持仓）。
pub struct SignalInput {
    pub cycle_id: String,
    pub pair: String,
    pub snapshot: MarketSnapshot,
    pub account: AccountInfo,
}

#[async_trait]
pub trait SignalAgent: Send + Sync {
    async fn generate(&self, input: SignalInput) -> Result<Signal>;
}

/// 大模型响应的 JSON 契约
#[derive(Debug, Default, Deserialize)]
struct LlmResponse {
    #[serde(default)]
    signal: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    coin: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    thinking: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    justification: String,
    #[serde(default)]
    ttl_seconds: i64,
}

// ==================== 规则引擎 ====================

/// 确定性规则引擎：动量 + 资金费率双条件。
/// 大模型不可用（初始化失败）时作为兜底信号源。
pub struct RuleBasedAgent;

#[async_trait]
impl SignalAgent for RuleBasedAgent {
    async fn generate(&self, input: SignalInput) -> Result<Signal> {
        let mut side = Side::None;
        let mut confidence = 0.5;
        let mut reason = "市场中性，无明确方向".to_string();
        let ttl = 300;

        if input.snapshot.change_24h >= 1.2 && input.snapshot.funding_rate <= 0.01 {
            side = Side::Long;
            confidence = clamp(0.55 + input.snapshot.change_24h.abs() / 25.0, 0.55, 0.9);
            reason = "动量为正且资金费率可接受".to_string();
        }
        if input.snapshot.change_24h <= -1.2 && input.snapshot.funding_rate >= -0.01 {
            side = Side::Short;
            confidence = clamp(0.55 + input.snapshot.change_24h.abs() / 25.0, 0.55, 0.9);
            reason = "动量为负且资金费率可接受".to_string();
        }

        Ok(Signal {
            id: Uuid::new_v4().to_string(),
            cycle_id: input.cycle_id,
            pair: input.pair,
            side,
            confidence,
            reason,
            thinking: String::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            model_name: "rule-based".to_string(),
            ttl_seconds: ttl,
            created_at: time_util::now_utc(),
        })
    }
}

// ==================== 大模型信号 ====================

/// 大模型信号 Agent：拉取全量行情、渲染提示词、调用 OpenAI 兼容接口、解析 JSON 结论。
/// 从提示词构建到模型调用的任何失败都降级为 side=none 的跳过信号。
pub struct LlmAgent {
    http: reqwest::Client,
    base_url: String,
    model: String,
    auth: Arc<LlmAuthManager>,
    market: MarketClient,
    system_prompt: String,
    user_template: String,
    start_time: DateTime<Utc>,
    /// "spot" 或 "futures"
    trading_mode: String,
    leverage: i32,
}

/// 创建信号 Agent。
/// 认证不可用时直接退回规则引擎（与大模型初始化失败同等对待）。
pub fn new_signal_agent(cfg: &Config, auth: Arc<LlmAuthManager>) -> Arc<dyn SignalAgent> {
    if let Err(e) = auth.get_token() {
        warn!("[信号] 获取认证失败: {}，使用规则引擎", e);
        return Arc::new(RuleBasedAgent);
    }

    let status = auth.status();
    info!(
        "[信号] LLM 认证模式={} 提供商={}",
        status["mode"], status["provider"]
    );

    let sys_prompt = load_file("SystemPrompt.md");
    let user_tmpl = load_file("UserPrompt.md");
    info!(
        "[信号] 大模型已就绪 模型={} 系统提示词={}字符 用户模板={}字符",
        cfg.llm_model,
        sys_prompt.len(),
        user_tmpl.len()
    );

    let base_url = if cfg.llm_base_url.trim().is_empty() {
        "https://api.openai.com/v1".to_string()
    } else {
        cfg.llm_base_url.trim_end_matches('/').to_string()
    };

    let leverage = if cfg.trading_mode == "futures" {
        cfg.futures_leverage.max(1)
    } else {
        1
    };

    Arc::new(LlmAgent {
        http: reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_sec.max(30)))
            .build()
            .unwrap_or_default(),
        base_url,
        model: cfg.llm_model.clone(),
        auth,
        market: MarketClient::with_keys(
            cfg.crypto_panic_api_key.clone(),
            cfg.lunar_crush_api_key.clone(),
        ),
        system_prompt: sys_prompt,
        user_template: user_tmpl,
        start_time: time_util::now_utc(),
        trading_mode: cfg.trading_mode.clone(),
        leverage,
    })
}

fn load_file(path: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            warn!("[信号] 加载文件 {} 失败: {}", path, e);
            String::new()
        }
    }
}

#[async_trait]
impl SignalAgent for LlmAgent {
    async fn generate(&self, input: SignalInput) -> Result<Signal> {
        info!("[信号] 正在从 Binance 获取 {} 的行情数据 ...", input.pair);
        let t0 = std::time::Instant::now();
        let user_prompt = match self.build_user_prompt(&input).await {
            Ok(p) => {
                info!(
                    "[信号] 行情数据就绪 (耗时{:?})，提示词长度={}字符",
                    t0.elapsed(),
                    p.len()
                );
                p
            }
            Err(e) => {
                info!(
                    "[信号] Binance 数据获取失败 (耗时{:?}): {}，使用简化提示词",
                    t0.elapsed(),
                    e
                );
                self.build_simple_prompt(&input)
            }
        };

        // 根据交易模式动态调整系统提示词
        let sys_prompt = adapt_system_prompt(&self.system_prompt, &self.trading_mode, self.leverage);
        info!(
            "[信号] 系统提示词已加载 ({}字符) 模式={}",
            sys_prompt.len(),
            self.trading_mode
        );

        info!("[信号] 正在调用大模型 ...");
        let t1 = std::time::Instant::now();
        let (completion, usage) = match self.chat(&sys_prompt, &user_prompt).await {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    "[信号] 大模型调用失败 (耗时{:?}): {} → 降级跳过本轮",
                    t1.elapsed(),
                    e
                );
                return Ok(self.fallback_signal(&input, &format!("大模型调用失败: {}", e)));
            }
        };
        info!(
            "[信号] 大模型响应成功 (耗时{:?})，响应长度={}字符，Token: prompt={} completion={} total={}",
            t1.elapsed(),
            completion.len(),
            usage.0,
            usage.1,
            usage.2
        );

        let parsed = match parse_llm_output(&completion) {
            Ok(p) => p,
            Err(e) => {
                warn!("[信号] 解析大模型输出失败: {} → 降级跳过本轮", e);
                return Ok(self.fallback_signal(&input, &format!("解析大模型输出失败: {}", e)));
            }
        };

        let side = normalize_side(&parsed.side, &parsed.signal);
        let mut confidence = parsed.confidence;
        if side == Side::None {
            confidence = confidence.min(0.55);
        }

        let reason = if parsed.reason.is_empty() {
            parsed.justification.clone()
        } else {
            parsed.reason.clone()
        };

        // 没有单独的 thinking 时，取更长的 reason/justification 作为思维链
        let thinking = if parsed.thinking.is_empty()
            && parsed.justification.len() > parsed.reason.len()
        {
            parsed.justification.clone()
        } else {
            parsed.thinking.clone()
        };

        info!(
            "[信号] 解析结果: signal={:?} side={:?} coin={:?} → 标准化方向={} 置信度={:.2} thinking={}字符",
            parsed.signal,
            parsed.side,
            parsed.coin,
            side,
            confidence,
            thinking.len()
        );

        Ok(Signal {
            id: Uuid::new_v4().to_string(),
            cycle_id: input.cycle_id,
            pair: input.pair,
            side,
            confidence: clamp(confidence, 0.0, 1.0),
            reason: trim_reason(&reason),
            thinking,
            prompt_tokens: usage.0,
            completion_tokens: usage.1,
            total_tokens: usage.2,
            model_name: self.model.clone(),
            ttl_seconds: clamp_i64(parsed.ttl_seconds, 60, 1800),
            created_at: time_util::now_utc(),
        })
    }
}

impl LlmAgent {
    async fn build_user_prompt(&self, input: &SignalInput) -> Result<String> {
        if self.user_template.is_empty() {
            return Err(anyhow!("未加载用户提示词模板"));
        }

        let snap = self.market.fetch_snapshot(&input.pair).await?;

        let s = &snap.sentiment;
        info!(
            "[信号] 情绪因子: 恐惧贪婪={}({}) 全网多空比={:.4} 大户多空比={:.4} 大户持仓比={:.4} 主动买卖比={:.4}",
            s.fear_greed_index,
            s.fear_greed_label,
            s.long_short_ratio,
            s.top_long_short_ratio,
            s.top_position_ratio,
            s.taker_buy_sell_ratio
        );

        let mut account = input.account.clone();
        account.minutes_elapsed = time_util::now_utc()
            .signed_duration_since(self.start_time)
            .num_minutes();
        account.trading_mode = if self.trading_mode.is_empty() {
            "spot".to_string()
        } else {
            self.trading_mode.clone()
        };
        account.leverage = self.leverage.max(1);

        // 关联币对：BTC 作为市场风向标
        let mut extras = Vec::new();
        let main_coin = input
            .pair
            .split('/')
            .next()
            .unwrap_or("")
            .to_uppercase();
        if main_coin != "BTC" {
            match self.market.fetch_light_snapshot("BTC/USDT").await {
                Ok(btc_snap) => {
                    info!(
                        "[信号] BTC参考: 价格={:.2} 24h涨跌={:.2}% 资金费率={:.6}",
                        btc_snap.price, btc_snap.change_24h_pct, btc_snap.funding_rate
                    );
                    extras.push(btc_snap);
                }
                Err(e) => {
                    info!("[信号] BTC参考数据获取失败: {}（不影响主信号）", e);
                }
            }
        }

        Ok(render_prompt(&self.user_template, &snap, &account, &extras))
    }

    fn build_simple_prompt(&self, input: &SignalInput) -> String {
        format!(
            "请分析并给出交易决策（交易对={}）。\n\
             last_price={:.8} change_24h={:.4} volume_24h={:.4} funding_rate={:.6}\n\n\
             请严格输出 JSON，reason/justification 必须为中文。",
            input.pair,
            input.snapshot.last_price,
            input.snapshot.change_24h,
            input.snapshot.volume_24h,
            input.snapshot.funding_rate,
        )
    }

    /// 调用 OpenAI 兼容的 chat/completions 接口。
    /// 返回 (完成文本, (prompt_tokens, completion_tokens, total_tokens))
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<(String, (i64, i64, i64))> {
        #[derive(Deserialize)]
        struct Message {
            #[serde(default)]
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize, Default)]
        struct Usage {
            #[serde(default)]
            prompt_tokens: i64,
            #[serde(default)]
            completion_tokens: i64,
            #[serde(default)]
            total_tokens: i64,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            #[serde(default)]
            choices: Vec<Choice>,
            usage: Option<Usage>,
        }

        let token = self.auth.get_token()?;
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::LlmError(format!("LLM API {}: {}", status.as_u16(), text)).into());
        }

        let parsed: ChatResponse = resp.json().await?;
        let Some(choice) = parsed.choices.first() else {
            return Err(AppError::LlmError("大模型返回空结果".to_string()).into());
        };

        let usage = parsed.usage.unwrap_or_default();
        let mut total = usage.total_tokens;
        if total == 0 && (usage.prompt_tokens > 0 || usage.completion_tokens > 0) {
            total = usage.prompt_tokens + usage.completion_tokens;
        }

        Ok((
            choice.message.content.clone(),
            (usage.prompt_tokens, usage.completion_tokens, total),
        ))
    }

    /// 降级信号：side=none，不做交易决策，只记录原因
    fn fallback_signal(&self, input: &SignalInput, reason: &str) -> Signal {
        info!("[信号] 降级为跳过（大模型不可用，不做交易决策）: {}", reason);
        Signal {
            id: Uuid::new_v4().to_string(),
            cycle_id: input.cycle_id.clone(),
            pair: input.pair.clone(),
            side: Side::None,
            confidence: 0.0,
            reason: trim_reason(&format!("大模型不可用，自动跳过本轮: {}", reason)),
            thinking: String::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            model_name: "fallback".to_string(),
            ttl_seconds: 60,
            created_at: time_util::now_utc(),
        }
    }
}

// ==================== 解析与标准化 ====================

/// 解析大模型输出：先做整串严格解码，失败后提取首个最长匹配的 JSON 对象
fn parse_llm_output(raw: &str) -> Result<LlmResponse> {
    let clean = raw.trim();
    if let Ok(out) = serde_json::from_str::<LlmResponse>(clean) {
        return Ok(out);
    }

    let start = clean
        .find('{')
        .ok_or_else(|| anyhow!("大模型响应中未找到JSON对象"))?;
    let end = clean
        .rfind('}')
        .ok_or_else(|| anyhow!("大模型响应中未找到JSON对象"))?;
    if end < start {
        return Err(anyhow!("大模型响应中未找到JSON对象"));
    }
    serde_json::from_str(&clean[start..=end]).map_err(|e| anyhow!("解析大模型JSON输出失败: {}", e))
}

/// 标准化方向：side 字段优先，其次 signal 字段；
/// buy/sell 同义词映射到 long/close；hold/none/其他一律不交易。
/// 永不合成 short。
fn normalize_side(side: &str, signal: &str) -> Side {
    for field in [side, signal] {
        let s = field.trim().to_lowercase();
        match s.as_str() {
            "long" | "buy" | "buy_to_enter" => return Side::Long,
            "close" | "sell" | "sell_to_exit" => return Side::Close,
            _ => {}
        }
    }
    Side::None
}

fn trim_reason(reason: &str) -> String {
    let clean = reason.trim();
    if clean.is_empty() {
        return "模型未给出理由".to_string();
    }
    if clean.chars().count() <= 500 {
        return clean.to_string();
    }
    clean.chars().take(500).collect()
}

fn clamp(v: f64, min: f64, max: f64) -> f64 {
    v.max(min).min(max)
}

fn clamp_i64(v: i64, min: i64, max: i64) -> i64 {
    v.max(min).min(max)
}

/// 根据交易模式动态修改系统提示词。
/// 替换目标是现货版模板中的固定段落；目标子串不存在时原样返回。
pub fn adapt_system_prompt(base: &str, trading_mode: &str, leverage: i32) -> String {
    if trading_mode != "futures" {
        // 现货模式：原样返回
        return base.to_string();
    }

    let lev = leverage.max(1);
    let liquidation_pct = 100.0 / lev as f64 * 0.8;
    let mut prompt = base.to_string();

    // 合规声明
    prompt = prompt.replacen(
        "The system only performs spot trading (buying and selling digital assets) on regulated exchanges.",
        &format!("The system performs USDT-M perpetual futures trading with {}x leverage (long only) on regulated exchanges.", lev),
        1,
    );

    // 角色描述
    prompt = prompt.replacen(
        "on Binance spot market",
        &format!("on Binance USDT-M Futures market ({}x leverage, long only)", lev),
        1,
    );

    // 交易模式
    prompt = prompt.replacen(
        "- **Trading Mode**: Spot only (NO leverage, NO margin, NO futures)",
        &format!("- **Trading Mode**: USDT-M Perpetual Futures ({}x leverage, long only)", lev),
        1,
    );
    prompt = prompt.replacen(
        "- **Exchange**: Binance (spot market)",
        "- **Exchange**: Binance (USDT-M Futures)",
        1,
    );

    // 交易机制说明
    prompt = prompt.replacen(
        "## Trading Mechanics\n\n- **Spot Trading**: You buy coins with USDT and sell coins back to USDT\n- **No Leverage**: All positions are 1x (you can only spend what you have)\n- **No Short Selling**: You can only profit when prices go UP\n- **Trading Fees**: ~0.1% per trade (maker/taker)\n- **Slippage**: Expect 0.01-0.1% on market orders depending on size",
        &format!(
            "## Trading Mechanics\n\n\
             - **Futures Trading**: You open LONG positions with margin and close them to take profit/cut loss\n\
             - **Leverage**: {lev}x fixed leverage (margin = position_value / {lev})\n\
             - **Long Only**: You can only open LONG positions (profit when price goes UP)\n\
             - **No Short Selling**: Short positions are disabled in this configuration\n\
             - **Funding Rate**: Paid/received every 8 hours — factor this into holding decisions\n\
             - **Liquidation Risk**: With {lev}x leverage, liquidation occurs at ~{liq:.0}% price drop from entry\n\
             - **Trading Fees**: ~0.04% per trade (maker/taker, lower than spot)\n\
             - **Slippage**: Expect 0.01-0.05% on market orders",
            lev = lev,
            liq = liquidation_pct,
        ),
        1,
    );

    // 移除 "不能做空" 的强制提示
    prompt = prompt.replacen(
        "**IMPORTANT: You CANNOT short sell in spot trading. If you see bearish signals and have NO position, use \"hold\". If you HAVE a position and see bearish signals, use \"close\" to take profit or cut losses.**",
        "**IMPORTANT: You can only go LONG (no short selling). If bearish, use \"hold\" (no position) or \"close\" (has position). Consider funding rate costs for extended holds.**",
        1,
    );

    // 仓位框架中的无杠杆说明
    prompt = prompt.replacen(
        "5. **NO leverage**: Maximum risk is 100% of position value (coin goes to zero)",
        &format!(
            "5. **{lev}x Leverage**: Maximum risk is the margin amount (liquidation before 100% loss). With {lev}x leverage, a {liq:.1}% adverse move will liquidate your position.",
            lev = lev,
            liq = liquidation_pct,
        ),
        1,
    );

    // 策略指南标题
    prompt = prompt.replacen(
        "# SPOT TRADING STRATEGY GUIDELINES",
        "# FUTURES TRADING STRATEGY GUIDELINES (LONG ONLY)",
        1,
    );

    // 常见陷阱中的 short 提醒
    prompt = prompt.replacen(
        "- **Outputting \"short\"**: You CANNOT short in spot. Use \"hold\" or \"close\" instead.",
        "- **Outputting \"short\"**: Short positions are disabled. Use \"hold\" or \"close\" instead.\n- **Ignoring funding rate**: High positive funding = holding cost; consider closing if funding > 0.1%\n- **Ignoring liquidation risk**: Always check how far price is from your liquidation price",
        1,
    );

    // 最终指示中的 short 提醒
    prompt = prompt.replacen(
        "5. **NEVER output \"short\" as signal — spot trading supports \"long\", \"close\", \"hold\", or \"none\"**",
        &format!(
            "5. **NEVER output \"short\"** — only \"long\", \"close\", \"hold\", or \"none\" (long-only mode, {}x leverage)",
            lev
        ),
        1,
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::market::prompt::AccountInfo;

    #[test]
    fn test_parse_strict_json() {
        let out = parse_llm_output(
            r#"{"signal":"long","coin":"DOGE","confidence":0.8,"reason":"动量走强","ttl_seconds":600}"#,
        )
        .unwrap();
        assert_eq!(out.signal, "long");
        assert_eq!(out.confidence, 0.8);
        assert_eq!(out.ttl_seconds, 600);
    }

    #[test]
    fn test_parse_embedded_json() {
        let raw = "分析如下：\n```json\n{\"side\":\"buy\",\"confidence\":0.7,\"reason\":\"突破\"}\n```\n以上。";
        let out = parse_llm_output(raw).unwrap();
        assert_eq!(out.side, "buy");
        assert_eq!(out.reason, "突破");
    }

    #[test]
    fn test_parse_no_json_fails() {
        assert!(parse_llm_output("市场没有方向").is_err());
    }

    #[test]
    fn test_normalize_side() {
        assert_eq!(normalize_side("long", ""), Side::Long);
        assert_eq!(normalize_side("buy", ""), Side::Long);
        assert_eq!(normalize_side("", "buy_to_enter"), Side::Long);
        assert_eq!(normalize_side("sell", ""), Side::Close);
        assert_eq!(normalize_side("", "sell_to_exit"), Side::Close);
        assert_eq!(normalize_side("hold", ""), Side::None);
        assert_eq!(normalize_side("none", "none"), Side::None);
        // short 保留但禁用，永不从模型输出合成
        assert_eq!(normalize_side("short", ""), Side::None);
    }

    #[test]
    fn test_trim_reason() {
        assert_eq!(trim_reason(""), "模型未给出理由");
        assert_eq!(trim_reason("  ok  "), "ok");
        let long: String = std::iter::repeat('x').take(600).collect();
        assert_eq!(trim_reason(&long).chars().count(), 500);
    }

    #[test]
    fn test_adapt_spot_unchanged() {
        let base = "- **Trading Mode**: Spot only (NO leverage, NO margin, NO futures)";
        assert_eq!(adapt_system_prompt(base, "spot", 1), base);
    }

    #[test]
    fn test_adapt_futures_substitutions() {
        let base = "- **Trading Mode**: Spot only (NO leverage, NO margin, NO futures)\n\
                    - **Exchange**: Binance (spot market)\n\
                    # SPOT TRADING STRATEGY GUIDELINES";
        let adapted = adapt_system_prompt(base, "futures", 5);
        assert!(adapted.contains("USDT-M Perpetual Futures (5x leverage, long only)"));
        assert!(adapted.contains("Binance (USDT-M Futures)"));
        assert!(adapted.contains("FUTURES TRADING STRATEGY GUIDELINES (LONG ONLY)"));
    }

    #[test]
    fn test_adapt_missing_target_noop() {
        let base = "与目标段落完全无关的模板";
        assert_eq!(adapt_system_prompt(base, "futures", 3), base);
    }

    #[tokio::test]
    async fn test_rule_agent_long() {
        let mut snapshot = MarketSnapshot::empty("DOGE/USDT");
        snapshot.change_24h = 2.5;
        snapshot.funding_rate = 0.005;
        let signal = RuleBasedAgent
            .generate(SignalInput {
                cycle_id: "cyc-1".to_string(),
                pair: "DOGE/USDT".to_string(),
                snapshot,
                account: AccountInfo::default(),
            })
            .await
            .unwrap();
        assert_eq!(signal.side, Side::Long);
        assert!((signal.confidence - 0.65).abs() < 1e-9);
        assert_eq!(signal.model_name, "rule-based");
    }

    #[tokio::test]
    async fn test_rule_agent_neutral() {
        let snapshot = MarketSnapshot::empty("DOGE/USDT");
        let signal = RuleBasedAgent
            .generate(SignalInput {
                cycle_id: "cyc-1".to_string(),
                pair: "DOGE/USDT".to_string(),
                snapshot,
                account: AccountInfo::default(),
            })
            .await
            .unwrap();
        assert_eq!(signal.side, Side::None);
        assert_eq!(signal.confidence, 0.5);
    }

    #[tokio::test]
    async fn test_rule_agent_confidence_clamped() {
        let mut snapshot = MarketSnapshot::empty("DOGE/USDT");
        snapshot.change_24h = 30.0;
        snapshot.funding_rate = 0.0;
        let signal = RuleBasedAgent
            .generate(SignalInput {
                cycle_id: "cyc-1".to_string(),
                pair: "DOGE/USDT".to_string(),
                snapshot,
                account: AccountInfo::default(),
            })
            .await
            .unwrap();
        assert!((signal.confidence - 0.9).abs() < 1e-9);
    }
}
