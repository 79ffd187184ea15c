//! 用户提示词渲染：从行情快照与账户信息填充文本模板。
//!
//! 模板中的 `{{name}}` 占位符逐一替换；新闻/情绪/社区/社交/关联币对/持仓
//! 等区块在代码中拼装后作为整体占位符注入，数据为空时区块整体省略。
//! 同样的输入渲染两次，输出逐字节一致。

use super::{indicator, CoinSnapshot};

/// 账户信息（由协调器提供给信号 Agent）
#[derive(Debug, Clone, Default)]
pub struct AccountInfo {
    pub account_value: f64,
    pub cash_available: f64,
    pub return_pct: f64,
    pub sharpe_ratio: f64,
    pub minutes_elapsed: i64,
    /// "spot" 或 "futures"
    pub trading_mode: String,
    pub leverage: i32,
    pub positions: Vec<PositionData>,
}

/// 当前持仓信息（提示词展示用，字段已格式化）
#[derive(Debug, Clone, Default)]
pub struct PositionData {
    pub symbol: String,
    pub side: String,
    pub quantity: String,
    pub entry_price: String,
    pub current_price: String,
    pub unrealized_pnl: String,
    pub leverage: String,
}

/// 渲染用户提示词
pub fn render_prompt(
    template: &str,
    snap: &CoinSnapshot,
    account: &AccountInfo,
    extras: &[CoinSnapshot],
) -> String {
    let prec = price_precision(&snap.pair);

    // 短周期指标
    let short_closes: Vec<f64> = snap.short_klines.iter().map(|k| k.close).collect();
    let short_ema20 = indicator::ema(&short_closes, 20);
    let short_macd = indicator::macd(&short_closes);
    let short_rsi14 = indicator::rsi(&short_closes, 14);
    let short_vols: Vec<f64> = snap.short_klines.iter().map(|k| k.volume).collect();

    // 长周期指标
    let long_closes: Vec<f64> = snap.long_klines.iter().map(|k| k.close).collect();
    let long_highs: Vec<f64> = snap.long_klines.iter().map(|k| k.high).collect();
    let long_lows: Vec<f64> = snap.long_klines.iter().map(|k| k.low).collect();
    let long_ema20 = indicator::ema(&long_closes, 20);
    let long_ema50 = indicator::ema(&long_closes, 50);
    let long_macd = indicator::macd(&long_closes);
    let long_rsi14 = indicator::rsi(&long_closes, 14);
    let long_atr14 = indicator::atr(&long_highs, &long_lows, &long_closes, 14);
    let long_vols: Vec<f64> = snap.long_klines.iter().map(|k| k.volume).collect();

    // 短序列只取最后 10 个点，控制提示词长度
    let short_n = short_closes.len().min(10);
    let long_n = long_closes.len().min(10);

    let vars: Vec<(&str, String)> = vec![
        ("minutes_elapsed", account.minutes_elapsed.to_string()),
        ("pair", snap.pair.clone()),
        ("price", ff(snap.price, prec)),
        ("change_24h_pct", ff(snap.change_24h_pct, 2)),
        ("funding_rate", ff(snap.funding_rate, 6)),
        ("open_interest", ff(snap.open_interest, 2)),
        ("open_interest_avg", "N/A".to_string()),
        ("short_interval", snap.short_interval.clone()),
        ("short_count", short_n.to_string()),
        ("short_prices", join_last(&short_closes, short_n, prec)),
        ("short_ema20", join_last(&short_ema20, short_n, prec)),
        ("short_macd", join_last(&short_macd, short_n, 4)),
        ("short_rsi14", join_last(&short_rsi14, short_n, 1)),
        ("short_volume", join_last(&short_vols, short_n, 0)),
        ("long_count", long_closes.len().to_string()),
        ("long_prices", join_last(&long_closes, long_n, prec)),
        ("long_ema20_latest", last_ff(&long_ema20, prec)),
        ("long_ema50_latest", last_ff(&long_ema50, prec)),
        ("long_macd", join_last(&long_macd, long_n, 4)),
        ("long_rsi14", join_last(&long_rsi14, long_n, 1)),
        ("long_atr14", last_ff(&long_atr14, prec)),
        ("long_volume_avg", ff(avg(&long_vols), 0)),
        ("sentiment_section", sentiment_section(snap)),
        ("news_section", news_section(snap)),
        ("community_section", community_section(snap)),
        ("social_section", social_section(snap)),
        ("extra_pairs_section", extra_pairs_section(extras)),
        ("account_value", ff(account.account_value, 2)),
        ("cash_available", ff(account.cash_available, 2)),
        ("return_pct", ff(account.return_pct, 2)),
        ("sharpe_ratio", ff(account.sharpe_ratio, 2)),
        ("trading_mode", account.trading_mode.clone()),
        ("leverage", account.leverage.to_string()),
        ("positions_section", positions_section(account)),
    ];

    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{}}}}}", key), &value);
    }
    out
}

// ---- 区块拼装 ----

fn sentiment_section(snap: &CoinSnapshot) -> String {
    let s = &snap.sentiment;
    let has_data = s.long_short_ratio != 0.0
        || s.top_long_short_ratio != 0.0
        || s.top_position_ratio != 0.0
        || s.taker_buy_sell_ratio != 0.0
        || s.fear_greed_index != 0;
    if !has_data {
        return String::new();
    }
    format!(
        "## Market Sentiment\n\n\
         - Global Long/Short Account Ratio: {}\n\
         - Top Trader Long/Short Account Ratio: {}\n\
         - Top Trader Position Ratio: {}\n\
         - Taker Buy/Sell Ratio: {}\n\
         - Fear & Greed Index: {} ({})\n",
        ff(s.long_short_ratio, 4),
        ff(s.top_long_short_ratio, 4),
        ff(s.top_position_ratio, 4),
        ff(s.taker_buy_sell_ratio, 4),
        s.fear_greed_index,
        s.fear_greed_label,
    )
}

fn news_section(snap: &CoinSnapshot) -> String {
    if snap.news.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Recent News\n\n");
    for n in &snap.news {
        out.push_str(&format!(
            "- [{}] {} (sentiment: {}, {})\n",
            n.source, n.title, n.sentiment, n.time_ago
        ));
    }
    out
}

fn community_section(snap: &CoinSnapshot) -> String {
    let cg = &snap.coingecko;
    let gt = &snap.google_trends;
    let has_gecko = cg.community_score > 0.0 || cg.is_trending;
    if !has_gecko && !gt.is_trending {
        return String::new();
    }
    let mut out = String::from("## Community & Trending\n\n");
    if has_gecko {
        if cg.is_trending {
            out.push_str(&format!(
                "- CoinGecko Trending: YES, rank #{}\n",
                cg.trending_rank
            ));
        }
        out.push_str(&format!(
            "- Community Score: {}\n\
             - Sentiment Votes Up: {}%\n\
             - Twitter Followers: {}\n\
             - Reddit Subscribers: {}\n\
             - Reddit Posts (48h): {}\n\
             - Reddit Comments (48h): {}\n",
            ff(cg.community_score, 0),
            ff(cg.sentiment_votes_up_pct, 1),
            format_large_number(cg.twitter_followers),
            format_large_number(cg.reddit_subscribers),
            ff(cg.reddit_active_posts_48h, 1),
            ff(cg.reddit_active_comments_48h, 0),
        ));
    }
    if gt.is_trending {
        out.push_str(&format!(
            "- Google Daily Trends: matched {:?}\n",
            gt.title
        ));
    }
    out
}

fn social_section(snap: &CoinSnapshot) -> String {
    let s = &snap.social;
    if s.galaxy_score <= 0.0 && s.social_volume_24h <= 0 {
        return String::new();
    }
    let mut out = format!(
        "## Social Metrics\n\n\
         - Galaxy Score: {}\n\
         - AltRank: {}\n\
         - Social Volume (24h): {} ({}% vs prior 24h)\n\
         - Social Dominance: {}%\n\
         - Sentiment (0-5): {}\n\
         - Interactions (24h): {}\n",
        ff(s.galaxy_score, 0),
        s.alt_rank,
        s.social_volume_24h,
        ff(s.social_volume_change, 1),
        ff(s.social_dominance, 2),
        ff(s.sentiment_score, 1),
        s.interactions_24h,
    );
    if !s.influencer_posts.is_empty() {
        out.push_str("\nKey influencer posts:\n");
        for p in &s.influencer_posts {
            let label = if p.sentiment > 3.5 {
                "positive"
            } else if p.sentiment < 2.5 {
                "negative"
            } else {
                "neutral"
            };
            out.push_str(&format!(
                "- {} ({}): {} [{}]\n",
                p.creator, p.time_ago, p.title, label
            ));
        }
    }
    out
}

fn extra_pairs_section(extras: &[CoinSnapshot]) -> String {
    if extras.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Correlation Reference\n\n");
    for es in extras {
        let closes: Vec<f64> = es.short_klines.iter().map(|k| k.close).collect();
        let rsi = indicator::rsi(&closes, 14);
        out.push_str(&format!(
            "- {}: price={}, 24h change={}%, funding rate={}, RSI14={}\n",
            es.pair,
            ff(es.price, price_precision(&es.pair)),
            ff(es.change_24h_pct, 2),
            ff(es.funding_rate, 6),
            last_ff(&rsi, 1),
        ));
    }
    out
}

fn positions_section(account: &AccountInfo) -> String {
    if account.positions.is_empty() {
        return "None (100% cash)".to_string();
    }
    let mut out = String::new();
    for p in &account.positions {
        out.push_str(&format!(
            "- {} {} qty={} entry={} current={} pnl={} leverage={}x\n",
            p.symbol, p.side, p.quantity, p.entry_price, p.current_price, p.unrealized_pnl, p.leverage
        ));
    }
    out
}

// ---- 格式化辅助 ----

pub fn ff(v: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, v)
}

/// 序列取最后 n 个点，按指定小数位拼接为 "v1, v2, ..."；空序列返回 "N/A"
pub fn join_last(series: &[f64], n: usize, decimals: usize) -> String {
    if series.is_empty() {
        return "N/A".to_string();
    }
    let start = series.len().saturating_sub(n);
    series[start..]
        .iter()
        .map(|v| ff(*v, decimals))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn last_ff(series: &[f64], decimals: usize) -> String {
    match series.last() {
        Some(v) => ff(*v, decimals),
        None => "N/A".to_string(),
    }
}

pub fn avg(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f64>() / series.len() as f64
}

/// 大数字加 K/M 后缀：1500 → "1.5K"，2000000 → "2.0M"
pub fn format_large_number(n: i64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

/// 价格小数位按币种量级选取
pub fn price_precision(pair: &str) -> usize {
    let p = pair.to_uppercase();
    if p.starts_with("BTC") || p.starts_with("ETH") || p.starts_with("BNB") {
        2
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::market::{Kline, SentimentData};

    fn sample_snapshot() -> CoinSnapshot {
        let klines: Vec<Kline> = (0..50)
            .map(|i| Kline {
                open_time: i * 300_000,
                open: 0.10,
                high: 0.11,
                low: 0.09,
                close: 0.10 + i as f64 * 0.0001,
                volume: 1000.0,
                close_time: (i + 1) * 300_000,
            })
            .collect();
        CoinSnapshot {
            pair: "DOGE/USDT".to_string(),
            price: 0.105,
            change_24h_pct: 2.35,
            funding_rate: 0.0001,
            open_interest: 12345.0,
            short_interval: "5m".to_string(),
            short_klines: klines.clone(),
            long_klines: klines,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_deterministic() {
        let snap = sample_snapshot();
        let account = AccountInfo {
            account_value: 100.0,
            cash_available: 50.0,
            trading_mode: "spot".to_string(),
            leverage: 1,
            ..Default::default()
        };
        let tmpl = "pair={{pair}} price={{price}} rsi={{short_rsi14}} pos={{positions_section}}";
        let a = render_prompt(tmpl, &snap, &account, &[]);
        let b = render_prompt(tmpl, &snap, &account, &[]);
        assert_eq!(a, b);
        assert!(a.contains("pair=DOGE/USDT"));
        assert!(a.contains("price=0.1050"));
        assert!(a.contains("None (100% cash)"));
    }

    #[test]
    fn test_empty_sections_omitted() {
        let snap = sample_snapshot();
        assert_eq!(sentiment_section(&snap), "");
        assert_eq!(news_section(&snap), "");
        assert_eq!(community_section(&snap), "");
        assert_eq!(social_section(&snap), "");
        assert_eq!(extra_pairs_section(&[]), "");
    }

    #[test]
    fn test_sentiment_section_present() {
        let mut snap = sample_snapshot();
        snap.sentiment = SentimentData {
            long_short_ratio: 1.23,
            fear_greed_index: 60,
            fear_greed_label: "Greed".to_string(),
            ..Default::default()
        };
        let section = sentiment_section(&snap);
        assert!(section.contains("1.2300"));
        assert!(section.contains("60 (Greed)"));
    }

    #[test]
    fn test_join_last() {
        assert_eq!(join_last(&[], 5, 2), "N/A");
        assert_eq!(join_last(&[1.0, 2.0, 3.0], 2, 1), "2.0, 3.0");
        assert_eq!(join_last(&[1.0], 5, 0), "1");
    }

    #[test]
    fn test_format_large_number() {
        assert_eq!(format_large_number(999), "999");
        assert_eq!(format_large_number(1_500), "1.5K");
        assert_eq!(format_large_number(2_000_000), "2.0M");
    }

    #[test]
    fn test_price_precision() {
        assert_eq!(price_precision("BTC/USDT"), 2);
        assert_eq!(price_precision("ETH/USDT"), 2);
        assert_eq!(price_precision("DOGE/USDT"), 4);
        assert_eq!(price_precision("XRP/USDT"), 4);
    }
}
