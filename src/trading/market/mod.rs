pub mod coingecko;
pub mod gtrends;
pub mod indicator;
pub mod news;
pub mod prompt;
pub mod social;

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;

pub use coingecko::CoinGeckoData;
pub use gtrends::GoogleTrendsData;
pub use news::NewsItem;
pub use social::{InfluencerPost, SocialMetrics};

const BINANCE_SPOT_BASE: &str = "https://api.binance.com";
const BINANCE_FUTURES_BASE: &str = "https://fapi.binance.com";

/// 单根 K 线（时间戳为毫秒）
#[derive(Debug, Clone, Default)]
pub struct Kline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

/// 情绪因子数据
#[derive(Debug, Clone, Default)]
pub struct SentimentData {
    /// 全网多空账户比
    pub long_short_ratio: f64,
    /// 大户多空账户比
    pub top_long_short_ratio: f64,
    /// 大户多空持仓比
    pub top_position_ratio: f64,
    /// 主动买卖比（>1 买方占优）
    pub taker_buy_sell_ratio: f64,
    /// 恐惧贪婪指数 0-100
    pub fear_greed_index: i64,
    /// "Extreme Fear" / "Fear" / "Neutral" / "Greed" / "Extreme Greed"
    pub fear_greed_label: String,
}

/// 单个交易对的全量行情快照
#[derive(Debug, Clone, Default)]
pub struct CoinSnapshot {
    pub pair: String,
    pub price: f64,
    pub change_24h_pct: f64,
    pub funding_rate: f64,
    pub open_interest: f64,

    /// 短周期序列（5m）
    pub short_interval: String,
    pub short_klines: Vec<Kline>,

    /// 长周期序列（4h）
    pub long_klines: Vec<Kline>,

    /// 情绪因子
    pub sentiment: SentimentData,

    /// 新闻（CryptoPanic，尽力而为）
    pub news: Vec<NewsItem>,

    /// 社交媒体指标（LunarCrush，尽力而为）
    pub social: SocialMetrics,

    /// CoinGecko 社区与趋势数据（免费）
    pub coingecko: CoinGeckoData,

    /// Google Trends 每日热搜检查（免费）
    pub google_trends: GoogleTrendsData,
}

/// 行情数据客户端。
/// 聚合 Binance 公共 API 与若干辅助数据源；除价格和 K 线外，
/// 任何来源失败都不会让快照失败，对应字段保持零值。
pub struct MarketClient {
    pub(crate) http: reqwest::Client,
    /// 可选，为空则跳过新闻获取
    pub crypto_panic_key: String,
    /// 可选，为空则跳过社交数据获取
    pub lunar_crush_key: String,
}

impl MarketClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            crypto_panic_key: String::new(),
            lunar_crush_key: String::new(),
        }
    }

    pub fn with_keys(crypto_panic_key: String, lunar_crush_key: String) -> Self {
        let mut c = Self::new();
        c.crypto_panic_key = crypto_panic_key;
        c.lunar_crush_key = lunar_crush_key;
        c
    }

    /// 获取交易对的全量快照。
    /// 价格与 K 线为必需数据，失败则返回错误；其余来源并发拉取、尽力而为。
    pub async fn fetch_snapshot(&self, pair: &str) -> Result<CoinSnapshot> {
        let symbol = pair_to_symbol(pair);
        let mut snap = CoinSnapshot {
            pair: pair.to_string(),
            short_interval: "5m".to_string(),
            ..Default::default()
        };

        // 1. 24h ticker（价格 + 涨跌幅）
        let ticker = self
            .fetch_24h_ticker(&symbol)
            .await
            .map_err(|e| anyhow!("ticker {}: {}", symbol, e))?;
        snap.price = ticker.0;
        snap.change_24h_pct = ticker.1;

        // 2. 短周期 K 线（5m x 50 ≈ 4 小时）
        snap.short_klines = self
            .fetch_klines(&symbol, "5m", 50)
            .await
            .map_err(|e| anyhow!("klines 5m {}: {}", symbol, e))?;

        // 3. 长周期 K 线（4h x 30 ≈ 5 天）
        snap.long_klines = self
            .fetch_klines(&symbol, "4h", 30)
            .await
            .map_err(|e| anyhow!("klines 4h {}: {}", symbol, e))?;

        // 4-11. 其余来源并发拉取，失败留零值
        let (
            funding,
            open_interest,
            long_short,
            top_long_short,
            top_position,
            taker_ratio,
            fear_greed,
            news,
            social,
            coingecko,
            google_trends,
        ) = tokio::join!(
            self.fetch_funding_rate(&symbol),
            self.fetch_open_interest(&symbol),
            self.fetch_ratio(&symbol, "globalLongShortAccountRatio"),
            self.fetch_ratio(&symbol, "topLongShortAccountRatio"),
            self.fetch_ratio(&symbol, "topLongShortPositionRatio"),
            self.fetch_ratio(&symbol, "takerlongshortRatio"),
            self.fetch_fear_greed_index(),
            self.fetch_news(pair),
            self.fetch_social_metrics(pair),
            self.fetch_coingecko_data(pair),
            self.fetch_google_trends(pair),
        );

        snap.funding_rate = funding.unwrap_or(0.0);
        snap.open_interest = open_interest.unwrap_or(0.0);
        snap.sentiment.long_short_ratio = long_short.unwrap_or(0.0);
        snap.sentiment.top_long_short_ratio = top_long_short.unwrap_or(0.0);
        snap.sentiment.top_position_ratio = top_position.unwrap_or(0.0);
        snap.sentiment.taker_buy_sell_ratio = taker_ratio.unwrap_or(0.0);
        if let Ok((idx, label)) = fear_greed {
            snap.sentiment.fear_greed_index = idx;
            snap.sentiment.fear_greed_label = label;
        }
        snap.news = news;
        snap.social = social;
        snap.coingecko = coingecko;
        snap.google_trends = google_trends;

        Ok(snap)
    }

    /// 轻量级快照：只获取价格、涨跌幅、短期 K 线和资金费率。
    /// 用于关联币对参考（如 BTC），不拉新闻/社交/情绪等耗时数据。
    pub async fn fetch_light_snapshot(&self, pair: &str) -> Result<CoinSnapshot> {
        let symbol = pair_to_symbol(pair);
        let mut snap = CoinSnapshot {
            pair: pair.to_string(),
            short_interval: "5m".to_string(),
            ..Default::default()
        };

        let ticker = self
            .fetch_24h_ticker(&symbol)
            .await
            .map_err(|e| anyhow!("ticker {}: {}", symbol, e))?;
        snap.price = ticker.0;
        snap.change_24h_pct = ticker.1;

        match self.fetch_klines(&symbol, "5m", 50).await {
            Ok(klines) => snap.short_klines = klines,
            Err(e) => info!("[行情] 关联币对 {} 短期K线获取失败: {}", pair, e),
        }

        snap.funding_rate = self.fetch_funding_rate(&symbol).await.unwrap_or(0.0);

        Ok(snap)
    }

    /// 仅获取最新价格（轻量）
    pub async fn fetch_price(&self, pair: &str) -> Result<f64> {
        let symbol = pair_to_symbol(pair);
        self.fetch_price_by_symbol(&symbol).await
    }

    pub async fn fetch_price_by_symbol(&self, symbol: &str) -> Result<f64> {
        #[derive(Deserialize)]
        struct PriceResult {
            price: String,
        }
        let url = format!("{}/api/v3/ticker/price?symbol={}", BINANCE_SPOT_BASE, symbol);
        let result: PriceResult = self.get_json(&url).await?;
        Ok(result.price.parse().unwrap_or(0.0))
    }

    /// 快速获取 24h 价格与涨跌幅（定时器触发周期时补价用）
    pub async fn fetch_quick_ticker(&self, pair: &str) -> Result<(f64, f64)> {
        let symbol = pair_to_symbol(pair);
        self.fetch_24h_ticker(&symbol).await
    }

    async fn fetch_24h_ticker(&self, symbol: &str) -> Result<(f64, f64)> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            last_price: String,
            price_change_percent: String,
        }
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", BINANCE_SPOT_BASE, symbol);
        let raw: Raw = self.get_json(&url).await?;
        Ok((
            raw.last_price.parse().unwrap_or(0.0),
            raw.price_change_percent.parse().unwrap_or(0.0),
        ))
    }

    async fn fetch_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            BINANCE_SPOT_BASE, symbol, interval, limit
        );
        let raw: Vec<Vec<serde_json::Value>> = self.get_json(&url).await?;

        let mut klines = Vec::with_capacity(raw.len());
        for row in raw {
            if row.len() < 12 {
                continue;
            }
            klines.push(Kline {
                open_time: row[0].as_i64().unwrap_or(0),
                open: json_float(&row[1]),
                high: json_float(&row[2]),
                low: json_float(&row[3]),
                close: json_float(&row[4]),
                volume: json_float(&row[5]),
                close_time: row[6].as_i64().unwrap_or(0),
            });
        }
        Ok(klines)
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            funding_rate: String,
        }
        let url = format!(
            "{}/fapi/v1/fundingRate?symbol={}&limit=1",
            BINANCE_FUTURES_BASE, symbol
        );
        let results: Vec<Raw> = self.get_json(&url).await?;
        Ok(results
            .first()
            .and_then(|r| r.funding_rate.parse().ok())
            .unwrap_or(0.0))
    }

    async fn fetch_open_interest(&self, symbol: &str) -> Result<f64> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            open_interest: String,
        }
        let url = format!(
            "{}/fapi/v1/openInterest?symbol={}",
            BINANCE_FUTURES_BASE, symbol
        );
        let raw: Raw = self.get_json(&url).await?;
        Ok(raw.open_interest.parse().unwrap_or(0.0))
    }

    /// 多空比 / 主动买卖比。
    /// endpoint: globalLongShortAccountRatio / topLongShortAccountRatio /
    ///           topLongShortPositionRatio / takerlongshortRatio
    async fn fetch_ratio(&self, symbol: &str, endpoint: &str) -> Result<f64> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            #[serde(default)]
            long_short_ratio: String,
            #[serde(default)]
            buy_sell_ratio: String,
        }
        let url = format!(
            "{}/futures/data/{}?symbol={}&period=5m&limit=1",
            BINANCE_FUTURES_BASE, endpoint, symbol
        );
        let results: Vec<Raw> = self.get_json(&url).await?;
        let Some(first) = results.first() else {
            return Ok(0.0);
        };
        let val = if first.long_short_ratio.is_empty() {
            &first.buy_sell_ratio
        } else {
            &first.long_short_ratio
        };
        Ok(val.parse().unwrap_or(0.0))
    }

    /// 恐惧贪婪指数（alternative.me，尽力而为）
    async fn fetch_fear_greed_index(&self) -> Result<(i64, String)> {
        #[derive(Deserialize)]
        struct Entry {
            value: String,
            value_classification: String,
        }
        #[derive(Deserialize)]
        struct Raw {
            data: Vec<Entry>,
        }
        let raw: Raw = self
            .get_json("https://api.alternative.me/fng/?limit=1")
            .await?;
        let Some(first) = raw.data.first() else {
            return Ok((0, String::new()));
        };
        Ok((
            first.value.parse().unwrap_or(0),
            first.value_classification.clone(),
        ))
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(
                AppError::ExchangeApiError(format!("Binance API {}: {}", status.as_u16(), body))
                    .into(),
            );
        }
        Ok(resp.json::<T>().await?)
    }
}

impl Default for MarketClient {
    fn default() -> Self {
        Self::new()
    }
}

/// "BTC/USDT" -> "BTCUSDT"
pub fn pair_to_symbol(pair: &str) -> String {
    pair.chars().filter(|c| *c != '/').collect()
}

fn json_float(v: &serde_json::Value) -> f64 {
    match v {
        serde_json::Value::String(s) => s.parse().unwrap_or(0.0),
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_to_symbol() {
        assert_eq!(pair_to_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(pair_to_symbol("DOGEUSDT"), "DOGEUSDT");
    }

    #[test]
    fn test_json_float() {
        assert_eq!(json_float(&serde_json::json!("0.123")), 0.123);
        assert_eq!(json_float(&serde_json::json!(4.5)), 4.5);
        assert_eq!(json_float(&serde_json::json!(null)), 0.0);
    }
}
