use serde::Deserialize;
use tracing::info;

use super::MarketClient;

const COINGECKO_BASE: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko 社区与趋势数据
#[derive(Debug, Clone, Default)]
pub struct CoinGeckoData {
    /// 是否在 CoinGecko 热门趋势中（top 15）
    pub is_trending: bool,
    /// 1=最热，0=不在榜
    pub trending_rank: i64,

    /// 社区数据
    pub community_score: f64,
    pub twitter_followers: i64,
    pub reddit_subscribers: i64,
    pub reddit_active_posts_48h: f64,
    pub reddit_active_comments_48h: f64,
    /// 看涨投票占比 %
    pub sentiment_votes_up_pct: f64,
}

/// 将交易对映射为 CoinGecko coin id
fn coin_to_gecko_id(pair: &str) -> String {
    let coin = pair.split('/').next().unwrap_or(pair).to_lowercase();
    match coin.as_str() {
        "btc" => "bitcoin".to_string(),
        "eth" => "ethereum".to_string(),
        "sol" => "solana".to_string(),
        "bnb" => "binancecoin".to_string(),
        "doge" => "dogecoin".to_string(),
        "xrp" => "ripple".to_string(),
        _ => coin,
    }
}

impl MarketClient {
    /// 从 CoinGecko 获取趋势和社区数据。完全免费，无需 API key。失败时静默跳过。
    pub async fn fetch_coingecko_data(&self, pair: &str) -> CoinGeckoData {
        let mut data = CoinGeckoData::default();
        let coin_id = coin_to_gecko_id(pair);
        let symbol = pair.split('/').next().unwrap_or(pair).to_uppercase();

        // 1. 检查是否在趋势榜
        let (trending, rank) = self.check_coingecko_trending(&symbol).await;
        data.is_trending = trending;
        data.trending_rank = rank;
        if data.is_trending {
            info!("[社区] {} 在 CoinGecko 趋势榜排名 #{}", symbol, rank);
        }

        // 2. 获取社区数据
        self.fetch_coingecko_community(&coin_id, &mut data).await;

        data
    }

    /// 检查币种是否在 CoinGecko 趋势 top 15
    async fn check_coingecko_trending(&self, symbol: &str) -> (bool, i64) {
        #[derive(Deserialize)]
        struct Item {
            #[serde(default)]
            symbol: String,
            /// 0 = 最热
            #[serde(default)]
            score: i64,
        }
        #[derive(Deserialize)]
        struct Coin {
            item: Item,
        }
        #[derive(Deserialize)]
        struct Raw {
            coins: Vec<Coin>,
        }

        let url = format!("{}/search/trending", COINGECKO_BASE);
        let raw: Raw = match self.get_json(&url).await {
            Ok(r) => r,
            Err(e) => {
                info!("[社区] CoinGecko trending 请求失败: {}，跳过", e);
                return (false, 0);
            }
        };

        for coin in raw.coins {
            if coin.item.symbol.eq_ignore_ascii_case(symbol) {
                // score 0 → rank 1
                return (true, coin.item.score + 1);
            }
        }
        (false, 0)
    }

    /// 获取币种的社区指标
    async fn fetch_coingecko_community(&self, coin_id: &str, data: &mut CoinGeckoData) {
        #[derive(Deserialize, Default)]
        struct CommunityData {
            #[serde(default)]
            twitter_followers: i64,
            #[serde(default)]
            reddit_subscribers: i64,
            #[serde(default)]
            reddit_average_posts_48h: f64,
            #[serde(default)]
            reddit_average_comments_48h: f64,
        }
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            community_score: f64,
            #[serde(default)]
            sentiment_votes_up_percentage: f64,
            #[serde(default)]
            community_data: CommunityData,
        }

        let url = format!(
            "{}/coins/{}?localization=false&tickers=false&market_data=false&community_data=true&developer_data=false&sparkline=false",
            COINGECKO_BASE, coin_id,
        );
        let raw: Raw = match self.get_json(&url).await {
            Ok(r) => r,
            Err(e) => {
                info!("[社区] CoinGecko coin detail 请求失败: {}，跳过社区数据", e);
                return;
            }
        };

        data.community_score = raw.community_score;
        data.sentiment_votes_up_pct = raw.sentiment_votes_up_percentage;
        data.twitter_followers = raw.community_data.twitter_followers;
        data.reddit_subscribers = raw.community_data.reddit_subscribers;
        data.reddit_active_posts_48h = raw.community_data.reddit_average_posts_48h;
        data.reddit_active_comments_48h = raw.community_data.reddit_average_comments_48h;

        info!(
            "[社区] CoinGecko {}: 社区评分={:.0} 看涨投票={:.1}% Twitter粉丝={} Reddit订阅={}",
            coin_id,
            data.community_score,
            data.sentiment_votes_up_pct,
            data.twitter_followers,
            data.reddit_subscribers
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_to_gecko_id() {
        assert_eq!(coin_to_gecko_id("BTC/USDT"), "bitcoin");
        assert_eq!(coin_to_gecko_id("XRP/USDT"), "ripple");
        assert_eq!(coin_to_gecko_id("SHIB/USDT"), "shib");
    }
}
