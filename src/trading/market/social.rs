use serde_json::Value;
use tracing::info;

use super::MarketClient;
use crate::time_util;

const LUNARCRUSH_BASE: &str = "https://lunarcrush.com/api4";

/// LunarCrush 社交媒体指标
#[derive(Debug, Clone, Default)]
pub struct SocialMetrics {
    /// 综合评分 0-100（社交+市场）
    pub galaxy_score: f64,
    /// 排名（越小越热）
    pub alt_rank: i64,
    /// 24h 社交提及量
    pub social_volume_24h: i64,
    /// 社交关注占比 %
    pub social_dominance: f64,
    /// 情绪评分 0-5
    pub sentiment_score: f64,
    /// 24h 社交互动量
    pub interactions_24h: i64,

    /// 社交量较前 24h 的变化百分比
    pub social_volume_change: f64,

    /// 关键 KOL 最新动态
    pub influencer_posts: Vec<InfluencerPost>,
}

/// 关键意见领袖的最新帖子
#[derive(Debug, Clone, Default)]
pub struct InfluencerPost {
    pub creator: String,
    pub title: String,
    pub time_ago: String,
    /// 帖子情绪 0-5
    pub sentiment: f64,
}

/// 将交易对映射为 LunarCrush topic 名称
fn coin_to_topic(pair: &str) -> String {
    let coin = pair.split('/').next().unwrap_or(pair).to_lowercase();
    match coin.as_str() {
        "btc" => "bitcoin".to_string(),
        "eth" => "ethereum".to_string(),
        "sol" => "solana".to_string(),
        "bnb" => "bnb".to_string(),
        "doge" => "dogecoin".to_string(),
        "xrp" => "xrp".to_string(),
        _ => coin,
    }
}

impl MarketClient {
    /// 从 LunarCrush 获取社交指标。无 key 或请求失败 → 返回零值，不影响主流程。
    pub async fn fetch_social_metrics(&self, pair: &str) -> SocialMetrics {
        if self.lunar_crush_key.is_empty() {
            return SocialMetrics::default();
        }

        let mut metrics = SocialMetrics::default();

        // 1. Topic 社交概览（24h 聚合）
        let topic = coin_to_topic(pair);
        if let Some(raw) = self
            .lunar_get(&format!("/public/topic/{}/v1", topic))
            .await
        {
            if let Some(data) = raw.get("data") {
                metrics.galaxy_score = value_float(data.get("galaxy_score"));
                metrics.alt_rank = value_float(data.get("alt_rank")) as i64;
                metrics.social_volume_24h = value_float(data.get("num_posts")) as i64;
                metrics.social_dominance = value_float(data.get("social_dominance"));
                metrics.interactions_24h = value_float(data.get("interactions_24h")) as i64;
                metrics.sentiment_score = value_float(data.get("sentiment"));

                let prev_volume = value_float(data.get("num_posts_previous"));
                if prev_volume > 0.0 {
                    metrics.social_volume_change =
                        (metrics.social_volume_24h as f64 - prev_volume) / prev_volume * 100.0;
                }
            }
            info!(
                "[社交] LunarCrush topic={}: GalaxyScore={:.0} SocialVol={} Sentiment={:.1} Dominance={:.2}%",
                topic,
                metrics.galaxy_score,
                metrics.social_volume_24h,
                metrics.sentiment_score,
                metrics.social_dominance
            );
        }

        // 2. 马斯克最新推文（对 DOGE 尤其重要）
        let coin = pair.split('/').next().unwrap_or(pair).to_lowercase();
        if coin == "doge" {
            metrics.influencer_posts = self.fetch_influencer_posts("twitter", "elonmusk").await;
        }

        metrics
    }

    /// 获取指定 KOL 的最新热帖
    async fn fetch_influencer_posts(&self, network: &str, username: &str) -> Vec<InfluencerPost> {
        let Some(raw) = self
            .lunar_get(&format!("/public/creator/{}/{}/posts/v1", network, username))
            .await
        else {
            return Vec::new();
        };

        let Some(data) = raw.get("data").and_then(|d| d.as_array()) else {
            return Vec::new();
        };

        let now = time_util::now_utc();
        let posts: Vec<InfluencerPost> = data
            .iter()
            .take(3)
            .filter_map(|item| {
                let post = item.as_object()?;
                let mut title = post
                    .get("post_title")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                if title.is_empty() {
                    title = post
                        .get("post_description")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                }
                // 截取前 200 字符
                if title.chars().count() > 200 {
                    title = title.chars().take(200).collect::<String>() + "...";
                }

                let created_at = value_float(post.get("post_created")) as i64;
                let time_ago = if created_at > 0 {
                    chrono::DateTime::from_timestamp(created_at, 0)
                        .map(|t| time_util::human_time_ago(now, t))
                        .unwrap_or_default()
                } else {
                    String::new()
                };

                Some(InfluencerPost {
                    creator: format!("@{}", username),
                    title: super::news::sanitize_news_title(&title),
                    time_ago,
                    sentiment: value_float(post.get("sentiment")),
                })
            })
            .collect();

        if !posts.is_empty() {
            info!("[社交] @{} 最新 {} 条帖子已获取", username, posts.len());
        }
        posts
    }

    /// LunarCrush API GET（带 Bearer Token），任何错误返回 None（静默失败）
    async fn lunar_get(&self, path: &str) -> Option<Value> {
        let url = format!("{}{}", LUNARCRUSH_BASE, path);

        let resp = match self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.lunar_crush_key))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                info!("[社交] LunarCrush 请求失败: {}，跳过社交数据", e);
                return None;
            }
        };

        if !resp.status().is_success() {
            info!(
                "[社交] LunarCrush 返回 HTTP {}（额度不足或无权限），跳过社交数据",
                resp.status().as_u16()
            );
            return None;
        }

        match resp.json::<Value>().await {
            Ok(v) => Some(v),
            Err(e) => {
                info!("[社交] 解析 LunarCrush 响应失败: {}", e);
                None
            }
        }
    }
}

fn value_float(v: Option<&Value>) -> f64 {
    v.and_then(|v| v.as_f64()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_to_topic() {
        assert_eq!(coin_to_topic("BTC/USDT"), "bitcoin");
        assert_eq!(coin_to_topic("DOGE/USDT"), "dogecoin");
        assert_eq!(coin_to_topic("PEPE/USDT"), "pepe");
    }

    #[test]
    fn test_value_float() {
        let v = serde_json::json!({"a": 1.5, "b": "x"});
        assert_eq!(value_float(v.get("a")), 1.5);
        assert_eq!(value_float(v.get("b")), 0.0);
        assert_eq!(value_float(v.get("c")), 0.0);
    }
}
