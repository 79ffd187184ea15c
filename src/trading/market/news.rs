use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::MarketClient;
use crate::time_util;

/// 一条加密货币新闻（来自 CryptoPanic）
#[derive(Debug, Clone, Default)]
pub struct NewsItem {
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    /// positive / negative / neutral
    pub sentiment: String,
    /// 人类可读的时间差，如 "2h ago"
    pub time_ago: String,
}

/// 敏感词替换表：触发内容审核的词汇换成中性表述
const SANITIZE_PAIRS: &[(&str, &str)] = &[
    ("hack", "security incident"),
    ("Hack", "Security Incident"),
    ("HACK", "SECURITY INCIDENT"),
    ("scam", "fraud risk"),
    ("Scam", "Fraud Risk"),
    ("SCAM", "FRAUD RISK"),
    ("kill", "eliminate"),
    ("Kill", "Eliminate"),
    ("attack", "incident"),
    ("Attack", "Incident"),
    ("bomb", "surge"),
    ("Bomb", "Surge"),
    ("crash", "sharp decline"),
    ("Crash", "Sharp Decline"),
    ("drug", "substance"),
    ("Drug", "Substance"),
    ("terror", "risk event"),
    ("Terror", "Risk Event"),
    ("war", "conflict"),
    ("War", "Conflict"),
    ("weapon", "tool"),
    ("Weapon", "Tool"),
    ("launder", "transfer"),
    ("Launder", "Transfer"),
    ("ponzi", "pyramid scheme"),
    ("Ponzi", "Pyramid Scheme"),
];

impl MarketClient {
    /// 从 CryptoPanic 获取指定币种的最新新闻。
    /// 任何错误（无 key、额度耗尽、网络异常）都返回空列表，不影响主流程。
    pub async fn fetch_news(&self, pair: &str) -> Vec<NewsItem> {
        if self.crypto_panic_key.is_empty() {
            return Vec::new();
        }

        // "DOGE/USDT" → "DOGE"
        let coin = pair.split('/').next().unwrap_or(pair);

        let url = format!(
            "https://cryptopanic.com/api/v1/posts/?auth_token={}&currencies={}&kind=news&public=true",
            self.crypto_panic_key, coin,
        );

        #[derive(Deserialize)]
        struct Source {
            #[serde(default)]
            title: String,
        }
        #[derive(Deserialize, Default)]
        struct Votes {
            #[serde(default)]
            positive: i64,
            #[serde(default)]
            negative: i64,
            #[serde(default)]
            important: i64,
        }
        #[derive(Deserialize)]
        struct Post {
            #[serde(default)]
            title: String,
            #[serde(default)]
            created_at: String,
            source: Option<Source>,
            #[serde(default)]
            votes: Votes,
        }
        #[derive(Deserialize)]
        struct Raw {
            results: Vec<Post>,
        }

        let raw: Raw = match self.get_json(&url).await {
            Ok(r) => r,
            Err(e) => {
                info!("[新闻] 请求 CryptoPanic 失败: {}，跳过新闻数据", e);
                return Vec::new();
            }
        };

        // 最多取 5 条最新新闻
        let now = time_util::now_utc();
        let items: Vec<NewsItem> = raw
            .results
            .into_iter()
            .take(5)
            .map(|r| {
                let published_at = DateTime::parse_from_rfc3339(&r.created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or(now);
                NewsItem {
                    title: sanitize_news_title(&r.title),
                    published_at,
                    source: r.source.map(|s| s.title).unwrap_or_default(),
                    sentiment: derive_sentiment(r.votes.positive, r.votes.negative).to_string(),
                    time_ago: time_util::human_time_ago(now, published_at),
                }
            })
            .collect();

        info!("[新闻] 获取到 {} 条 {} 相关新闻", items.len(), coin);
        items
    }
}

/// 根据投票数判断情绪倾向
pub fn derive_sentiment(positive: i64, negative: i64) -> &'static str {
    if positive > negative * 2 {
        "positive"
    } else if negative > positive * 2 {
        "negative"
    } else {
        "neutral"
    }
}

/// 清洗新闻标题中可能触发内容安全过滤的敏感词。
/// 替换后的文本不再包含任何替换源词，因此幂等。
pub fn sanitize_news_title(title: &str) -> String {
    let mut out = title.to_string();
    for (from, to) in SANITIZE_PAIRS {
        out = out.replace(from, to);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_sentiment() {
        assert_eq!(derive_sentiment(5, 1), "positive");
        assert_eq!(derive_sentiment(1, 5), "negative");
        assert_eq!(derive_sentiment(2, 1), "neutral");
        assert_eq!(derive_sentiment(0, 0), "neutral");
        // 边界：正好 2 倍不算
        assert_eq!(derive_sentiment(4, 2), "neutral");
    }

    #[test]
    fn test_sanitize_case_forms() {
        assert_eq!(
            sanitize_news_title("Exchange hack: HACK confirmed, Hack details"),
            "Exchange security incident: SECURITY INCIDENT confirmed, Security Incident details"
        );
        assert_eq!(
            sanitize_news_title("Market Crash amid war fears"),
            "Market Sharp Decline amid conflict fears"
        );
    }

    #[test]
    fn test_sanitize_idempotent() {
        let inputs = [
            "Bitcoin crash after exchange hack and scam allegations",
            "War, Terror, and a bomb of a rally",
            "Ponzi scheme weapon drug launder kill attack",
        ];
        for input in inputs {
            let once = sanitize_news_title(input);
            let twice = sanitize_news_title(&once);
            assert_eq!(once, twice);
        }
    }
}
