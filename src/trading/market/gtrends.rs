use tracing::info;

use super::MarketClient;

/// Google Trends 检查结果
#[derive(Debug, Clone, Default)]
pub struct GoogleTrendsData {
    /// 是否出现在 Google 每日热搜
    pub is_trending: bool,
    /// 匹配到的热搜词条（如 "Dogecoin price"）
    pub title: String,
}

impl MarketClient {
    /// 检查币种是否出现在 Google 每日热搜中。
    /// 使用 Google Trends 公开 RSS feed，完全免费，无需 API key。失败时静默返回空数据。
    pub async fn fetch_google_trends(&self, pair: &str) -> GoogleTrendsData {
        let coin = pair.split('/').next().unwrap_or(pair).to_lowercase();
        let keywords = coin_to_keywords(&coin);

        // 美国区热搜，加密货币用户集中
        let url = "https://trends.google.com/trends/trendingsearches/daily/rss?geo=US";

        let resp = match self
            .http
            .get(url)
            .header("User-Agent", "Mozilla/5.0 (compatible; AIQuant/1.0)")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                info!("[热搜] Google Trends RSS 请求失败: {}，跳过", e);
                return GoogleTrendsData::default();
            }
        };

        if !resp.status().is_success() {
            info!(
                "[热搜] Google Trends RSS 返回 HTTP {}，跳过",
                resp.status().as_u16()
            );
            return GoogleTrendsData::default();
        }

        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => {
                info!("[热搜] 读取 Google Trends RSS 失败: {}", e);
                return GoogleTrendsData::default();
            }
        };

        // 在热搜条目中查找与币种相关的关键词
        for title in parse_rss_titles(&body) {
            let lowered = title.to_lowercase();
            for kw in &keywords {
                if lowered.contains(kw.as_str()) {
                    info!(
                        "[热搜] {} 出现在 Google 热搜！匹配: {:?}",
                        coin.to_uppercase(),
                        title
                    );
                    return GoogleTrendsData {
                        is_trending: true,
                        title,
                    };
                }
            }
        }

        GoogleTrendsData::default()
    }
}

/// 将币种缩写映射为搜索关键词列表
fn coin_to_keywords(coin: &str) -> Vec<String> {
    let mut base = vec![coin.to_string()];
    let extra: &[&str] = match coin {
        "btc" => &["bitcoin"],
        "eth" => &["ethereum"],
        "sol" => &["solana"],
        "bnb" => &["binance coin"],
        "doge" => &["dogecoin", "doge coin", "elon musk doge", "elon doge"],
        "xrp" => &["ripple", "xrp"],
        _ => &[],
    };
    base.extend(extra.iter().map(|s| s.to_string()));
    base
}

/// 从 RSS 文本中提取 item 的 <title> 内容。
/// 首个 <title> 属于 channel 自身，跳过；支持 CDATA 包装。
fn parse_rss_titles(body: &str) -> Vec<String> {
    let mut titles = Vec::new();
    let mut rest = body;
    let mut first = true;
    while let Some(start) = rest.find("<title>") {
        let after = &rest[start + "<title>".len()..];
        let Some(end) = after.find("</title>") else {
            break;
        };
        let mut title = after[..end].trim();
        if let Some(stripped) = title.strip_prefix("<![CDATA[") {
            title = stripped.strip_suffix("]]>").unwrap_or(stripped);
        }
        if first {
            first = false;
        } else {
            titles.push(title.trim().to_string());
        }
        rest = &after[end..];
    }
    titles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_to_keywords() {
        let kws = coin_to_keywords("doge");
        assert!(kws.contains(&"dogecoin".to_string()));
        assert!(kws.contains(&"elon doge".to_string()));
        assert_eq!(coin_to_keywords("pepe"), vec!["pepe".to_string()]);
    }

    #[test]
    fn test_parse_rss_titles() {
        let rss = r#"<rss><channel><title>Daily Search Trends</title>
            <item><title>Dogecoin price</title></item>
            <item><title><![CDATA[Bitcoin ETF]]></title></item>
        </channel></rss>"#;
        let titles = parse_rss_titles(rss);
        assert_eq!(titles, vec!["Dogecoin price", "Bitcoin ETF"]);
    }

    #[test]
    fn test_parse_rss_titles_empty() {
        assert!(parse_rss_titles("not xml at all").is_empty());
    }
}
