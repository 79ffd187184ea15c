use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    encode_params, gen_client_order_id, map_exchange_status, pair_to_symbol, sign, Balance,
    ExecutionError, ExecutionInput, Executor, TradeFill,
};
use crate::app_config::Config;
use crate::time_util;
use crate::trading::domain::{Order, Side};

/// 现货执行端：直接调用 Binance 现货 API 下单。
/// 买入按 USDT 金额（quoteOrderQty），卖出按币数量并向下取整到步长。
pub struct SpotExecutor {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    dry_run: bool,
}

impl SpotExecutor {
    pub fn new(cfg: &Config) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.request_timeout_sec))
                .build()
                .unwrap_or_default(),
            base_url: cfg.exchange_base_url.trim_end_matches('/').to_string(),
            api_key: cfg.exchange_api_key.clone(),
            secret_key: cfg.exchange_secret_key.clone(),
            dry_run: cfg.dry_run,
        }
    }

    fn new_order_shell(&self, input: &ExecutionInput) -> Order {
        Order {
            id: Uuid::new_v4().to_string(),
            cycle_id: input.cycle_id.clone(),
            signal_id: input.signal_id.clone(),
            client_order_id: gen_client_order_id(),
            pair: input.pair.clone(),
            side: input.side,
            stake_usdt: input.stake_usdt,
            leverage: 0,
            status: "created".to_string(),
            exchange_order_id: String::new(),
            filled_price: 0.0,
            filled_quantity: 0.0,
            raw_response: String::new(),
            created_at: time_util::now_utc(),
        }
    }

    /// 从公开 API 获取当前价格（dry-run 模拟用）
    async fn fetch_current_price(&self, pair: &str) -> Result<f64> {
        #[derive(Deserialize)]
        struct PriceResult {
            price: String,
        }
        let symbol = pair_to_symbol(pair);
        let url = format!(
            "https://api.binance.com/api/v3/ticker/price?symbol={}",
            symbol
        );
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("Binance price API {}", resp.status().as_u16()));
        }
        let result: PriceResult = resp.json().await?;
        Ok(result.price.parse().unwrap_or(0.0))
    }

    async fn signed_get(&self, path: &str, mut params: Vec<(&str, String)>) -> Result<String> {
        params.push(("timestamp", time_util::now_millis().to_string()));
        let query = encode_params(&params);
        let signature = sign(&self.secret_key, &query);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("Binance HTTP {}: {}", status.as_u16(), body));
        }
        Ok(body)
    }
}

#[async_trait]
impl Executor for SpotExecutor {
    async fn execute(&self, input: ExecutionInput) -> Result<Order, ExecutionError> {
        let mut order = self.new_order_shell(&input);

        // 模拟模式：不调交易所
        if self.dry_run {
            let mut estimated_fill = input.estimated_fill;
            if estimated_fill <= 0.0 {
                if let Ok(price) = self.fetch_current_price(&input.pair).await {
                    if price > 0.0 {
                        estimated_fill = price;
                        info!("[执行] 获取实时价格: {} = {:.8}", input.pair, price);
                    }
                }
            }

            order.status = "simulated_filled".to_string();
            order.exchange_order_id = format!("dryrun-{}", order.id);
            order.filled_price = estimated_fill;
            order.raw_response = r#"{"mode":"dry_run"}"#.to_string();

            if estimated_fill > 0.0 && input.side == Side::Long {
                order.filled_quantity = input.stake_usdt / estimated_fill;
            } else if input.sell_quantity > 0.0 {
                order.filled_quantity = input.sell_quantity;
            }

            let action = if input.side == Side::Close { "卖出" } else { "买入" };
            info!(
                "[执行] 模拟{}: {} {} {:.2} USDT @ {:.8} 数量={:.4}",
                action, input.side, input.pair, input.stake_usdt, estimated_fill, order.filled_quantity
            );
            return Ok(order);
        }

        // 实盘模式：必须有 API 凭据
        if self.api_key.is_empty() || self.secret_key.is_empty() {
            order.status = "rejected".to_string();
            return Err(ExecutionError {
                order,
                message: "交易所 API Key 未配置，无法实盘下单".to_string(),
            });
        }

        let symbol = pair_to_symbol(&input.pair);
        let side = if input.side == Side::Close { "SELL" } else { "BUY" };

        let mut params: Vec<(&str, String)> = vec![
            ("symbol", symbol.clone()),
            ("side", side.to_string()),
            ("type", "MARKET".to_string()),
            ("newClientOrderId", order.client_order_id.clone()),
            ("timestamp", time_util::now_millis().to_string()),
        ];

        if side == "BUY" {
            // 买入：用 quoteOrderQty 按 USDT 金额
            params.push(("quoteOrderQty", format!("{:.2}", input.stake_usdt)));
        } else if input.sell_quantity > 0.0 {
            // 卖出：按币数量，向下取整到交易对步长（Binance LOT_SIZE 要求）
            let (qty_str, qty_floored) = quantity_precision(&symbol, input.sell_quantity);
            let min_qty = min_quantity(&symbol);
            if qty_floored < min_qty {
                order.status = "rejected".to_string();
                warn!(
                    "[执行] 卖出数量不足: {:.8} < 最小交易量 {}，跳过交易",
                    input.sell_quantity, min_qty
                );
                return Err(ExecutionError {
                    order,
                    message: format!(
                        "卖出数量不足: {:.8} {} 低于最小交易量 {}（灰尘持仓无法交易）",
                        input.sell_quantity, symbol, min_qty
                    ),
                });
            }
            info!(
                "[执行] 卖出数量: 原始={:.8} 格式化={}",
                input.sell_quantity, qty_str
            );
            params.push(("quantity", qty_str));
        } else {
            // 没有指定数量，按 USDT 金额估算
            params.push(("quoteOrderQty", format!("{:.2}", input.stake_usdt)));
        }

        // HMAC-SHA256 签名
        let query = encode_params(&params);
        let signature = sign(&self.secret_key, &query);
        let body = format!("{}&signature={}", query, signature);

        info!(
            "[执行] 发送 Binance 订单: {} {} {:.2} USDT",
            side, symbol, input.stake_usdt
        );

        let resp = match self
            .http
            .post(format!("{}/api/v3/order", self.base_url))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("X-MBX-APIKEY", &self.api_key)
            .body(body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                order.status = "failed".to_string();
                return Err(ExecutionError {
                    order,
                    message: format!("Binance 请求失败: {}", e),
                });
            }
        };

        let status = resp.status();
        let resp_body = match resp.text().await {
            Ok(b) => b,
            Err(e) => {
                order.status = "failed".to_string();
                return Err(ExecutionError {
                    order,
                    message: format!("读取响应失败: {}", e),
                });
            }
        };
        order.raw_response = resp_body.clone();

        if status.as_u16() >= 300 {
            order.status = "rejected".to_string();
            warn!("[执行] Binance 拒绝: HTTP {} {}", status.as_u16(), resp_body);
            return Err(ExecutionError {
                order,
                message: format!("Binance HTTP {}: {}", status.as_u16(), resp_body),
            });
        }

        // 解析返回：成交明细加权平均
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Fill {
            price: String,
            qty: String,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct OrderResult {
            #[serde(default)]
            order_id: i64,
            #[serde(default)]
            status: String,
            #[serde(default)]
            fills: Vec<Fill>,
        }

        if let Ok(result) = serde_json::from_str::<OrderResult>(&resp_body) {
            order.exchange_order_id = result.order_id.to_string();
            order.status = map_exchange_status(&result.status);

            let mut total_qty = 0.0;
            let mut total_cost = 0.0;
            for f in &result.fills {
                let p: f64 = f.price.parse().unwrap_or(0.0);
                let q: f64 = f.qty.parse().unwrap_or(0.0);
                total_qty += q;
                total_cost += p * q;
            }
            if total_qty > 0.0 {
                order.filled_price = total_cost / total_qty;
                order.filled_quantity = total_qty;
            }
        }

        info!(
            "[执行] Binance 订单完成: ID={} 状态={} 成交价={:.4}",
            order.exchange_order_id, order.status, order.filled_price
        );
        Ok(order)
    }

    /// 获取账户所有非零余额（过滤 USDT 等计价资产本身，关心的是持仓币种）
    async fn fetch_account_balances(&self) -> Result<Vec<Balance>> {
        let all = self.fetch_full_balance().await?;
        let filtered: Vec<Balance> = all
            .into_iter()
            .filter(|b| b.symbol != "USDT" && b.symbol != "BNB" && b.symbol != "LDUSDT")
            .collect();
        info!("[交易所] 同步到 {} 个币种余额", filtered.len());
        Ok(filtered)
    }

    /// 完整余额（含 USDT、BNB 等所有非零资产）
    async fn fetch_full_balance(&self) -> Result<Vec<Balance>> {
        if self.api_key.is_empty() || self.secret_key.is_empty() {
            return Err(anyhow!("交易所 API Key 未配置"));
        }

        #[derive(Deserialize)]
        struct RawBalance {
            asset: String,
            free: String,
            locked: String,
        }
        #[derive(Deserialize)]
        struct AccountResult {
            balances: Vec<RawBalance>,
        }

        let body = self.signed_get("/api/v3/account", vec![]).await?;
        let result: AccountResult =
            serde_json::from_str(&body).map_err(|e| anyhow!("解析响应失败: {}", e))?;

        let balances = result
            .balances
            .into_iter()
            .filter_map(|b| {
                let free: f64 = b.free.parse().unwrap_or(0.0);
                let locked: f64 = b.locked.parse().unwrap_or(0.0);
                let total = free + locked;
                (total > 0.0).then_some(Balance {
                    symbol: b.asset,
                    free,
                    locked,
                    total,
                })
            })
            .collect();
        Ok(balances)
    }

    /// 指定交易对的成交历史（最多 N 笔）
    async fn fetch_trade_history(&self, pair: &str, limit: i64) -> Result<Vec<TradeFill>> {
        if self.api_key.is_empty() || self.secret_key.is_empty() {
            return Err(anyhow!("交易所 API Key 未配置"));
        }
        let limit = if limit <= 0 || limit > 1000 { 500 } else { limit };

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawTrade {
            id: i64,
            order_id: i64,
            price: String,
            qty: String,
            quote_qty: String,
            time: i64,
            is_buyer: bool,
        }

        let symbol = pair_to_symbol(pair);
        let body = self
            .signed_get(
                "/api/v3/myTrades",
                vec![("symbol", symbol.clone()), ("limit", limit.to_string())],
            )
            .await?;
        let raw: Vec<RawTrade> =
            serde_json::from_str(&body).map_err(|e| anyhow!("解析响应失败: {}", e))?;

        let trades: Vec<TradeFill> = raw
            .into_iter()
            .map(|r| TradeFill {
                trade_id: r.id,
                order_id: r.order_id,
                symbol: symbol.clone(),
                price: r.price.parse().unwrap_or(0.0),
                quantity: r.qty.parse().unwrap_or(0.0),
                quote_qty: r.quote_qty.parse().unwrap_or(0.0),
                is_buyer: r.is_buyer,
                timestamp: DateTime::from_timestamp_millis(r.time)
                    .unwrap_or(DateTime::UNIX_EPOCH),
            })
            .collect();

        info!("[交易所] 获取 {} 成交记录 {} 笔", pair, trades.len());
        Ok(trades)
    }

    /// 现货模式不支持，返回 0
    async fn fetch_position_risk(&self, _pair: &str) -> Result<f64> {
        Ok(0.0)
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn trading_mode(&self) -> &'static str {
        "spot"
    }

    fn leverage(&self) -> i32 {
        1
    }
}

/// 交易对的最小交易数量（Binance 各交易对 minQty 不同）
pub fn min_quantity(symbol: &str) -> f64 {
    let sym = symbol.to_uppercase();
    if sym.starts_with("DOGE") {
        1.0
    } else if sym.starts_with("XRP") {
        1.0
    } else if sym.starts_with("BNB") || sym.starts_with("SOL") {
        0.01
    } else if sym.starts_with("ETH") {
        0.0001
    } else if sym.starts_with("BTC") {
        0.00001
    } else {
        1.0
    }
}

/// 按交易对步长向下取整，返回 (格式化字符串, 取整后数值)。
/// Binance LOT_SIZE：DOGEUSDT stepSize=1，XRPUSDT stepSize=0.1，BTCUSDT stepSize=0.00001
pub fn quantity_precision(symbol: &str, qty: f64) -> (String, f64) {
    let sym = symbol.to_uppercase();
    let decimals: usize = if sym.starts_with("DOGE") {
        0
    } else if sym.starts_with("XRP") {
        1
    } else if sym.starts_with("BNB") || sym.starts_with("SOL") {
        2
    } else if sym.starts_with("ETH") {
        4
    } else if sym.starts_with("BTC") {
        5
    } else {
        2
    };
    let factor = 10f64.powi(decimals as i32);
    let floored = (qty * factor).floor() / factor;
    (format!("{:.*}", decimals, floored), floored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_precision_floor() {
        let (s, v) = quantity_precision("DOGEUSDT", 123.789);
        assert_eq!(s, "123");
        assert_eq!(v, 123.0);

        let (s, v) = quantity_precision("XRPUSDT", 5.678);
        assert_eq!(s, "5.6");
        assert!((v - 5.6).abs() < 1e-9);

        let (s, v) = quantity_precision("BTCUSDT", 0.0000199);
        assert_eq!(s, "0.00001");
        assert!((v - 0.00001).abs() < 1e-12);

        let (s, _) = quantity_precision("ETHUSDT", 1.23456789);
        assert_eq!(s, "1.2345");

        let (s, _) = quantity_precision("SOLUSDT", 3.999);
        assert_eq!(s, "3.99");
    }

    #[test]
    fn test_quantity_precision_never_exceeds_input() {
        for (sym, qty) in [
            ("DOGEUSDT", 0.7),
            ("XRPUSDT", 12.345),
            ("BTCUSDT", 0.123456),
            ("ETHUSDT", 2.00009),
        ] {
            let (_, v) = quantity_precision(sym, qty);
            assert!(v <= qty);
        }
    }

    #[test]
    fn test_min_quantity_table() {
        assert_eq!(min_quantity("DOGEUSDT"), 1.0);
        assert_eq!(min_quantity("XRPUSDT"), 1.0);
        assert_eq!(min_quantity("BNBUSDT"), 0.01);
        assert_eq!(min_quantity("SOLUSDT"), 0.01);
        assert_eq!(min_quantity("ETHUSDT"), 0.0001);
        assert_eq!(min_quantity("BTCUSDT"), 0.00001);
    }

    fn live_executor() -> SpotExecutor {
        let cfg = Config {
            dry_run: false,
            exchange_api_key: "key".to_string(),
            exchange_secret_key: "secret".to_string(),
            // 指向不存在的地址，测试路径不应发起任何请求
            exchange_base_url: "http://127.0.0.1:1".to_string(),
            ..Config::default()
        };
        SpotExecutor::new(&cfg)
    }

    #[tokio::test]
    async fn test_dust_sell_rejected_without_network() {
        let executor = live_executor();
        // DOGE 0.7 向下取整为 0，低于最小交易量 1 → 灰尘持仓拒绝
        let err = executor
            .execute(ExecutionInput {
                cycle_id: "cyc-1".to_string(),
                signal_id: "sig-1".to_string(),
                pair: "DOGE/USDT".to_string(),
                side: Side::Close,
                stake_usdt: 0.0,
                estimated_fill: 0.07,
                sell_quantity: 0.7,
            })
            .await
            .unwrap_err();
        assert_eq!(err.order.status, "rejected");
        assert!(err.message.contains("灰尘"));
    }

    #[tokio::test]
    async fn test_live_without_credentials_rejected() {
        let cfg = Config {
            dry_run: false,
            ..Config::default()
        };
        let executor = SpotExecutor::new(&cfg);
        let err = executor
            .execute(ExecutionInput {
                cycle_id: "cyc-1".to_string(),
                signal_id: "sig-1".to_string(),
                pair: "DOGE/USDT".to_string(),
                side: Side::Long,
                stake_usdt: 50.0,
                estimated_fill: 0.1,
                sell_quantity: 0.0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.order.status, "rejected");
        assert!(err.message.contains("API Key"));
    }

    #[tokio::test]
    async fn test_dry_run_long_fill() {
        let executor = SpotExecutor::new(&Config::default());
        let order = executor
            .execute(ExecutionInput {
                cycle_id: "cyc-1".to_string(),
                signal_id: "sig-1".to_string(),
                pair: "DOGE/USDT".to_string(),
                side: Side::Long,
                stake_usdt: 50.0,
                estimated_fill: 0.10,
                sell_quantity: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(order.status, "simulated_filled");
        assert!((order.filled_price - 0.10).abs() < 1e-12);
        assert!((order.filled_quantity - 500.0).abs() < 1e-9);
        assert_eq!(order.leverage, 0);
    }
}
