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

/// 合约执行端：Binance USDT-M 永续合约，只做多。
/// 开仓数量 = 保证金 × 杠杆 / 预估价；平仓用 reduceOnly + 显式数量。
pub struct FuturesExecutor {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    dry_run: bool,
    leverage: i32,
    /// "CROSSED" 或 "ISOLATED"
    margin_type: String,
}

impl FuturesExecutor {
    /// 创建合约执行端。实盘模式下为每个配置的交易对预设杠杆与保证金模式。
    pub async fn new(cfg: &Config) -> Self {
        let mut leverage = cfg.futures_leverage;
        // 限制杠杆范围 1-20
        if leverage < 1 {
            leverage = 3;
        }
        if leverage > 20 {
            leverage = 20;
        }

        let e = Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.request_timeout_sec))
                .build()
                .unwrap_or_default(),
            base_url: cfg.futures_base_url.trim_end_matches('/').to_string(),
            api_key: cfg.exchange_api_key.clone(),
            secret_key: cfg.exchange_secret_key.clone(),
            dry_run: cfg.dry_run,
            leverage,
            margin_type: cfg.futures_margin_type.clone(),
        };

        info!(
            "[合约] 初始化: baseURL={} 杠杆={}x 保证金={} dryRun={}",
            e.base_url, e.leverage, e.margin_type, e.dry_run
        );

        // 非 dry-run 且有 API Key 时，自动设置杠杆和保证金模式
        if !e.dry_run && !e.api_key.is_empty() {
            for pair in cfg.auto_run_pairs.split(',') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                let symbol = pair_to_symbol(pair);
                e.setup_leverage(&symbol).await;
                e.setup_margin_type(&symbol).await;
            }
        }

        e
    }

    /// 设置交易对的杠杆倍数
    async fn setup_leverage(&self, symbol: &str) {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("leverage", self.leverage.to_string()),
            ("timestamp", time_util::now_millis().to_string()),
        ];
        match self.signed_post("/fapi/v1/leverage", params).await {
            Ok(_) => info!("[合约] 杠杆已设置 {}: {}x", symbol, self.leverage),
            Err(e) => warn!("[合约] 设置杠杆失败 {}: {}", symbol, e),
        }
    }

    /// 设置保证金模式（全仓/逐仓）。
    /// -4046 = "No need to change margin type"，已经是目标模式，不算错误。
    async fn setup_margin_type(&self, symbol: &str) {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("marginType", self.margin_type.clone()),
            ("timestamp", time_util::now_millis().to_string()),
        ];
        match self.signed_post("/fapi/v1/marginType", params).await {
            Ok(_) => info!("[合约] 保证金模式已设置 {}: {}", symbol, self.margin_type),
            Err(e) => {
                if e.to_string().contains("-4046") {
                    info!("[合约] 保证金模式已设置 {}: {}", symbol, self.margin_type);
                } else {
                    warn!("[合约] 设置保证金模式失败 {}: {}", symbol, e);
                }
            }
        }
    }

    async fn signed_post(&self, path: &str, params: Vec<(&str, String)>) -> Result<String> {
        let query = encode_params(&params);
        let signature = sign(&self.secret_key, &query);
        let body = format!("{}&signature={}", query, signature);

        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("X-MBX-APIKEY", &self.api_key)
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if status.as_u16() >= 300 {
            return Err(anyhow!("HTTP {}: {}", status.as_u16(), text));
        }
        Ok(text)
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
        let text = resp.text().await?;
        if status.as_u16() >= 300 {
            return Err(anyhow!("HTTP {}: {}", status.as_u16(), text));
        }
        Ok(text)
    }

    /// 从公共 API 获取合约最新价格
    async fn fetch_current_price(&self, pair: &str) -> Result<f64> {
        #[derive(Deserialize)]
        struct PriceResult {
            price: String,
        }
        let symbol = pair_to_symbol(pair);
        let url = format!("{}/fapi/v1/ticker/price?symbol={}", self.base_url, symbol);
        let resp = self.http.get(&url).send().await?;
        let result: PriceResult = resp.json().await?;
        Ok(result.price.parse().unwrap_or(0.0))
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
            leverage: self.leverage,
            status: "created".to_string(),
            exchange_order_id: String::new(),
            filled_price: 0.0,
            filled_quantity: 0.0,
            raw_response: String::new(),
            created_at: time_util::now_utc(),
        }
    }
}

#[async_trait]
impl Executor for FuturesExecutor {
    async fn execute(&self, input: ExecutionInput) -> Result<Order, ExecutionError> {
        let mut order = self.new_order_shell(&input);

        // 模拟模式
        if self.dry_run {
            let mut estimated_fill = input.estimated_fill;
            if estimated_fill <= 0.0 {
                if let Ok(price) = self.fetch_current_price(&input.pair).await {
                    if price > 0.0 {
                        estimated_fill = price;
                        info!("[合约] 获取实时价格: {} = {:.8}", input.pair, price);
                    }
                }
            }

            order.status = "simulated_filled".to_string();
            order.exchange_order_id = format!("dryrun-futures-{}", order.id);
            order.filled_price = estimated_fill;
            order.raw_response = format!(r#"{{"mode":"dry_run","leverage":{}}}"#, self.leverage);

            if estimated_fill > 0.0 && input.side == Side::Long {
                // 合约：保证金 * 杠杆 / 价格 = 开仓数量
                order.filled_quantity =
                    input.stake_usdt * self.leverage as f64 / estimated_fill;
            } else if input.sell_quantity > 0.0 {
                order.filled_quantity = input.sell_quantity;
            }

            let action = if input.side == Side::Close { "平仓" } else { "开多" };
            info!(
                "[合约] 模拟{}: {} {} 保证金={:.2} USDT x{} @ {:.8} 数量={:.4}",
                action,
                input.side,
                input.pair,
                input.stake_usdt,
                self.leverage,
                estimated_fill,
                order.filled_quantity
            );
            return Ok(order);
        }

        // 实盘模式
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
            // 开多：保证金 * 杠杆计算开仓数量；没有预估价格无法定量
            if input.estimated_fill <= 0.0 {
                order.status = "rejected".to_string();
                return Err(ExecutionError {
                    order,
                    message: "无法计算开仓数量：缺少价格数据".to_string(),
                });
            }
            let raw_qty = input.stake_usdt * self.leverage as f64 / input.estimated_fill;
            let (qty, _) = futures_quantity_precision(&symbol, raw_qty);
            info!(
                "[合约] 开多数量: 保证金={:.2} x{} / 价格={:.8} = {}",
                input.stake_usdt, self.leverage, input.estimated_fill, qty
            );
            params.push(("quantity", qty));
        } else {
            // 平仓：reduceOnly + 显式数量
            params.push(("reduceOnly", "true".to_string()));
            if input.sell_quantity <= 0.0 {
                order.status = "rejected".to_string();
                return Err(ExecutionError {
                    order,
                    message: "平仓缺少数量参数".to_string(),
                });
            }
            let (qty, _) = futures_quantity_precision(&symbol, input.sell_quantity);
            info!("[合约] 平仓数量: {}", qty);
            params.push(("quantity", qty));
        }

        // HMAC-SHA256 签名（与现货完全一致）
        let query = encode_params(&params);
        let signature = sign(&self.secret_key, &query);
        let body = format!("{}&signature={}", query, signature);

        info!(
            "[合约] 发送 Binance 合约订单: {} {} 保证金={:.2} USDT x{}",
            side, symbol, input.stake_usdt, self.leverage
        );

        let resp = match self
            .http
            .post(format!("{}/fapi/v1/order", self.base_url))
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
            warn!("[合约] Binance 拒绝: HTTP {} {}", status.as_u16(), resp_body);
            return Err(ExecutionError {
                order,
                message: format!("Binance HTTP {}: {}", status.as_u16(), resp_body),
            });
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct OrderResult {
            #[serde(default)]
            order_id: i64,
            #[serde(default)]
            status: String,
            #[serde(default)]
            avg_price: String,
            #[serde(default)]
            executed_qty: String,
        }

        if let Ok(result) = serde_json::from_str::<OrderResult>(&resp_body) {
            order.exchange_order_id = result.order_id.to_string();
            order.status = map_exchange_status(&result.status);
            if let Ok(p) = result.avg_price.parse::<f64>() {
                order.filled_price = p;
            }
            if let Ok(q) = result.executed_qty.parse::<f64>() {
                order.filled_quantity = q;
            }
        }

        let action = if input.side == Side::Close { "平仓" } else { "开多" };
        info!(
            "[合约] {}成功: {} {} 价格={:.8} 数量={:.4} x{} 状态={}",
            action, side, symbol, order.filled_price, order.filled_quantity, self.leverage, order.status
        );
        Ok(order)
    }

    /// 合约账户 USDT 余额
    async fn fetch_account_balances(&self) -> Result<Vec<Balance>> {
        self.fetch_futures_balance(false).await
    }

    /// 合约账户所有余额
    async fn fetch_full_balance(&self) -> Result<Vec<Balance>> {
        self.fetch_futures_balance(true).await
    }

    /// 合约交易记录
    async fn fetch_trade_history(&self, pair: &str, limit: i64) -> Result<Vec<TradeFill>> {
        if self.dry_run {
            return Ok(Vec::new());
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawTrade {
            id: i64,
            order_id: i64,
            symbol: String,
            price: String,
            qty: String,
            quote_qty: String,
            buyer: bool,
            time: i64,
        }

        let symbol = pair_to_symbol(pair);
        let body = self
            .signed_get(
                "/fapi/v1/userTrades",
                vec![("symbol", symbol), ("limit", limit.to_string())],
            )
            .await?;
        let raw: Vec<RawTrade> =
            serde_json::from_str(&body).map_err(|e| anyhow!("解析响应失败: {}", e))?;

        let trades: Vec<TradeFill> = raw
            .into_iter()
            .map(|r| TradeFill {
                trade_id: r.id,
                order_id: r.order_id,
                symbol: r.symbol,
                price: r.price.parse().unwrap_or(0.0),
                quantity: r.qty.parse().unwrap_or(0.0),
                quote_qty: r.quote_qty.parse().unwrap_or(0.0),
                is_buyer: r.buyer,
                timestamp: DateTime::from_timestamp_millis(r.time)
                    .unwrap_or(DateTime::UNIX_EPOCH),
            })
            .collect();

        info!("[合约] 获取 {} 成交记录 {} 笔", pair, trades.len());
        Ok(trades)
    }

    /// 从合约 API 获取持仓数量（净头寸绝对值，无持仓返回 0）
    async fn fetch_position_risk(&self, pair: &str) -> Result<f64> {
        if self.dry_run {
            return Ok(0.0);
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawPosition {
            symbol: String,
            position_amt: String,
        }

        let symbol = pair_to_symbol(pair);
        let body = self
            .signed_get("/fapi/v2/positionRisk", vec![("symbol", symbol.clone())])
            .await?;
        let positions: Vec<RawPosition> =
            serde_json::from_str(&body).map_err(|e| anyhow!("解析响应失败: {}", e))?;

        for p in positions {
            if p.symbol.eq_ignore_ascii_case(&symbol) {
                let amt: f64 = p.position_amt.parse().unwrap_or(0.0);
                return Ok(amt.abs());
            }
        }
        Ok(0.0)
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn trading_mode(&self) -> &'static str {
        "futures"
    }

    fn leverage(&self) -> i32 {
        self.leverage
    }
}

impl FuturesExecutor {
    async fn fetch_futures_balance(&self, include_all: bool) -> Result<Vec<Balance>> {
        if self.dry_run {
            return Ok(vec![Balance {
                symbol: "USDT".to_string(),
                free: 1000.0,
                locked: 0.0,
                total: 1000.0,
            }]);
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawBalance {
            asset: String,
            balance: String,
            available_balance: String,
        }

        let body = self.signed_get("/fapi/v2/balance", vec![]).await?;
        let raw: Vec<RawBalance> =
            serde_json::from_str(&body).map_err(|e| anyhow!("解析响应失败: {}", e))?;

        let balances = raw
            .into_iter()
            .filter_map(|b| {
                let total: f64 = b.balance.parse().unwrap_or(0.0);
                let free: f64 = b.available_balance.parse().unwrap_or(0.0);
                if !include_all && total == 0.0 {
                    return None;
                }
                (include_all || b.asset == "USDT" || total > 0.0).then_some(Balance {
                    symbol: b.asset,
                    free,
                    locked: total - free,
                    total,
                })
            })
            .collect();
        Ok(balances)
    }
}

/// 合约数量精度（与现货类似但 ETH/BTC 都是 3 位小数）
pub fn futures_quantity_precision(symbol: &str, qty: f64) -> (String, f64) {
    let sym = symbol.to_uppercase();
    let decimals: usize = if sym.starts_with("DOGE") {
        0
    } else if sym.starts_with("XRP") {
        1
    } else if sym.starts_with("BNB") || sym.starts_with("SOL") {
        2
    } else if sym.starts_with("ETH") || sym.starts_with("BTC") {
        3
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
    fn test_futures_precision_table() {
        assert_eq!(futures_quantity_precision("DOGEUSDT", 123.789).0, "123");
        assert_eq!(futures_quantity_precision("XRPUSDT", 5.678).0, "5.6");
        assert_eq!(futures_quantity_precision("ETHUSDT", 1.23456).0, "1.234");
        assert_eq!(futures_quantity_precision("BTCUSDT", 0.0459).0, "0.045");
        assert_eq!(futures_quantity_precision("SOLUSDT", 3.999).0, "3.99");
    }

    #[tokio::test]
    async fn test_leverage_clamped() {
        let cfg = Config {
            futures_leverage: 50,
            ..Config::default()
        };
        let e = FuturesExecutor::new(&cfg).await;
        assert_eq!(e.leverage(), 20);

        let cfg = Config {
            futures_leverage: 0,
            ..Config::default()
        };
        let e = FuturesExecutor::new(&cfg).await;
        assert_eq!(e.leverage(), 3);
    }

    #[tokio::test]
    async fn test_dry_run_open_sizing() {
        // 保证金 20 x5 / 价格 50 = 数量 2
        let cfg = Config {
            futures_leverage: 5,
            ..Config::default()
        };
        let e = FuturesExecutor::new(&cfg).await;
        let order = e
            .execute(ExecutionInput {
                cycle_id: "cyc-1".to_string(),
                signal_id: "sig-1".to_string(),
                pair: "ETH/USDT".to_string(),
                side: Side::Long,
                stake_usdt: 20.0,
                estimated_fill: 50.0,
                sell_quantity: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(order.status, "simulated_filled");
        assert_eq!(order.leverage, 5);
        assert!((order.filled_quantity - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_live_open_without_price_rejected() {
        let cfg = Config {
            dry_run: false,
            exchange_api_key: "key".to_string(),
            exchange_secret_key: "secret".to_string(),
            futures_base_url: "http://127.0.0.1:1".to_string(),
            auto_run_pairs: String::new(),
            ..Config::default()
        };
        let e = FuturesExecutor::new(&cfg).await;
        let err = e
            .execute(ExecutionInput {
                cycle_id: "cyc-1".to_string(),
                signal_id: "sig-1".to_string(),
                pair: "ETH/USDT".to_string(),
                side: Side::Long,
                stake_usdt: 20.0,
                estimated_fill: 0.0,
                sell_quantity: 0.0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.order.status, "rejected");
        assert!(err.message.contains("缺少价格"));
    }

    #[tokio::test]
    async fn test_live_close_without_quantity_rejected() {
        let cfg = Config {
            dry_run: false,
            exchange_api_key: "key".to_string(),
            exchange_secret_key: "secret".to_string(),
            futures_base_url: "http://127.0.0.1:1".to_string(),
            auto_run_pairs: String::new(),
            ..Config::default()
        };
        let e = FuturesExecutor::new(&cfg).await;
        let err = e
            .execute(ExecutionInput {
                cycle_id: "cyc-1".to_string(),
                signal_id: "sig-1".to_string(),
                pair: "ETH/USDT".to_string(),
                side: Side::Close,
                stake_usdt: 0.0,
                estimated_fill: 50.0,
                sell_quantity: 0.0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.order.status, "rejected");
        assert!(err.message.contains("平仓缺少数量"));
    }
}
