pub mod futures;
pub mod spot;

pub use futures::FuturesExecutor;
pub use spot::SpotExecutor;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::trading::domain::{Order, Side};

/// 下单输入
#[derive(Debug, Clone)]
pub struct ExecutionInput {
    pub cycle_id: String,
    pub signal_id: String,
    pub pair: String,
    pub side: Side,
    pub stake_usdt: f64,
    /// 预估成交价（有行情时传入，避免额外请求）
    pub estimated_fill: f64,
    /// 卖出时的币数量（close 信号用）
    pub sell_quantity: f64,
}

/// 交易所账户余额
#[derive(Debug, Clone)]
pub struct Balance {
    /// 如 DOGE
    pub symbol: String,
    /// 可用余额
    pub free: f64,
    /// 冻结余额
    pub locked: f64,
    /// Free + Locked
    pub total: f64,
}

/// 交易所成交记录
#[derive(Debug, Clone)]
pub struct TradeFill {
    pub trade_id: i64,
    pub order_id: i64,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub quote_qty: f64,
    pub is_buyer: bool,
    pub timestamp: DateTime<Utc>,
}

/// 执行失败：订单记录仍然返回（带 rejected/failed 状态），
/// 由协调器无条件落库后把周期标记为失败。
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub order: Order,
    pub message: String,
}

/// 执行端能力集合。现货与合约两种实现，按配置选择其一。
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, input: ExecutionInput) -> Result<Order, ExecutionError>;

    /// 持仓币种余额（过滤计价资产本身）
    async fn fetch_account_balances(&self) -> Result<Vec<Balance>>;

    /// 完整余额（含 USDT 等所有非零资产）
    async fn fetch_full_balance(&self) -> Result<Vec<Balance>>;

    async fn fetch_trade_history(&self, pair: &str, limit: i64) -> Result<Vec<TradeFill>>;

    /// 合约持仓数量（现货返回 0）
    async fn fetch_position_risk(&self, pair: &str) -> Result<f64>;

    fn is_dry_run(&self) -> bool;

    /// "spot" 或 "futures"
    fn trading_mode(&self) -> &'static str;

    /// 杠杆倍数，现货=1
    fn leverage(&self) -> i32;
}

/// 生成进程内唯一的短 client order id
pub fn gen_client_order_id() -> String {
    format!("aq{}", &Uuid::new_v4().simple().to_string()[..8])
}

/// HMAC-SHA256 对请求参数签名，十六进制输出
pub fn sign(secret_key: &str, query_string: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret_key.as_bytes())
        .unwrap_or_else(|_| Hmac::<Sha256>::new_from_slice(b"\0").expect("hmac init"));
    mac.update(query_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// 参数表编码为 query string（k=v&k=v，按插入顺序）
pub fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// 将交易所订单状态映射为内部状态
pub fn map_exchange_status(s: &str) -> String {
    match s {
        "FILLED" => "filled".to_string(),
        "PARTIALLY_FILLED" => "partial_filled".to_string(),
        "NEW" => "submitted".to_string(),
        "CANCELED" | "REJECTED" | "EXPIRED" => "rejected".to_string(),
        other => other.to_string(),
    }
}

/// "BTC/USDT" → "BTCUSDT"
pub fn pair_to_symbol(pair: &str) -> String {
    pair.to_uppercase().chars().filter(|c| *c != '/').collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_client_order_id_unique_and_short() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = gen_client_order_id();
            assert!(id.starts_with("aq"));
            assert_eq!(id.len(), 10);
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn test_map_exchange_status() {
        assert_eq!(map_exchange_status("FILLED"), "filled");
        assert_eq!(map_exchange_status("PARTIALLY_FILLED"), "partial_filled");
        assert_eq!(map_exchange_status("NEW"), "submitted");
        assert_eq!(map_exchange_status("CANCELED"), "rejected");
        assert_eq!(map_exchange_status("REJECTED"), "rejected");
        assert_eq!(map_exchange_status("EXPIRED"), "rejected");
        assert_eq!(map_exchange_status("UNKNOWN_X"), "UNKNOWN_X");
    }

    #[test]
    fn test_pair_to_symbol() {
        assert_eq!(pair_to_symbol("doge/usdt"), "DOGEUSDT");
        assert_eq!(pair_to_symbol("BTC/USDT"), "BTCUSDT");
    }

    #[test]
    fn test_sign_known_vector() {
        // Binance 文档示例密钥与参数
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            sign(secret, query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_encode_params_order_preserved() {
        let params = vec![
            ("symbol", "DOGEUSDT".to_string()),
            ("side", "BUY".to_string()),
        ];
        assert_eq!(encode_params(&params), "symbol=DOGEUSDT&side=BUY");
    }
}
