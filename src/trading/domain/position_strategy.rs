use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Side;

/// 建仓策略类型
pub const STRATEGY_FULL: &str = "full"; // 全仓：一次性建仓
pub const STRATEGY_PYRAMID: &str = "pyramid"; // 金字塔：价格下跌时加仓
pub const STRATEGY_GRID: &str = "grid"; // 网格：固定间隔分批
pub const STRATEGY_DCA: &str = "dca"; // 定投：时间分批（预留）

/// 建仓策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionStrategy {
    pub id: String,
    pub cycle_id: String,
    pub signal_id: String,
    pub pair: String,
    pub side: Side,

    /// 策略类型: "full", "pyramid", "grid", "dca"
    pub strategy: String,
    /// 总投入金额 (USDT)
    pub total_amount: f64,
    /// 分批次数
    pub entry_levels: i32,

    /// 分批建仓计划
    pub batches: Vec<PositionBatch>,

    /// 止盈百分比
    pub take_profit_percent: f64,
    /// 止损百分比
    pub stop_loss_percent: f64,

    /// 策略选择理由
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// 单次建仓批次
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionBatch {
    /// 批次编号 (1, 2, 3...)
    pub batch_no: i32,
    /// 触发价格
    pub trigger_price: f64,
    /// 本批次金额 (USDT)
    pub amount: f64,
    /// 占总金额百分比
    pub percentage: f64,
    /// "pending", "executed", "cancelled"
    pub status: String,
    #[serde(default)]
    pub executed_price: f64,
    #[serde(default)]
    pub executed_qty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}
