pub mod position_strategy;

pub use position_strategy::{PositionBatch, PositionStrategy};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 信号方向
///
/// short 在域模型中保留但当前策略下禁用：标准化时永远不会从模型输出合成 short
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
    Close,
    None,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
            Side::Close => "close",
            Side::None => "none",
        }
    }

    pub fn from_str(s: &str) -> Side {
        match s {
            "long" => Side::Long,
            "short" => Side::Short,
            "close" => Side::Close,
            _ => Side::None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 周期状态：running 只能前进到 success / rejected / failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Running,
    Rejected,
    Success,
    Failed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Running => "running",
            CycleStatus::Rejected => "rejected",
            CycleStatus::Success => "success",
            CycleStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> CycleStatus {
        match s {
            "rejected" => CycleStatus::Rejected,
            "success" => CycleStatus::Success,
            "failed" => CycleStatus::Failed,
            _ => CycleStatus::Running,
        }
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次完整的决策周期
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: String,
    pub pair: String,
    pub status: CycleStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 外部传入的行情快照（定时器触发时为空，由协调器快速补价）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub pair: String,
    pub last_price: f64,
    pub change_24h: f64,
    pub volume_24h: f64,
    pub funding_rate: f64,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn empty(pair: &str) -> Self {
        Self {
            pair: pair.to_string(),
            last_price: 0.0,
            change_24h: 0.0,
            volume_24h: 0.0,
            funding_rate: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// 信号：大模型或规则引擎给出的方向判断
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub cycle_id: String,
    pub pair: String,
    pub side: Side,
    pub confidence: f64,
    pub reason: String,
    /// AI 思维链
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub model_name: String,
    pub ttl_seconds: i64,
    pub created_at: DateTime<Utc>,
}

/// 组合状态，风控输入
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PortfolioState {
    pub daily_pnl_usdt: f64,
    pub open_exposure_usdt: f64,
}

/// 风控决策
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub id: String,
    pub cycle_id: String,
    pub signal_id: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reject_reason: String,
    pub max_stake_usdt: f64,
    pub created_at: DateTime<Utc>,
}

/// 订单记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub cycle_id: String,
    pub signal_id: String,
    pub client_order_id: String,
    pub pair: String,
    pub side: Side,
    pub stake_usdt: f64,
    /// 杠杆倍数，现货=0
    pub leverage: i32,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exchange_order_id: String,
    pub filled_price: f64,
    #[serde(rename = "filled_qty")]
    pub filled_quantity: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_response: String,
    pub created_at: DateTime<Utc>,
}

/// 审计日志：按自增 id 排序即为周期的标准回放顺序
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleLog {
    pub id: i64,
    pub cycle_id: String,
    pub stage: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// 完整周期报告（审计视图）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: Cycle,
    pub signal: Option<Signal>,
    pub risk: Option<RiskDecision>,
    pub position_strategy: Option<PositionStrategy>,
    pub order: Option<Order>,
    pub logs: Vec<CycleLog>,
}

/// 单次周期执行的返回值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle: Cycle,
    pub signal: Signal,
    pub risk: RiskDecision,
    pub order: Option<Order>,
    pub logs: Vec<CycleLog>,
}

/// 周期列表摘要视图（用于分页列表展示）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: String,
    pub pair: String,
    pub status: CycleStatus,
    pub signal_side: Side,
    pub confidence: f64,
    pub signal_reason: String,
    pub total_tokens: i64,
    pub model_name: String,
    pub risk_approved: Option<bool>,
    pub reject_reason: String,
    pub stake_usdt: f64,
    pub filled_price: f64,
    pub order_status: String,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

/// 当前持仓快照（按币对聚合）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub id: i64,
    /// 如 DOGE/USDT
    pub pair: String,
    /// 如 DOGE
    pub symbol: String,
    pub quantity: f64,
    /// 平均买入价格；交易所同步来源时为 0（交易所不返回成本价）
    pub avg_price: f64,
    pub total_cost: f64,
    /// "local"=订单聚合, "exchange"=交易所同步
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

/// 持仓展示视图（附实时行情数据）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingView {
    #[serde(flatten)]
    pub holding: Holding,
    pub current_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub pnl_percent: f64,
}

/// 订单的聚合视图，用于展示当前仓位
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    pub order_id: String,
    pub cycle_id: String,
    pub pair: String,
    pub side: Side,
    pub stake_usdt: f64,
    pub filled_price: f64,
    #[serde(rename = "filled_qty")]
    pub filled_quantity: f64,
    pub status: String,
    pub exchange_order_id: String,
    pub signal_reason: String,
    pub confidence: f64,
    pub cycle_status: String,
    pub created_at: DateTime<Utc>,
}

/// 账户余额视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub symbol: String,
    pub free: f64,
    pub locked: f64,
    pub total: f64,
}

/// 当前交易模式信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingInfo {
    pub mode: String,
    pub leverage: i32,
    pub dry_run: bool,
}
