use tracing::info;
use uuid::Uuid;

use crate::time_util;
use crate::trading::domain::position_strategy::{
    STRATEGY_FULL, STRATEGY_GRID, STRATEGY_PYRAMID,
};
use crate::trading::domain::{PositionBatch, PositionStrategy, Side, Signal};

/// 建仓策略输入
pub struct PositionInput<'a> {
    pub cycle_id: &'a str,
    pub signal_id: &'a str,
    pub pair: &'a str,
    pub side: Side,
    pub signal: &'a Signal,
    pub max_stake_usdt: f64,
    pub current_price: f64,
}

/// 建仓策略生成器：按信号置信度把预算映射为分批计划
pub struct PositionAgent {
    /// 最小单批金额
    min_batch_amount: f64,
}

impl PositionAgent {
    pub fn new() -> Self {
        Self {
            min_batch_amount: 10.0,
        }
    }

    /// 生成建仓策略。所有批次初始状态 pending；
    /// 平仓信号返回空批次的平凡策略，由执行端直接卖出持仓。
    pub fn generate(&self, input: PositionInput<'_>) -> PositionStrategy {
        if input.side == Side::Close {
            return PositionStrategy {
                id: generate_id(),
                cycle_id: input.cycle_id.to_string(),
                signal_id: input.signal_id.to_string(),
                pair: input.pair.to_string(),
                side: input.side,
                strategy: STRATEGY_FULL.to_string(),
                total_amount: 0.0,
                entry_levels: 1,
                batches: Vec::new(),
                take_profit_percent: 0.0,
                stop_loss_percent: 0.0,
                reason: "平仓操作，无需建仓策略".to_string(),
                created_at: time_util::now_utc(),
            };
        }

        let confidence = input.signal.confidence;
        let strategy = select_strategy(confidence);

        let (batches, reason, take_profit_percent, stop_loss_percent) = match strategy {
            STRATEGY_FULL => (
                full_batches(input.max_stake_usdt, input.current_price),
                format!("高置信度({:.2})，采用全仓策略一次性建仓", confidence),
                5.0,
                2.0,
            ),
            STRATEGY_PYRAMID => (
                pyramid_batches(input.max_stake_usdt, input.current_price),
                format!("中等置信度({:.2})，采用金字塔策略分批建仓，降低风险", confidence),
                8.0,
                3.0,
            ),
            _ => (
                grid_batches(input.max_stake_usdt, input.current_price),
                format!("置信度({:.2})较低或震荡行情，采用网格策略分散风险", confidence),
                10.0,
                4.0,
            ),
        };

        info!(
            "[建仓策略] {} 策略={} 总金额={:.2} 分批={} 止盈={:.1}% 止损={:.1}% 最小单批={:.0}",
            input.pair,
            strategy,
            input.max_stake_usdt,
            batches.len(),
            take_profit_percent,
            stop_loss_percent,
            self.min_batch_amount,
        );

        PositionStrategy {
            id: generate_id(),
            cycle_id: input.cycle_id.to_string(),
            signal_id: input.signal_id.to_string(),
            pair: input.pair.to_string(),
            side: input.side,
            strategy: strategy.to_string(),
            total_amount: input.max_stake_usdt,
            entry_levels: batches.len() as i32,
            batches,
            take_profit_percent,
            stop_loss_percent,
            reason,
            created_at: time_util::now_utc(),
        }
    }
}

impl Default for PositionAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// 按置信度选择策略；档位边界含上界（0.75 → full，0.60 → pyramid）
fn select_strategy(confidence: f64) -> &'static str {
    if confidence >= 0.75 {
        STRATEGY_FULL
    } else if confidence >= 0.60 {
        STRATEGY_PYRAMID
    } else {
        STRATEGY_GRID
    }
}

/// 全仓策略：一次性建仓
fn full_batches(total_amount: f64, current_price: f64) -> Vec<PositionBatch> {
    vec![PositionBatch {
        batch_no: 1,
        trigger_price: current_price,
        amount: total_amount,
        percentage: 100.0,
        status: "pending".to_string(),
        executed_price: 0.0,
        executed_qty: 0.0,
        executed_at: None,
    }]
}

/// 金字塔策略：首批 50%，下跌 2%/4% 时各加 30%/20%
fn pyramid_batches(total_amount: f64, current_price: f64) -> Vec<PositionBatch> {
    let plan = [(1, 1.00, 0.50, 50.0), (2, 0.98, 0.30, 30.0), (3, 0.96, 0.20, 20.0)];
    plan.iter()
        .map(|(no, price_factor, share, pct)| PositionBatch {
            batch_no: *no,
            trigger_price: current_price * price_factor,
            amount: total_amount * share,
            percentage: *pct,
            status: "pending".to_string(),
            executed_price: 0.0,
            executed_qty: 0.0,
            executed_at: None,
        })
        .collect()
}

/// 网格策略：5 批均分，价格间隔 1%
fn grid_batches(total_amount: f64, current_price: f64) -> Vec<PositionBatch> {
    let num_batches = 5;
    let amount_per_batch = total_amount / num_batches as f64;
    (0..num_batches)
        .map(|i| PositionBatch {
            batch_no: i + 1,
            trigger_price: current_price * (1.0 - i as f64 * 0.01),
            amount: amount_per_batch,
            percentage: 100.0 / num_batches as f64,
            status: "pending".to_string(),
            executed_price: 0.0,
            executed_qty: 0.0,
            executed_at: None,
        })
        .collect()
}

fn generate_id() -> String {
    format!("ps_{}", &Uuid::new_v4().simple().to_string()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_signal(confidence: f64) -> Signal {
        Signal {
            id: "sig-1".to_string(),
            cycle_id: "cyc-1".to_string(),
            pair: "DOGE/USDT".to_string(),
            side: Side::Long,
            confidence,
            reason: String::new(),
            thinking: String::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            model_name: "test".to_string(),
            ttl_seconds: 300,
            created_at: time_util::now_utc(),
        }
    }

    fn generate(confidence: f64, budget: f64, price: f64) -> PositionStrategy {
        let signal = make_signal(confidence);
        PositionAgent::new().generate(PositionInput {
            cycle_id: "cyc-1",
            signal_id: "sig-1",
            pair: "DOGE/USDT",
            side: Side::Long,
            signal: &signal,
            max_stake_usdt: budget,
            current_price: price,
        })
    }

    fn assert_invariants(s: &PositionStrategy) {
        let amount_sum: f64 = s.batches.iter().map(|b| b.amount).sum();
        assert!((amount_sum - s.total_amount).abs() < 1e-6);
        let pct_sum: f64 = s.batches.iter().map(|b| b.percentage).sum();
        assert!((pct_sum - 100.0).abs() < 1e-6);
        for (i, b) in s.batches.iter().enumerate() {
            assert_eq!(b.batch_no, i as i32 + 1);
            assert_eq!(b.status, "pending");
        }
    }

    #[test]
    fn test_high_confidence_full() {
        let s = generate(0.80, 50.0, 0.10);
        assert_eq!(s.strategy, STRATEGY_FULL);
        assert_eq!(s.batches.len(), 1);
        assert_eq!(s.take_profit_percent, 5.0);
        assert_eq!(s.stop_loss_percent, 2.0);
        assert!((s.batches[0].trigger_price - 0.10).abs() < 1e-12);
        assert_invariants(&s);
    }

    #[test]
    fn test_boundary_inclusive_tiers() {
        assert_eq!(generate(0.75, 50.0, 1.0).strategy, STRATEGY_FULL);
        assert_eq!(generate(0.60, 50.0, 1.0).strategy, STRATEGY_PYRAMID);
        assert_eq!(generate(0.599, 50.0, 1.0).strategy, STRATEGY_GRID);
    }

    #[test]
    fn test_pyramid_schedule() {
        let s = generate(0.65, 50.0, 100.0);
        assert_eq!(s.strategy, STRATEGY_PYRAMID);
        assert_eq!(s.batches.len(), 3);
        assert_eq!(s.take_profit_percent, 8.0);
        assert_eq!(s.stop_loss_percent, 3.0);
        assert!((s.batches[0].amount - 25.0).abs() < 1e-9);
        assert!((s.batches[0].trigger_price - 100.0).abs() < 1e-9);
        assert!((s.batches[1].amount - 15.0).abs() < 1e-9);
        assert!((s.batches[1].trigger_price - 98.0).abs() < 1e-9);
        assert!((s.batches[2].amount - 10.0).abs() < 1e-9);
        assert!((s.batches[2].trigger_price - 96.0).abs() < 1e-9);
        assert_invariants(&s);
    }

    #[test]
    fn test_grid_schedule() {
        let s = generate(0.50, 50.0, 100.0);
        assert_eq!(s.strategy, STRATEGY_GRID);
        assert_eq!(s.batches.len(), 5);
        assert_eq!(s.take_profit_percent, 10.0);
        assert_eq!(s.stop_loss_percent, 4.0);
        let expect_prices = [100.0, 99.0, 98.0, 97.0, 96.0];
        for (b, p) in s.batches.iter().zip(expect_prices.iter()) {
            assert!((b.trigger_price - p).abs() < 1e-9);
            assert!((b.amount - 10.0).abs() < 1e-9);
        }
        assert_invariants(&s);
    }

    #[test]
    fn test_close_trivial_strategy() {
        let signal = make_signal(0.80);
        let s = PositionAgent::new().generate(PositionInput {
            cycle_id: "cyc-1",
            signal_id: "sig-1",
            pair: "DOGE/USDT",
            side: Side::Close,
            signal: &signal,
            max_stake_usdt: 0.0,
            current_price: 0.10,
        });
        assert!(s.batches.is_empty());
        assert_eq!(s.total_amount, 0.0);
        assert!(s.reason.contains("平仓"));
    }
}
