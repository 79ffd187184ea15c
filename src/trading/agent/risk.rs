use tracing::info;
use uuid::Uuid;

use crate::app_config::Config;
use crate::time_util;
use crate::trading::domain::{PortfolioState, RiskDecision, Side, Signal};

/// 风控输入
pub struct RiskInput<'a> {
    pub cycle_id: &'a str,
    pub signal: &'a Signal,
    pub portfolio: PortfolioState,
}

/// 规则风控：纯确定性闸门，按顺序检查置信度、每日亏损、总敞口、单笔上限。
/// 拒绝不是错误，永远返回带理由的决策。
pub struct RiskAgent {
    /// 单笔最大下单金额上限
    max_single_stake_usdt: f64,
    max_daily_loss_usdt: f64,
    max_exposure_usdt: f64,
    min_confidence: f64,
    /// "spot" 或 "futures"
    trading_mode: String,
    leverage: i32,
}

impl RiskAgent {
    pub fn new(cfg: &Config) -> Self {
        let leverage = if cfg.trading_mode == "futures" {
            if cfg.futures_leverage < 1 {
                3
            } else {
                cfg.futures_leverage
            }
        } else {
            1
        };
        Self {
            max_single_stake_usdt: cfg.max_single_stake_usdt,
            max_daily_loss_usdt: cfg.max_daily_loss_usdt,
            max_exposure_usdt: cfg.max_exposure_usdt,
            min_confidence: cfg.min_confidence,
            trading_mode: cfg.trading_mode.clone(),
            leverage,
        }
    }

    pub fn evaluate(&self, input: RiskInput<'_>) -> RiskDecision {
        let mut decision = RiskDecision {
            id: Uuid::new_v4().to_string(),
            cycle_id: input.cycle_id.to_string(),
            signal_id: input.signal.id.clone(),
            approved: false,
            reject_reason: String::new(),
            max_stake_usdt: 0.0,
            created_at: time_util::now_utc(),
        };

        if input.signal.side == Side::None {
            decision.reject_reason = "signal side is none".to_string();
            return decision;
        }

        // short 在域模型中保留，当前策略下一律拒绝
        if input.signal.side == Side::Short {
            decision.reject_reason = "short side is disabled".to_string();
            return decision;
        }

        // close（卖出）信号：只检查置信度，不检查敞口限制
        if input.signal.side == Side::Close {
            if input.signal.confidence < self.min_confidence {
                decision.reject_reason = format!(
                    "close signal confidence {:.2} below min {:.2}",
                    input.signal.confidence, self.min_confidence
                );
                return decision;
            }
            decision.approved = true;
            // close 不需要 stake，卖出全部持仓
            decision.max_stake_usdt = 0.0;
            return decision;
        }

        // long（买入）信号：检查置信度 + 每日亏损 + 敞口
        if input.signal.confidence < self.min_confidence {
            decision.reject_reason = format!(
                "signal confidence {:.2} below min {:.2}",
                input.signal.confidence, self.min_confidence
            );
            return decision;
        }
        if input.portfolio.daily_pnl_usdt <= -self.max_daily_loss_usdt.abs() {
            decision.reject_reason = format!(
                "daily pnl {:.2} below max loss limit -{:.2}",
                input.portfolio.daily_pnl_usdt,
                self.max_daily_loss_usdt.abs()
            );
            return decision;
        }

        let remaining_exposure = self.max_exposure_usdt - input.portfolio.open_exposure_usdt;
        if remaining_exposure <= 0.0 {
            decision.reject_reason = "max exposure limit reached".to_string();
            return decision;
        }

        decision.max_stake_usdt = self.max_single_stake_usdt.min(remaining_exposure);
        if decision.max_stake_usdt <= 0.0 {
            decision.reject_reason = "computed max stake is zero".to_string();
            decision.max_stake_usdt = 0.0;
            return decision;
        }

        // 合约模式：提示杠杆放大后的实际仓位
        if self.trading_mode == "futures" && self.leverage > 1 {
            let actual_position = decision.max_stake_usdt * self.leverage as f64;
            info!(
                "[风控] 合约模式: 保证金={:.2} USDT x{}倍杠杆 = 实际仓位 {:.2} USDT",
                decision.max_stake_usdt, self.leverage, actual_position
            );
        }

        decision.approved = true;
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_signal(side: Side, confidence: f64) -> Signal {
        Signal {
            id: "sig-1".to_string(),
            cycle_id: "cyc-1".to_string(),
            pair: "DOGE/USDT".to_string(),
            side,
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

    fn agent() -> RiskAgent {
        RiskAgent::new(&Config::default())
    }

    #[test]
    fn test_none_side_always_rejected() {
        let signal = make_signal(Side::None, 0.99);
        let decision = agent().evaluate(RiskInput {
            cycle_id: "cyc-1",
            signal: &signal,
            portfolio: PortfolioState::default(),
        });
        assert!(!decision.approved);
        assert_eq!(decision.max_stake_usdt, 0.0);
        assert_eq!(decision.reject_reason, "signal side is none");
    }

    #[test]
    fn test_short_side_disabled() {
        let signal = make_signal(Side::Short, 0.90);
        let decision = agent().evaluate(RiskInput {
            cycle_id: "cyc-1",
            signal: &signal,
            portfolio: PortfolioState::default(),
        });
        assert!(!decision.approved);
        assert_eq!(decision.reject_reason, "short side is disabled");
    }

    #[test]
    fn test_close_checks_confidence_only() {
        let signal = make_signal(Side::Close, 0.80);
        let decision = agent().evaluate(RiskInput {
            cycle_id: "cyc-1",
            signal: &signal,
            // 敞口已满也不影响 close
            portfolio: PortfolioState {
                daily_pnl_usdt: 0.0,
                open_exposure_usdt: 10_000.0,
            },
        });
        assert!(decision.approved);
        assert_eq!(decision.max_stake_usdt, 0.0);

        let weak = make_signal(Side::Close, 0.40);
        let decision = agent().evaluate(RiskInput {
            cycle_id: "cyc-1",
            signal: &weak,
            portfolio: PortfolioState::default(),
        });
        assert!(!decision.approved);
        assert!(decision.reject_reason.contains("below min"));
    }

    #[test]
    fn test_long_low_confidence_rejected() {
        let signal = make_signal(Side::Long, 0.40);
        let decision = agent().evaluate(RiskInput {
            cycle_id: "cyc-1",
            signal: &signal,
            portfolio: PortfolioState::default(),
        });
        assert!(!decision.approved);
        assert!(decision.reject_reason.contains("below min"));
    }

    #[test]
    fn test_long_daily_loss_rejected() {
        let signal = make_signal(Side::Long, 0.80);
        let decision = agent().evaluate(RiskInput {
            cycle_id: "cyc-1",
            signal: &signal,
            portfolio: PortfolioState {
                daily_pnl_usdt: -150.0,
                open_exposure_usdt: 0.0,
            },
        });
        assert!(!decision.approved);
        assert!(decision.reject_reason.contains("max loss limit"));
    }

    #[test]
    fn test_long_exposure_exhausted_rejected() {
        let signal = make_signal(Side::Long, 0.80);
        let decision = agent().evaluate(RiskInput {
            cycle_id: "cyc-1",
            signal: &signal,
            portfolio: PortfolioState {
                daily_pnl_usdt: 0.0,
                open_exposure_usdt: 200.0,
            },
        });
        assert!(!decision.approved);
        assert_eq!(decision.reject_reason, "max exposure limit reached");
    }

    #[test]
    fn test_long_stake_bounded_by_remaining_exposure() {
        let signal = make_signal(Side::Long, 0.80);
        let decision = agent().evaluate(RiskInput {
            cycle_id: "cyc-1",
            signal: &signal,
            portfolio: PortfolioState {
                daily_pnl_usdt: 0.0,
                open_exposure_usdt: 170.0,
            },
        });
        assert!(decision.approved);
        // min(50, 200-170) = 30
        assert!((decision.max_stake_usdt - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_approved_full_stake() {
        let signal = make_signal(Side::Long, 0.80);
        let decision = agent().evaluate(RiskInput {
            cycle_id: "cyc-1",
            signal: &signal,
            portfolio: PortfolioState::default(),
        });
        assert!(decision.approved);
        assert!((decision.max_stake_usdt - 50.0).abs() < 1e-9);
    }
}
