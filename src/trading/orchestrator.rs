use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::time_util;
use crate::trading::agent::execution::{ExecutionInput, Executor};
use crate::trading::agent::position::{PositionAgent, PositionInput};
use crate::trading::agent::risk::{RiskAgent, RiskInput};
use crate::trading::agent::signal::{SignalAgent, SignalInput};
use crate::trading::domain::{
    AccountBalance, Cycle, CycleLog, CycleReport, CycleResult, CycleStatus, CycleSummary, Holding,
    HoldingView, MarketSnapshot, Order, PortfolioState, PositionView, Side, TradingInfo,
};
use crate::trading::market::prompt::{AccountInfo, PositionData};
use crate::trading::market::{pair_to_symbol, MarketClient};
use crate::trading::model;
use crate::trading::model::cycle::CycleModel;
use crate::trading::model::cycle_log::CycleLogModel;
use crate::trading::model::holding::HoldingModel;
use crate::trading::model::order::OrderModel;
use crate::trading::model::position_strategy::PositionStrategyModel;
use crate::trading::model::risk_check::RiskCheckModel;
use crate::trading::model::signal::SignalModel;

/// 单次周期执行请求
pub struct RunRequest {
    pub pair: String,
    pub snapshot: Option<MarketSnapshot>,
    pub portfolio: PortfolioState,
}

/// 周期协调器：顺序驱动 行情 → 信号 → 风控 → 建仓策略 → 执行 → 持仓更新，
/// 每个阶段落库审计日志。
pub struct Service {
    signal: Arc<dyn SignalAgent>,
    risk: RiskAgent,
    position: PositionAgent,
    executor: Arc<dyn Executor>,
    market: MarketClient,
}

impl Service {
    pub fn new(
        signal: Arc<dyn SignalAgent>,
        risk: RiskAgent,
        position: PositionAgent,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            signal,
            risk,
            position,
            executor,
            market: MarketClient::new(),
        }
    }

    /// 执行一次完整的决策周期
    pub async fn run_cycle(&self, req: RunRequest) -> Result<CycleResult> {
        let cycle_start = Instant::now();
        let mut pair = req.pair.trim().to_uppercase();
        if pair.is_empty() {
            pair = "BTC/USDT".to_string();
        }

        let now = time_util::now_utc();
        let mut cycle = Cycle {
            id: Uuid::new_v4().to_string(),
            pair: pair.clone(),
            status: CycleStatus::Running,
            error_message: String::new(),
            created_at: now,
            updated_at: now,
        };
        let short_id = cycle.id[..8].to_string();
        info!("[周期:{}] 开始执行 交易对={}", short_id, pair);

        let cycle_model = CycleModel::new();
        if let Err(e) = cycle_model.create(&cycle).await {
            error!("[周期:{}] 创建周期失败: {}", short_id, e);
            return Err(e);
        }

        let log_model = CycleLogModel::new();
        let mut logs: Vec<CycleLog> = Vec::with_capacity(6);

        // 审计日志尽力写入，失败只告警不阻断
        macro_rules! add_log {
            ($stage:expr, $message:expr) => {
                match log_model.add(&cycle.id, $stage, &$message).await {
                    Ok(entry) => logs.push(entry),
                    Err(e) => warn!("[周期:{}] 写入日志失败: {}", short_id, e),
                }
            };
        }

        add_log!("启动", "周期开始执行".to_string());

        // ---- 行情快照 ----
        let mut snapshot = match req.snapshot {
            Some(s) => {
                let mut s = s;
                if s.pair.trim().is_empty() {
                    s.pair = pair.clone();
                }
                s
            }
            None => MarketSnapshot::empty(&pair),
        };
        // 定时器触发时没有外部行情，快速拉取实时价格；失败不致命
        if snapshot.last_price == 0.0 {
            match self.market.fetch_quick_ticker(&pair).await {
                Ok((price, change)) => {
                    snapshot.last_price = price;
                    snapshot.change_24h = change;
                    info!(
                        "[周期:{}] 已获取实时行情 价格={:.6} 24h涨跌={:.2}%",
                        short_id, price, change
                    );
                }
                Err(e) => {
                    warn!(
                        "[周期:{}] 快速行情获取失败: {}（信号阶段会自行获取完整数据）",
                        short_id, e
                    );
                }
            }
        }
        info!(
            "[周期:{}] 行情快照 价格={:.6} 24h涨跌={:.2}%",
            short_id, snapshot.last_price, snapshot.change_24h
        );
        add_log!(
            "行情",
            format!(
                "价格={:.6} 24h涨跌={:.2}%",
                snapshot.last_price, snapshot.change_24h
            )
        );

        // ---- 信号生成 ----
        let signal_start = Instant::now();
        info!("[周期:{}] 信号: 正在调用大模型分析 {} ...", short_id, pair);
        let account = self.fetch_account_data_for_prompt(&pair).await;
        let sig = match self
            .signal
            .generate(SignalInput {
                cycle_id: cycle.id.clone(),
                pair: pair.clone(),
                snapshot: snapshot.clone(),
                account,
            })
            .await
        {
            Ok(s) => s,
            Err(e) => {
                error!(
                    "[周期:{}] 信号生成失败 耗时{:?}: {}",
                    short_id,
                    signal_start.elapsed(),
                    e
                );
                let _ = cycle_model
                    .update_status(&cycle.id, CycleStatus::Failed, &e.to_string())
                    .await;
                add_log!("信号", format!("信号生成失败: {}", e));
                return Err(e);
            }
        };
        info!(
            "[周期:{}] 信号: 方向={} 置信度={:.2} 理由={:?} (耗时{:?})",
            short_id,
            sig.side,
            sig.confidence,
            sig.reason,
            signal_start.elapsed()
        );

        if let Err(e) = SignalModel::new().add(&sig).await {
            error!("[周期:{}] 保存信号失败: {}", short_id, e);
            let _ = cycle_model
                .update_status(&cycle.id, CycleStatus::Failed, &e.to_string())
                .await;
            return Err(e);
        }
        add_log!(
            "信号",
            format!(
                "方向={} 置信度={:.2} 理由={}",
                sig.side, sig.confidence, sig.reason
            )
        );

        // ---- 风控评估 ----
        info!("[周期:{}] 风控: 正在评估 ...", short_id);
        let risk_decision = self.risk.evaluate(RiskInput {
            cycle_id: &cycle.id,
            signal: &sig,
            portfolio: req.portfolio,
        });
        if let Err(e) = RiskCheckModel::new().add(&risk_decision).await {
            error!("[周期:{}] 保存风控决策失败: {}", short_id, e);
            let _ = cycle_model
                .update_status(&cycle.id, CycleStatus::Failed, &e.to_string())
                .await;
            return Err(e);
        }

        if !risk_decision.approved {
            info!(
                "[周期:{}] 风控: 已拒绝 原因={:?}",
                short_id, risk_decision.reject_reason
            );
            add_log!("风控", format!("已拒绝: {}", risk_decision.reject_reason));
            let _ = cycle_model
                .update_status(&cycle.id, CycleStatus::Rejected, &risk_decision.reject_reason)
                .await;
            cycle.status = CycleStatus::Rejected;
            cycle.error_message = risk_decision.reject_reason.clone();
            cycle.updated_at = time_util::now_utc();

            info!(
                "[周期:{}] 执行完毕 状态=已拒绝 总耗时={:?}",
                short_id,
                cycle_start.elapsed()
            );
            return Ok(CycleResult {
                cycle,
                signal: sig,
                risk: risk_decision,
                order: None,
                logs,
            });
        }
        info!(
            "[周期:{}] 风控: 已通过 最大仓位={:.2} USDT",
            short_id, risk_decision.max_stake_usdt
        );
        add_log!(
            "风控",
            format!("已通过 最大仓位={:.2}", risk_decision.max_stake_usdt)
        );

        // ---- 建仓策略生成 ----
        info!("[周期:{}] 建仓策略: 正在生成 ...", short_id);
        let pos_strategy = self.position.generate(PositionInput {
            cycle_id: &cycle.id,
            signal_id: &sig.id,
            pair: &pair,
            side: sig.side,
            signal: &sig,
            max_stake_usdt: risk_decision.max_stake_usdt,
            current_price: snapshot.last_price,
        });

        // 保存建仓策略；失败只记录，不阻断
        if let Err(e) = PositionStrategyModel::new().add(&pos_strategy).await {
            error!("[周期:{}] 保存建仓策略失败: {}", short_id, e);
        }

        info!(
            "[周期:{}] 建仓策略: {} 分批={} 止盈={:.1}% 止损={:.1}%",
            short_id,
            pos_strategy.strategy,
            pos_strategy.entry_levels,
            pos_strategy.take_profit_percent,
            pos_strategy.stop_loss_percent
        );
        add_log!(
            "建仓策略",
            format!("{}: {}", pos_strategy.strategy, pos_strategy.reason)
        );

        // ---- 下单执行 ----
        // 当前版本只执行第一批次，后续批次留待单独的触发机制
        let mut exec_input = ExecutionInput {
            cycle_id: cycle.id.clone(),
            signal_id: sig.id.clone(),
            pair: pair.clone(),
            side: sig.side,
            stake_usdt: risk_decision.max_stake_usdt,
            estimated_fill: snapshot.last_price,
            sell_quantity: 0.0,
        };

        if sig.side == Side::Long && !pos_strategy.batches.is_empty() {
            let first_batch = &pos_strategy.batches[0];
            exec_input.stake_usdt = first_batch.amount;
            info!(
                "[周期:{}] 执行第1批: {:.2} USDT (共{}批)",
                short_id,
                first_batch.amount,
                pos_strategy.batches.len()
            );
        }

        // 买入信号：实盘检查可用余额，自动下调金额避免余额不足
        if sig.side == Side::Long && !self.executor.is_dry_run() {
            match self.executor.fetch_full_balance().await {
                Ok(balances) => {
                    if let Some(b) = balances.iter().find(|b| b.symbol == "USDT") {
                        let available = b.free;
                        // 预留 1 USDT 作为手续费缓冲
                        let max_can_spend = available - 1.0;
                        if max_can_spend < 5.0 {
                            warn!(
                                "[周期:{}] USDT余额不足: 可用={:.2}，最少需5U，跳过本轮",
                                short_id, available
                            );
                            add_log!("执行", format!("跳过: USDT余额不足 可用={:.2}", available));
                            let _ = cycle_model
                                .update_status(&cycle.id, CycleStatus::Failed, "USDT余额不足")
                                .await;
                            cycle.status = CycleStatus::Failed;
                            cycle.error_message = "USDT余额不足".to_string();
                            return Ok(CycleResult {
                                cycle,
                                signal: sig,
                                risk: risk_decision,
                                order: None,
                                logs,
                            });
                        }
                        if exec_input.stake_usdt > max_can_spend {
                            info!(
                                "[周期:{}] 余额调整: 计划={:.2} 可用={:.2} → 实际下单={:.2}",
                                short_id, exec_input.stake_usdt, available, max_can_spend
                            );
                            exec_input.stake_usdt = max_can_spend;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "[周期:{}] 获取余额失败: {}，使用风控金额 {:.2}",
                        short_id, e, exec_input.stake_usdt
                    );
                }
            }
        }

        // close 信号：解析持仓数量，用币数量卖出/平仓
        if sig.side == Side::Close {
            exec_input.sell_quantity = self.resolve_sell_quantity(&pair, &short_id).await;

            if exec_input.sell_quantity <= 0.0 {
                warn!("[周期:{}] 平仓跳过: {} 无持仓可卖", short_id, pair);
                add_log!("执行", "平仓跳过: 无持仓可卖".to_string());
                let _ = cycle_model
                    .update_status(&cycle.id, CycleStatus::Success, "")
                    .await;
                cycle.status = CycleStatus::Success;
                cycle.updated_at = time_util::now_utc();
                return Ok(CycleResult {
                    cycle,
                    signal: sig,
                    risk: risk_decision,
                    order: None,
                    logs,
                });
            }
        }

        info!(
            "[周期:{}] 执行: 正在下单 方向={} 金额={:.2} 数量={:.4} ...",
            short_id, sig.side, exec_input.stake_usdt, exec_input.sell_quantity
        );
        let order = match self.executor.execute(exec_input).await {
            Ok(order) => {
                if !order.id.is_empty() {
                    let _ = OrderModel::new().add(&order).await;
                }
                order
            }
            Err(exec_err) => {
                if !exec_err.order.id.is_empty() {
                    let _ = OrderModel::new().add(&exec_err.order).await;
                }
                error!("[周期:{}] 下单失败: {}", short_id, exec_err.message);
                let _ = cycle_model
                    .update_status(&cycle.id, CycleStatus::Failed, &exec_err.message)
                    .await;
                add_log!("执行", format!("下单失败: {}", exec_err.message));
                return Err(anyhow!(exec_err.message));
            }
        };

        info!(
            "[周期:{}] 执行: 订单状态={} 交易所ID={}",
            short_id, order.status, order.exchange_order_id
        );
        add_log!(
            "执行",
            format!(
                "订单状态={} 交易所ID={}",
                order.status, order.exchange_order_id
            )
        );
        let _ = cycle_model
            .update_status(&cycle.id, CycleStatus::Success, "")
            .await;
        cycle.status = CycleStatus::Success;
        cycle.updated_at = time_util::now_utc();

        // 交易成功后更新持仓
        self.update_holding_after_trade(&order).await;

        info!(
            "[周期:{}] 执行完毕 状态=成功 总耗时={:?}",
            short_id,
            cycle_start.elapsed()
        );
        Ok(CycleResult {
            cycle,
            signal: sig,
            risk: risk_decision,
            order: Some(order),
            logs,
        })
    }

    /// 平仓数量解析：合约 positionRisk → 实盘现货余额 → 本地持仓
    async fn resolve_sell_quantity(&self, pair: &str, short_id: &str) -> f64 {
        if self.executor.trading_mode() == "futures" {
            // 合约模式：通过 positionRisk API 获取持仓数量
            if let Ok(pos_amt) = self.executor.fetch_position_risk(pair).await {
                if pos_amt > 0.0 {
                    info!("[周期:{}] 合约平仓: {} 持仓数量={:.4}", short_id, pair, pos_amt);
                    return pos_amt;
                }
            }
            // dry-run 或无持仓时查本地持仓
            if let Some(qty) = self.local_holding_quantity(pair).await {
                info!("[周期:{}] 合约平仓(本地): {} 数量={:.4}", short_id, pair, qty);
                return qty;
            }
            return 0.0;
        }

        // 现货模式
        let coin = pair.split('/').next().unwrap_or(pair);

        if self.executor.is_dry_run() {
            // 模拟盘：用本地 holdings 表
            if let Some(qty) = self.local_holding_quantity(pair).await {
                info!("[周期:{}] 模拟平仓: 持仓 {} 数量={:.4}", short_id, pair, qty);
                return qty;
            }
            return 0.0;
        }

        // 实盘：以交易所真实余额为准（避免本地数据与实际不一致）
        match self.executor.fetch_full_balance().await {
            Ok(balances) => {
                for b in balances {
                    if b.symbol.eq_ignore_ascii_case(coin) && b.free > 0.0 {
                        info!(
                            "[周期:{}] 平仓(交易所真实余额): {} 可用={:.4}",
                            short_id, coin, b.free
                        );
                        return b.free;
                    }
                }
                0.0
            }
            Err(e) => {
                warn!(
                    "[周期:{}] 获取交易所余额失败: {}，尝试本地持仓",
                    short_id, e
                );
                // 交易所查询失败时回退到本地
                if let Some(qty) = self.local_holding_quantity(pair).await {
                    info!("[周期:{}] 平仓(本地回退): {} 数量={:.4}", short_id, pair, qty);
                    return qty;
                }
                0.0
            }
        }
    }

    async fn local_holding_quantity(&self, pair: &str) -> Option<f64> {
        let holdings = HoldingModel::new().list().await.ok()?;
        holdings
            .iter()
            .find(|h| h.pair.eq_ignore_ascii_case(pair) && h.quantity > 0.0)
            .map(|h| h.quantity)
    }

    /// 交易成功后更新持仓。
    /// 买入：qty/cost 累加并重算均价；卖出：按成交比例削减成本，数量下限 0。
    pub async fn update_holding_after_trade(&self, order: &Order) {
        if order.filled_price <= 0.0 || order.filled_quantity <= 0.0 {
            return;
        }
        if order.status != "filled" && order.status != "simulated_filled" {
            return;
        }

        let holding_model = HoldingModel::new();
        let holdings = holding_model.list().await.unwrap_or_default();
        let existing = holdings.iter().find(|h| h.pair == order.pair);

        let now = time_util::now_utc();
        let symbol = order.pair.split('/').next().unwrap_or(&order.pair).to_string();

        match order.side {
            Side::Long => {
                let (new_qty, new_cost) = match existing {
                    Some(h) => (
                        h.quantity + order.filled_quantity,
                        h.total_cost + order.filled_quantity * order.filled_price,
                    ),
                    None => (
                        order.filled_quantity,
                        order.filled_quantity * order.filled_price,
                    ),
                };
                let _ = holding_model
                    .upsert(&Holding {
                        id: 0,
                        pair: order.pair.clone(),
                        symbol,
                        quantity: new_qty,
                        avg_price: new_cost / new_qty,
                        total_cost: new_cost,
                        source: "local".to_string(),
                        updated_at: now,
                    })
                    .await;
                info!(
                    "[持仓] 买入更新 {}: +{:.4} @ {:.8}",
                    order.pair, order.filled_quantity, order.filled_price
                );
            }
            Side::Close => {
                if let Some(h) = existing {
                    let new_qty = (h.quantity - order.filled_quantity).max(0.0);
                    let ratio = (order.filled_quantity / h.quantity).min(1.0);
                    let new_cost = h.total_cost * (1.0 - ratio);
                    let avg_price = if new_qty > 0.0 { new_cost / new_qty } else { 0.0 };
                    let _ = holding_model
                        .upsert(&Holding {
                            id: 0,
                            pair: order.pair.clone(),
                            symbol,
                            quantity: new_qty,
                            avg_price,
                            total_cost: new_cost,
                            source: "local".to_string(),
                            updated_at: now,
                        })
                        .await;
                    info!(
                        "[持仓] 卖出更新 {}: -{:.4} 剩余={:.4}",
                        order.pair, order.filled_quantity, new_qty
                    );
                }
            }
            _ => {}
        }
    }

    /// 获取真实余额和持仓数据，用于填充提示词
    async fn fetch_account_data_for_prompt(&self, pair: &str) -> AccountInfo {
        // 1. USDT 余额
        let mut cash_available = 0.0;
        match self.executor.fetch_full_balance().await {
            Ok(balances) => {
                if let Some(b) = balances.iter().find(|b| b.symbol == "USDT") {
                    cash_available = b.free;
                }
            }
            Err(e) => {
                info!("[账户] 获取余额失败: {}，使用默认值 0", e);
            }
        }

        // 2. 当前持仓
        let mut positions: Vec<PositionData> = Vec::new();
        let mut positions_value = 0.0;
        let leverage = self.executor.leverage();

        if self.executor.trading_mode() == "futures" && !self.executor.is_dry_run() {
            // 合约实盘：优先从 positionRisk API 获取
            if let Ok(pos_amt) = self.executor.fetch_position_risk(pair).await {
                if pos_amt > 0.0 {
                    let symbol = pair_to_symbol(pair);
                    let current_price = self
                        .market
                        .fetch_price_by_symbol(&symbol)
                        .await
                        .unwrap_or(0.0);
                    positions_value += pos_amt * current_price;
                    positions.push(PositionData {
                        symbol: pair.to_string(),
                        side: "LONG".to_string(),
                        quantity: format!("{:.4}", pos_amt),
                        entry_price: "N/A".to_string(),
                        current_price: format!("{:.6}", current_price),
                        unrealized_pnl: format!("x{} leverage", leverage),
                        leverage: leverage.to_string(),
                    });
                }
            }
        } else {
            // 现货模式或 dry-run：从本地 holdings 表获取
            let holdings = HoldingModel::new().list().await.unwrap_or_default();
            for h in holdings {
                if h.quantity <= 0.0 {
                    continue;
                }
                let symbol = pair_to_symbol(&h.pair);
                let current_price = match self.market.fetch_price_by_symbol(&symbol).await {
                    Ok(p) if p > 0.0 => p,
                    _ => h.avg_price,
                };

                // 过滤灰尘持仓（市值低于 1 USDT 不计入）
                let market_value = h.quantity * current_price;
                if market_value < 1.0 {
                    info!(
                        "[账户] 忽略灰尘持仓: {} 数量={:.6} 市值={:.4} USDT < 1 USDT",
                        h.pair, h.quantity, market_value
                    );
                    continue;
                }

                let unrealized_pnl = (current_price - h.avg_price) * h.quantity;
                let pnl_pct = if h.total_cost > 0.0 {
                    unrealized_pnl / h.total_cost * 100.0
                } else {
                    0.0
                };

                positions_value += market_value;
                positions.push(PositionData {
                    symbol: h.pair.clone(),
                    side: "LONG".to_string(),
                    quantity: format!("{:.4}", h.quantity),
                    entry_price: format!("{:.6}", h.avg_price),
                    current_price: format!("{:.6}", current_price),
                    unrealized_pnl: format!("{:.4} USDT ({:.2}%)", unrealized_pnl, pnl_pct),
                    leverage: leverage.to_string(),
                });
            }
        }

        AccountInfo {
            account_value: cash_available + positions_value,
            cash_available,
            return_pct: 0.0,
            sharpe_ratio: 0.0,
            minutes_elapsed: 0,
            trading_mode: self.executor.trading_mode().to_string(),
            leverage,
            positions,
        }
    }

    // ==================== 查询与管理 ====================

    pub async fn get_cycle_report(&self, cycle_id: &str) -> Result<CycleReport> {
        model::get_cycle_report(cycle_id).await
    }

    pub async fn delete_cycle(&self, cycle_id: &str) -> Result<()> {
        CycleModel::new().delete_cascade(cycle_id).await
    }

    pub async fn list_positions(&self, limit: i64) -> Result<Vec<PositionView>> {
        OrderModel::new().list_positions(limit).await
    }

    /// 分页获取历史周期列表，返回 (列表, 总数)
    pub async fn list_cycles(&self, page: i64, page_size: i64) -> Result<(Vec<CycleSummary>, i64)> {
        let cycle_model = CycleModel::new();
        let total = cycle_model.count().await?;
        let cycles = cycle_model.list_summaries(page, page_size).await?;
        Ok((cycles, total))
    }

    pub fn get_trading_info(&self) -> TradingInfo {
        TradingInfo {
            mode: self.executor.trading_mode().to_string(),
            leverage: self.executor.leverage(),
            dry_run: self.executor.is_dry_run(),
        }
    }

    /// 从交易所获取完整余额
    pub async fn get_account_balances(&self) -> Result<Vec<AccountBalance>> {
        let raw = self.executor.fetch_full_balance().await?;
        Ok(raw
            .into_iter()
            .map(|b| AccountBalance {
                symbol: b.symbol,
                free: b.free,
                locked: b.locked,
                total: b.total,
            })
            .collect())
    }

    /// 清空所有数据
    pub async fn reset_data(&self) -> Result<()> {
        model::reset_all_data().await
    }

    /// 同步持仓（模拟盘从订单聚合，实盘从交易所同步）
    pub async fn sync_holdings(&self) -> Result<()> {
        if self.executor.is_dry_run() {
            self.sync_holdings_from_orders().await
        } else {
            self.sync_holdings_from_exchange().await
        }
    }

    /// 强制从交易所同步（忽略 dry-run 设置）
    pub async fn sync_holdings_force_exchange(&self) -> Result<()> {
        self.sync_holdings_from_exchange().await
    }

    /// 从交易所同步成交记录并自动更新持仓，返回新导入笔数。
    /// 每笔外部成交用交易所 id 去重，重复导入是幂等的。
    pub async fn sync_trades_from_exchange(&self, pair: &str) -> Result<i64> {
        let trades = self
            .executor
            .fetch_trade_history(pair, 500)
            .await
            .map_err(|e| anyhow!("获取交易记录失败: {}", e))?;

        let order_model = OrderModel::new();
        let mut imported = 0i64;
        for t in &trades {
            // 用 "binance-{tradeID}" 作为 exchange_order_id 去重
            let ex_id = format!("binance-{}", t.trade_id);
            if order_model.exists_by_exchange_id(&ex_id).await.unwrap_or(false) {
                continue;
            }

            let side = if t.is_buyer { Side::Long } else { Side::Close };

            // 还原 pair 格式 "DOGEUSDT" → "DOGE/USDT"
            let pair_fmt = if pair.contains('/') {
                pair.to_string()
            } else {
                format!("{}/USDT", t.symbol.trim_end_matches("USDT"))
            };

            let order = Order {
                id: Uuid::new_v4().to_string(),
                // 外部交易，无周期
                cycle_id: String::new(),
                signal_id: String::new(),
                client_order_id: format!("binance-ord-{}", t.order_id),
                pair: pair_fmt,
                side,
                stake_usdt: t.quote_qty,
                leverage: 0,
                status: "filled".to_string(),
                exchange_order_id: ex_id,
                filled_price: t.price,
                filled_quantity: t.quantity,
                raw_response: format!(
                    r#"{{"trade_id":{},"order_id":{}}}"#,
                    t.trade_id, t.order_id
                ),
                created_at: t.timestamp,
            };

            if let Err(e) = order_model.add(&order).await {
                warn!("[同步] 插入交易记录失败 trade={}: {}", t.trade_id, e);
                continue;
            }
            imported += 1;
        }

        info!(
            "[同步] {} 共 {} 笔成交，新导入 {} 笔",
            pair,
            trades.len(),
            imported
        );

        // 同步完成后重新聚合持仓
        if imported > 0 {
            if let Err(e) = self.sync_holdings_from_orders().await {
                warn!("[同步] 重新聚合持仓失败: {}", e);
            }
        }

        Ok(imported)
    }

    /// 从本地订单历史聚合持仓（模拟盘）
    async fn sync_holdings_from_orders(&self) -> Result<()> {
        let holding_model = HoldingModel::new();
        let holdings = holding_model
            .aggregate_from_orders()
            .await
            .map_err(|e| anyhow!("聚合订单持仓: {}", e))?;
        let count = holdings.len();
        for h in holdings {
            holding_model
                .upsert(&h)
                .await
                .map_err(|e| anyhow!("更新持仓 {}: {}", h.pair, e))?;
        }
        info!("[持仓] 从订单历史同步完成，共 {} 个币对", count);
        Ok(())
    }

    /// 从交易所同步真实余额（实盘）。
    /// 交易所不返回成本价，avg_price/total_cost 置 0，下游视图不得用它做除数。
    async fn sync_holdings_from_exchange(&self) -> Result<()> {
        let balances = match self.executor.fetch_account_balances().await {
            Ok(b) => b,
            Err(e) => {
                warn!("[持仓] 交易所同步失败: {}，尝试从订单聚合", e);
                return self.sync_holdings_from_orders().await;
            }
        };

        let holding_model = HoldingModel::new();
        let now = time_util::now_utc();
        let mut count = 0;
        for b in balances {
            let pair = format!("{}/USDT", b.symbol);
            let h = Holding {
                id: 0,
                pair: pair.clone(),
                symbol: b.symbol,
                quantity: b.total,
                avg_price: 0.0,
                total_cost: 0.0,
                source: "exchange".to_string(),
                updated_at: now,
            };
            if let Err(e) = holding_model.upsert(&h).await {
                warn!("[持仓] 更新 {} 失败: {}", pair, e);
                continue;
            }
            count += 1;
        }
        info!("[持仓] 从交易所同步完成，共 {} 个币对", count);
        Ok(())
    }

    /// 获取持仓列表，附带实时行情
    pub async fn get_holdings(&self) -> Result<Vec<HoldingView>> {
        let holdings = HoldingModel::new().list().await?;

        let mut views = Vec::with_capacity(holdings.len());
        for h in holdings {
            let mut view = HoldingView {
                holding: h.clone(),
                current_price: 0.0,
                market_value: 0.0,
                unrealized_pnl: 0.0,
                pnl_percent: 0.0,
            };

            let symbol = pair_to_symbol(&h.pair);
            if let Ok(price) = self.market.fetch_price_by_symbol(&symbol).await {
                if price > 0.0 {
                    view.current_price = price;
                    view.market_value = h.quantity * price;
                    view.unrealized_pnl = view.market_value - h.total_cost;
                    if h.total_cost > 0.0 {
                        view.pnl_percent = view.unrealized_pnl / h.total_cost * 100.0;
                    }
                }
            }
            views.push(view);
        }
        Ok(views)
    }
}
