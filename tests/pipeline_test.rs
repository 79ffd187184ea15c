//! 端到端流水线测试：信号桩 + 模拟执行端 + 临时 SQLite 库。
//! 各测试使用互不相同的交易对，避免共享 holdings 表相互干扰。

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use ai_quant::app_config::Config;
use ai_quant::trading::agent::execution::{
    Balance, ExecutionError, ExecutionInput, Executor, SpotExecutor, TradeFill,
};
use ai_quant::trading::agent::position::PositionAgent;
use ai_quant::trading::agent::risk::RiskAgent;
use ai_quant::trading::agent::signal::{SignalAgent, SignalInput};
use ai_quant::trading::domain::{
    CycleStatus, MarketSnapshot, Order, PortfolioState, Side, Signal,
};
use ai_quant::trading::model::holding::HoldingModel;
use ai_quant::trading::orchestrator::{RunRequest, Service};

async fn init_test_env() {
    static INIT: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();
    INIT.get_or_init(|| async {
        std::env::set_var("APP_ENV", "LOCAL");
        let path = std::env::temp_dir().join(format!("ai_quant_test_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let dsn = format!("sqlite://{}", path.display());
        ai_quant::app_config::log::setup_logging().await.ok();
        ai_quant::app_config::db::init_db(&dsn).await.expect("init db");
        ai_quant::trading::model::init_schema()
            .await
            .expect("init schema");
    })
    .await;
}

/// 固定返回指定方向与置信度的信号桩
struct StubSignalAgent {
    side: Side,
    confidence: f64,
}

#[async_trait]
impl SignalAgent for StubSignalAgent {
    async fn generate(&self, input: SignalInput) -> Result<Signal> {
        Ok(Signal {
            id: uuid::Uuid::new_v4().to_string(),
            cycle_id: input.cycle_id,
            pair: input.pair,
            side: self.side,
            confidence: self.confidence,
            reason: "测试信号".to_string(),
            thinking: String::new(),
            prompt_tokens: 100,
            completion_tokens: 20,
            total_tokens: 120,
            model_name: "stub".to_string(),
            ttl_seconds: 600,
            created_at: Utc::now(),
        })
    }
}

fn make_service(side: Side, confidence: f64) -> Service {
    let cfg = Config::default();
    Service::new(
        Arc::new(StubSignalAgent { side, confidence }),
        RiskAgent::new(&cfg),
        PositionAgent::new(),
        Arc::new(SpotExecutor::new(&cfg)),
    )
}

fn snapshot(pair: &str, price: f64) -> MarketSnapshot {
    MarketSnapshot {
        pair: pair.to_string(),
        last_price: price,
        change_24h: 1.0,
        volume_24h: 0.0,
        funding_rate: 0.0,
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn test_s1_spot_dry_run_long_full_cycle() {
    init_test_env().await;
    let service = make_service(Side::Long, 0.80);

    let result = service
        .run_cycle(RunRequest {
            pair: "DOGE/USDT".to_string(),
            snapshot: Some(snapshot("DOGE/USDT", 0.10)),
            portfolio: PortfolioState::default(),
        })
        .await
        .expect("cycle should succeed");

    assert_eq!(result.cycle.status, CycleStatus::Success);
    assert!(result.risk.approved);
    assert!((result.risk.max_stake_usdt - 50.0).abs() < 1e-9);

    let order = result.order.expect("order present");
    assert_eq!(order.status, "simulated_filled");
    assert!((order.filled_price - 0.10).abs() < 1e-12);
    assert!((order.filled_quantity - 500.0).abs() < 1e-6);

    // 持仓核对：500 DOGE @ 0.10，成本 50
    let holdings = HoldingModel::new().list().await.unwrap();
    let h = holdings
        .iter()
        .find(|h| h.pair == "DOGE/USDT")
        .expect("holding created");
    assert!((h.quantity - 500.0).abs() < 1e-6);
    assert!((h.avg_price - 0.10).abs() < 1e-9);
    assert!((h.total_cost - 50.0).abs() < 1e-6);

    // 审计报告：策略为全仓，日志按 id 升序且阶段顺序正确
    let report = service.get_cycle_report(&result.cycle.id).await.unwrap();
    let strategy = report.position_strategy.expect("strategy persisted");
    assert_eq!(strategy.strategy, "full");
    assert_eq!(strategy.batches.len(), 1);
    assert!((strategy.batches[0].amount - 50.0).abs() < 1e-9);
    assert!((strategy.batches[0].percentage - 100.0).abs() < 1e-9);

    let logs = &report.logs;
    assert!(logs.len() >= 6);
    for pair in logs.windows(2) {
        assert!(pair[0].id < pair[1].id);
    }
    let stages: Vec<&str> = logs.iter().map(|l| l.stage.as_str()).collect();
    assert_eq!(stages, vec!["启动", "行情", "信号", "风控", "建仓策略", "执行"]);
}

#[tokio::test]
async fn test_s2_low_confidence_rejected() {
    init_test_env().await;
    let service = make_service(Side::Long, 0.40);

    let result = service
        .run_cycle(RunRequest {
            pair: "BNB/USDT".to_string(),
            snapshot: Some(snapshot("BNB/USDT", 600.0)),
            portfolio: PortfolioState::default(),
        })
        .await
        .expect("rejection is not an error");

    assert_eq!(result.cycle.status, CycleStatus::Rejected);
    assert!(!result.risk.approved);
    assert!(result.risk.reject_reason.contains("below min"));
    assert!(result.order.is_none());

    let report = service.get_cycle_report(&result.cycle.id).await.unwrap();
    assert_eq!(report.cycle.status, CycleStatus::Rejected);
    assert!(report.position_strategy.is_none());
    assert!(report.order.is_none());
    let risk = report.risk.expect("risk persisted");
    assert!(!risk.approved);
}

#[tokio::test]
async fn test_s3_pyramid_executes_first_batch_only() {
    init_test_env().await;
    let service = make_service(Side::Long, 0.65);

    let result = service
        .run_cycle(RunRequest {
            pair: "SOL/USDT".to_string(),
            snapshot: Some(snapshot("SOL/USDT", 100.0)),
            portfolio: PortfolioState::default(),
        })
        .await
        .expect("cycle should succeed");

    let report = service.get_cycle_report(&result.cycle.id).await.unwrap();
    let strategy = report.position_strategy.expect("strategy persisted");
    assert_eq!(strategy.strategy, "pyramid");
    assert_eq!(strategy.take_profit_percent, 8.0);
    assert_eq!(strategy.stop_loss_percent, 3.0);
    assert_eq!(strategy.batches.len(), 3);

    let expect = [(1, 100.0, 25.0, 50.0), (2, 98.0, 15.0, 30.0), (3, 96.0, 10.0, 20.0)];
    for (b, (no, price, amount, pct)) in strategy.batches.iter().zip(expect.iter()) {
        assert_eq!(b.batch_no, *no);
        assert!((b.trigger_price - price).abs() < 1e-9);
        assert!((b.amount - amount).abs() < 1e-9);
        assert!((b.percentage - pct).abs() < 1e-9);
        // 本周期只执行第一批，计划本身保持 pending
        assert_eq!(b.status, "pending");
    }

    // 订单只用第一批的金额
    let order = result.order.expect("order present");
    assert!((order.stake_usdt - 25.0).abs() < 1e-9);
    assert!((order.filled_quantity - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn test_s4_close_with_no_holdings_is_noop_success() {
    init_test_env().await;
    let service = make_service(Side::Close, 0.80);

    let result = service
        .run_cycle(RunRequest {
            pair: "XRP/USDT".to_string(),
            snapshot: Some(snapshot("XRP/USDT", 0.50)),
            portfolio: PortfolioState::default(),
        })
        .await
        .expect("no-op close should succeed");

    assert_eq!(result.cycle.status, CycleStatus::Success);
    assert!(result.order.is_none());

    let report = service.get_cycle_report(&result.cycle.id).await.unwrap();
    assert!(report.order.is_none());
    assert!(report
        .logs
        .iter()
        .any(|l| l.message.contains("平仓跳过")));
}

#[tokio::test]
async fn test_holdings_reconciliation_partial_then_full_sell() {
    init_test_env().await;
    let service = make_service(Side::Long, 0.80);

    let buy = Order {
        id: uuid::Uuid::new_v4().to_string(),
        cycle_id: String::new(),
        signal_id: String::new(),
        client_order_id: format!("t-{}", uuid::Uuid::new_v4().simple()),
        pair: "ADA/USDT".to_string(),
        side: Side::Long,
        stake_usdt: 200.0,
        leverage: 0,
        status: "simulated_filled".to_string(),
        exchange_order_id: String::new(),
        filled_price: 2.0,
        filled_quantity: 100.0,
        raw_response: String::new(),
        created_at: Utc::now(),
    };
    service.update_holding_after_trade(&buy).await;

    let holdings = HoldingModel::new().list().await.unwrap();
    let h = holdings.iter().find(|h| h.pair == "ADA/USDT").unwrap();
    // 买入后 (qty·avg) 增量 = qty·price
    assert!((h.quantity * h.avg_price - 200.0).abs() < 1e-6);

    // 部分卖出：均价不变
    let partial = Order {
        side: Side::Close,
        filled_quantity: 40.0,
        filled_price: 2.5,
        id: uuid::Uuid::new_v4().to_string(),
        client_order_id: format!("t-{}", uuid::Uuid::new_v4().simple()),
        ..buy.clone()
    };
    service.update_holding_after_trade(&partial).await;

    let holdings = HoldingModel::new().list().await.unwrap();
    let h = holdings.iter().find(|h| h.pair == "ADA/USDT").unwrap();
    assert!((h.quantity - 60.0).abs() < 1e-6);
    assert!((h.avg_price - 2.0).abs() < 1e-6);
    assert!((h.total_cost - 120.0).abs() < 1e-6);

    // 全部卖出：数量与成本归零（list 过滤 qty>0，不再返回）
    let full = Order {
        side: Side::Close,
        filled_quantity: 60.0,
        filled_price: 2.5,
        id: uuid::Uuid::new_v4().to_string(),
        client_order_id: format!("t-{}", uuid::Uuid::new_v4().simple()),
        ..buy.clone()
    };
    service.update_holding_after_trade(&full).await;

    let holdings = HoldingModel::new().list().await.unwrap();
    assert!(holdings.iter().all(|h| h.pair != "ADA/USDT"));
}

/// 返回固定成交历史的执行端桩（导入幂等性测试）
struct StubExecutor;

#[async_trait]
impl Executor for StubExecutor {
    async fn execute(&self, _input: ExecutionInput) -> Result<Order, ExecutionError> {
        unreachable!("not used in this test")
    }

    async fn fetch_account_balances(&self) -> Result<Vec<Balance>> {
        Ok(Vec::new())
    }

    async fn fetch_full_balance(&self) -> Result<Vec<Balance>> {
        Ok(Vec::new())
    }

    async fn fetch_trade_history(&self, _pair: &str, _limit: i64) -> Result<Vec<TradeFill>> {
        Ok(vec![
            TradeFill {
                trade_id: 9001,
                order_id: 5001,
                symbol: "LTCUSDT".to_string(),
                price: 80.0,
                quantity: 1.5,
                quote_qty: 120.0,
                is_buyer: true,
                timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            },
            TradeFill {
                trade_id: 9002,
                order_id: 5002,
                symbol: "LTCUSDT".to_string(),
                price: 85.0,
                quantity: 0.5,
                quote_qty: 42.5,
                is_buyer: false,
                timestamp: Utc.timestamp_opt(1_700_000_600, 0).unwrap(),
            },
        ])
    }

    async fn fetch_position_risk(&self, _pair: &str) -> Result<f64> {
        Ok(0.0)
    }

    fn is_dry_run(&self) -> bool {
        true
    }

    fn trading_mode(&self) -> &'static str {
        "spot"
    }

    fn leverage(&self) -> i32 {
        1
    }
}

#[tokio::test]
async fn test_trade_import_is_idempotent() {
    init_test_env().await;
    let cfg = Config::default();
    let service = Service::new(
        Arc::new(StubSignalAgent {
            side: Side::None,
            confidence: 0.0,
        }),
        RiskAgent::new(&cfg),
        PositionAgent::new(),
        Arc::new(StubExecutor),
    );

    let first = service
        .sync_trades_from_exchange("LTC/USDT")
        .await
        .unwrap();
    assert_eq!(first, 2);

    // 重复导入：同样的交易所成交 id 全部跳过
    let second = service
        .sync_trades_from_exchange("LTC/USDT")
        .await
        .unwrap();
    assert_eq!(second, 0);

    // 导入后按订单聚合的持仓：买 1.5 卖 0.5 → 剩 1.0
    let holdings = HoldingModel::new().list().await.unwrap();
    let h = holdings.iter().find(|h| h.pair == "LTC/USDT").unwrap();
    assert!((h.quantity - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_delete_cycle_cascades() {
    init_test_env().await;
    let service = make_service(Side::Long, 0.80);

    let result = service
        .run_cycle(RunRequest {
            pair: "DOT/USDT".to_string(),
            snapshot: Some(snapshot("DOT/USDT", 5.0)),
            portfolio: PortfolioState::default(),
        })
        .await
        .unwrap();

    assert!(service.get_cycle_report(&result.cycle.id).await.is_ok());

    service.delete_cycle(&result.cycle.id).await.unwrap();
    assert!(service.get_cycle_report(&result.cycle.id).await.is_err());
}

#[tokio::test]
async fn test_list_cycles_summary() {
    init_test_env().await;
    let service = make_service(Side::Long, 0.80);

    let result = service
        .run_cycle(RunRequest {
            pair: "AVAX/USDT".to_string(),
            snapshot: Some(snapshot("AVAX/USDT", 30.0)),
            portfolio: PortfolioState::default(),
        })
        .await
        .unwrap();

    let (cycles, total) = service.list_cycles(1, 100).await.unwrap();
    assert!(total >= 1);
    assert!(cycles.len() <= 100);

    let row = cycles
        .iter()
        .find(|c| c.cycle_id == result.cycle.id)
        .expect("cycle present in summary list");
    assert_eq!(row.pair, "AVAX/USDT");
    assert_eq!(row.status, CycleStatus::Success);
    assert_eq!(row.signal_side, Side::Long);
    assert!((row.confidence - 0.80).abs() < 1e-9);
    assert_eq!(row.total_tokens, 120);
    assert_eq!(row.model_name, "stub");
    assert_eq!(row.risk_approved, Some(true));
    assert_eq!(row.order_status, "simulated_filled");

    // 超界分页参数被钳制，不报错
    let (clamped, _) = service.list_cycles(0, 10_000).await.unwrap();
    assert!(clamped.len() <= 100);
}
