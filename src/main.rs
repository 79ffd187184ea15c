use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use ai_quant::auth::{init_global_auth_manager, AuthMode, Provider};
use ai_quant::trading::agent::execution::{Executor, FuturesExecutor, SpotExecutor};
use ai_quant::trading::agent::position::PositionAgent;
use ai_quant::trading::agent::risk::RiskAgent;
use ai_quant::trading::agent::signal::new_signal_agent;
use ai_quant::trading::model::holding::HoldingModel;
use ai_quant::trading::orchestrator::Service;
use ai_quant::trading::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = ai_quant::app_init().await?;

    // 全局 LLM 认证管理器
    let auth = init_global_auth_manager(
        cfg.llm_api_key.clone(),
        AuthMode::from_str(&cfg.llm_auth_mode),
        Provider::from_str(&cfg.llm_auth_provider),
    );
    info!(
        "LLM 认证管理器已初始化 模式={} 提供商={}",
        cfg.llm_auth_mode, cfg.llm_auth_provider
    );

    let signal_agent = new_signal_agent(&cfg, auth);
    let risk_agent = RiskAgent::new(&cfg);
    let position_agent = PositionAgent::new();

    // 根据交易模式选择执行端
    let executor: Arc<dyn Executor> = if cfg.trading_mode == "futures" {
        info!("交易模式: USDT-M 永续合约 ({}x 杠杆)", cfg.futures_leverage);
        Arc::new(FuturesExecutor::new(&cfg).await)
    } else {
        info!("交易模式: 现货交易");
        Arc::new(SpotExecutor::new(&cfg))
    };

    let service = Arc::new(Service::new(
        signal_agent,
        risk_agent,
        position_agent,
        executor,
    ));

    // 启动时同步持仓（holdings 表为空则自动同步）
    let holdings = HoldingModel::new().list().await.unwrap_or_default();
    if holdings.is_empty() {
        info!("[持仓] holdings 表为空，正在同步 ...");
        if let Err(e) = service.sync_holdings().await {
            warn!("[持仓] 初始同步失败: {}", e);
        }
    } else {
        info!("[持仓] 已有 {} 条持仓记录", holdings.len());
    }

    // 启动定时自动交易
    let scheduler = if cfg.auto_run_enabled {
        let s = Scheduler::new(
            Arc::clone(&service),
            cfg.auto_run_interval_sec,
            &cfg.auto_run_pairs,
        );
        s.start();
        Some(s)
    } else {
        info!("[定时器] 未启用，设置 AUTO_RUN_ENABLED=true 开启自动交易");
        None
    };

    info!(
        "AI Quant 服务启动 模式={} 模拟={} (Ctrl-C 退出)",
        cfg.trading_mode, cfg.dry_run
    );
    tokio::signal::ctrl_c().await?;

    if let Some(s) = scheduler {
        s.stop();
    }
    info!("服务已退出");
    Ok(())
}
