pub mod cycle;
pub mod cycle_log;
pub mod holding;
pub mod order;
pub mod position_strategy;
pub mod risk_check;
pub mod signal;

use anyhow::{anyhow, Result};
use tracing::info;

use crate::app_config::db::get_db_client;
use crate::error::AppError;
use crate::trading::domain::CycleReport;

/// 建表与增量迁移语句。
/// ALTER TABLE ADD COLUMN 在列已存在时会报错，统一忽略此类错误，
/// 保证迁移可以安全地重复执行。
const SCHEMA_STMTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS cycles (
        id TEXT PRIMARY KEY,
        pair TEXT NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS signals (
        id TEXT PRIMARY KEY,
        cycle_id TEXT NOT NULL,
        pair TEXT NOT NULL,
        side TEXT NOT NULL,
        confidence REAL NOT NULL,
        reason TEXT NOT NULL,
        ttl_seconds INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY (cycle_id) REFERENCES cycles(id)
    );"#,
    r#"CREATE TABLE IF NOT EXISTS risk_checks (
        id TEXT PRIMARY KEY,
        cycle_id TEXT NOT NULL,
        signal_id TEXT NOT NULL,
        approved INTEGER NOT NULL,
        reject_reason TEXT,
        max_stake_usdt REAL NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY (cycle_id) REFERENCES cycles(id),
        FOREIGN KEY (signal_id) REFERENCES signals(id)
    );"#,
    r#"CREATE TABLE IF NOT EXISTS orders (
        id TEXT PRIMARY KEY,
        cycle_id TEXT NOT NULL,
        signal_id TEXT NOT NULL,
        client_order_id TEXT NOT NULL UNIQUE,
        pair TEXT NOT NULL,
        side TEXT NOT NULL,
        stake_usdt REAL NOT NULL,
        status TEXT NOT NULL,
        exchange_order_id TEXT,
        filled_price REAL,
        raw_response TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY (cycle_id) REFERENCES cycles(id),
        FOREIGN KEY (signal_id) REFERENCES signals(id)
    );"#,
    r#"CREATE TABLE IF NOT EXISTS cycle_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cycle_id TEXT NOT NULL,
        stage TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY (cycle_id) REFERENCES cycles(id)
    );"#,
    r#"CREATE TABLE IF NOT EXISTS holdings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        pair TEXT NOT NULL UNIQUE,
        symbol TEXT NOT NULL,
        quantity REAL NOT NULL DEFAULT 0,
        avg_price REAL NOT NULL DEFAULT 0,
        total_cost REAL NOT NULL DEFAULT 0,
        source TEXT NOT NULL DEFAULT 'local',
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS position_strategies (
        id TEXT PRIMARY KEY,
        cycle_id TEXT NOT NULL,
        signal_id TEXT NOT NULL,
        pair TEXT NOT NULL,
        side TEXT NOT NULL,
        strategy TEXT NOT NULL,
        total_amount REAL NOT NULL,
        entry_levels INTEGER NOT NULL,
        batches TEXT NOT NULL,
        take_profit_percent REAL NOT NULL,
        stop_loss_percent REAL NOT NULL,
        reason TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY (cycle_id) REFERENCES cycles(id),
        FOREIGN KEY (signal_id) REFERENCES signals(id)
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_signals_cycle_id ON signals(cycle_id);",
    "CREATE INDEX IF NOT EXISTS idx_position_strategies_cycle_id ON position_strategies(cycle_id);",
    "CREATE INDEX IF NOT EXISTS idx_risk_cycle_id ON risk_checks(cycle_id);",
    "CREATE INDEX IF NOT EXISTS idx_orders_cycle_id ON orders(cycle_id);",
    "CREATE INDEX IF NOT EXISTS idx_logs_cycle_id ON cycle_logs(cycle_id);",
    // 兼容旧库：添加 filled_qty 列（已存在则忽略）
    "ALTER TABLE orders ADD COLUMN filled_qty REAL;",
    // 兼容旧库：添加 thinking 列存储 AI 思维链
    "ALTER TABLE signals ADD COLUMN thinking TEXT;",
    // 兼容旧库：添加 token 用量列
    "ALTER TABLE signals ADD COLUMN prompt_tokens INTEGER DEFAULT 0;",
    "ALTER TABLE signals ADD COLUMN completion_tokens INTEGER DEFAULT 0;",
    "ALTER TABLE signals ADD COLUMN total_tokens INTEGER DEFAULT 0;",
    // 兼容旧库：添加 leverage 列（合约杠杆倍数）
    "ALTER TABLE orders ADD COLUMN leverage INTEGER DEFAULT 0;",
    // 兼容旧库：添加 model_name 列（记录使用的模型）
    "ALTER TABLE signals ADD COLUMN model_name TEXT DEFAULT '';",
];

/// 执行建表与增量迁移
pub async fn init_schema() -> Result<()> {
    let db = get_db_client();
    for stmt in SCHEMA_STMTS {
        if let Err(e) = db.exec(stmt, vec![]).await {
            if is_alter_table_duplicate(&e.to_string()) {
                continue;
            }
            return Err(AppError::DbError(format!("数据库迁移失败: {}", e)).into());
        }
    }
    Ok(())
}

/// 清空所有业务数据（保留表结构）
pub async fn reset_all_data() -> Result<()> {
    let db = get_db_client();
    let tables = [
        "holdings",
        "cycle_logs",
        "orders",
        "risk_checks",
        "position_strategies",
        "signals",
        "cycles",
    ];
    for t in tables {
        db.exec(&format!("DELETE FROM {}", t), vec![])
            .await
            .map_err(|e| anyhow!("清空表 {} 失败: {}", t, e))?;
    }
    // 重置自增 ID；sqlite_sequence 可能不存在，忽略
    let _ = db.exec("DELETE FROM sqlite_sequence", vec![]).await;
    info!("[数据] 所有业务数据已清空");
    Ok(())
}

/// 获取完整周期报告：周期 + 至多一条信号/风控/策略/订单 + 全部日志（按 id 升序）
pub async fn get_cycle_report(cycle_id: &str) -> Result<CycleReport> {
    let cycle = cycle::CycleModel::new()
        .get(cycle_id)
        .await?
        .ok_or_else(|| anyhow!("周期 {} 不存在", cycle_id))?;

    let signal = signal::SignalModel::new().latest_by_cycle(cycle_id).await?;
    let risk = risk_check::RiskCheckModel::new()
        .latest_by_cycle(cycle_id)
        .await?;
    let order = order::OrderModel::new().latest_by_cycle(cycle_id).await?;
    let position_strategy = position_strategy::PositionStrategyModel::new()
        .get_by_cycle(cycle_id)
        .await?;
    let logs = cycle_log::CycleLogModel::new().list_by_cycle(cycle_id).await?;

    Ok(CycleReport {
        cycle,
        signal,
        risk,
        position_strategy,
        order,
        logs,
    })
}

fn is_alter_table_duplicate(msg: &str) -> bool {
    msg.contains("duplicate column") || msg.contains("already exists")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_alter_table_duplicate() {
        assert!(is_alter_table_duplicate("duplicate column name: thinking"));
        assert!(is_alter_table_duplicate("column filled_qty already exists"));
        assert!(!is_alter_table_duplicate("no such table: orders"));
    }
}
