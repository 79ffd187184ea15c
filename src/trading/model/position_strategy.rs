use anyhow::{anyhow, Result};
use rbatis::{crud, impl_select, RBatis};
use serde::{Deserialize, Serialize};

use crate::app_config::db::get_db_client;
use crate::time_util;
use crate::trading::domain::{PositionStrategy, Side};

/// table；batches 以 JSON 文本存储
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct PositionStrategyEntity {
    pub id: String,
    pub cycle_id: String,
    pub signal_id: String,
    pub pair: String,
    pub side: String,
    pub strategy: String,
    pub total_amount: f64,
    pub entry_levels: i32,
    pub batches: String,
    pub take_profit_percent: f64,
    pub stop_loss_percent: f64,
    pub reason: String,
    pub created_at: String,
}

crud!(PositionStrategyEntity {}, "position_strategies");
impl_select!(PositionStrategyEntity{select_by_cycle(cycle_id:&str) => "`where cycle_id = #{cycle_id} limit 1`"},"position_strategies");

pub struct PositionStrategyModel {
    db: &'static RBatis,
}

impl PositionStrategyModel {
    pub fn new() -> Self {
        Self {
            db: get_db_client(),
        }
    }

    pub async fn add(&self, strategy: &PositionStrategy) -> Result<()> {
        let batches_json = serde_json::to_string(&strategy.batches)
            .map_err(|e| anyhow!("序列化批次数据失败: {}", e))?;
        let entity = PositionStrategyEntity {
            id: strategy.id.clone(),
            cycle_id: strategy.cycle_id.clone(),
            signal_id: strategy.signal_id.clone(),
            pair: strategy.pair.clone(),
            side: strategy.side.as_str().to_string(),
            strategy: strategy.strategy.clone(),
            total_amount: strategy.total_amount,
            entry_levels: strategy.entry_levels,
            batches: batches_json,
            take_profit_percent: strategy.take_profit_percent,
            stop_loss_percent: strategy.stop_loss_percent,
            reason: strategy.reason.clone(),
            created_at: time_util::to_ts_string(strategy.created_at),
        };
        PositionStrategyEntity::insert(self.db, &entity)
            .await
            .map_err(|e| anyhow!("插入建仓策略失败: {}", e))?;
        Ok(())
    }

    pub async fn get_by_cycle(&self, cycle_id: &str) -> Result<Option<PositionStrategy>> {
        let rows = PositionStrategyEntity::select_by_cycle(self.db, cycle_id).await?;
        let Some(entity) = rows.first() else {
            return Ok(None);
        };
        let batches = serde_json::from_str(&entity.batches)
            .map_err(|e| anyhow!("反序列化批次数据失败: {}", e))?;
        Ok(Some(PositionStrategy {
            id: entity.id.clone(),
            cycle_id: entity.cycle_id.clone(),
            signal_id: entity.signal_id.clone(),
            pair: entity.pair.clone(),
            side: Side::from_str(&entity.side),
            strategy: entity.strategy.clone(),
            total_amount: entity.total_amount,
            entry_levels: entity.entry_levels,
            batches,
            take_profit_percent: entity.take_profit_percent,
            stop_loss_percent: entity.stop_loss_percent,
            reason: entity.reason.clone(),
            created_at: time_util::parse_ts_string(&entity.created_at),
        }))
    }
}
