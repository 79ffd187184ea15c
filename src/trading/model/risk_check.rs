use anyhow::{anyhow, Result};
use rbatis::{crud, impl_select, RBatis};
use serde::{Deserialize, Serialize};

use crate::app_config::db::get_db_client;
use crate::time_util;
use crate::trading::domain::RiskDecision;

/// table
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct RiskCheckEntity {
    pub id: String,
    pub cycle_id: String,
    pub signal_id: String,
    pub approved: i32,
    pub reject_reason: Option<String>,
    pub max_stake_usdt: f64,
    pub created_at: String,
}

crud!(RiskCheckEntity {}, "risk_checks");
impl_select!(RiskCheckEntity{select_latest_by_cycle(cycle_id:&str) => "`where cycle_id = #{cycle_id} order by created_at desc limit 1`"},"risk_checks");

impl RiskCheckEntity {
    pub fn from_domain(d: &RiskDecision) -> Self {
        Self {
            id: d.id.clone(),
            cycle_id: d.cycle_id.clone(),
            signal_id: d.signal_id.clone(),
            approved: if d.approved { 1 } else { 0 },
            reject_reason: if d.reject_reason.is_empty() {
                None
            } else {
                Some(d.reject_reason.clone())
            },
            max_stake_usdt: d.max_stake_usdt,
            created_at: time_util::to_ts_string(d.created_at),
        }
    }

    pub fn to_domain(&self) -> RiskDecision {
        RiskDecision {
            id: self.id.clone(),
            cycle_id: self.cycle_id.clone(),
            signal_id: self.signal_id.clone(),
            approved: self.approved == 1,
            reject_reason: self.reject_reason.clone().unwrap_or_default(),
            max_stake_usdt: self.max_stake_usdt,
            created_at: time_util::parse_ts_string(&self.created_at),
        }
    }
}

pub struct RiskCheckModel {
    db: &'static RBatis,
}

impl RiskCheckModel {
    pub fn new() -> Self {
        Self {
            db: get_db_client(),
        }
    }

    pub async fn add(&self, decision: &RiskDecision) -> Result<()> {
        let entity = RiskCheckEntity::from_domain(decision);
        RiskCheckEntity::insert(self.db, &entity)
            .await
            .map_err(|e| anyhow!("插入风控决策失败: {}", e))?;
        Ok(())
    }

    pub async fn latest_by_cycle(&self, cycle_id: &str) -> Result<Option<RiskDecision>> {
        let rows = RiskCheckEntity::select_latest_by_cycle(self.db, cycle_id).await?;
        Ok(rows.first().map(|e| e.to_domain()))
    }
}
