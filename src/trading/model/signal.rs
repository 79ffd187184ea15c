use anyhow::{anyhow, Result};
use rbatis::{crud, impl_select, RBatis};
use serde::{Deserialize, Serialize};

use crate::app_config::db::get_db_client;
use crate::time_util;
use crate::trading::domain::{Side, Signal};

/// table
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct SignalEntity {
    pub id: String,
    pub cycle_id: String,
    pub pair: String,
    pub side: String,
    pub confidence: f64,
    pub reason: String,
    pub thinking: Option<String>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub model_name: String,
    pub ttl_seconds: i64,
    pub created_at: String,
}

crud!(SignalEntity {}, "signals");
impl_select!(SignalEntity{select_latest_by_cycle(cycle_id:&str) => "`where cycle_id = #{cycle_id} order by created_at desc limit 1`"},"signals");

impl SignalEntity {
    pub fn from_domain(s: &Signal) -> Self {
        Self {
            id: s.id.clone(),
            cycle_id: s.cycle_id.clone(),
            pair: s.pair.clone(),
            side: s.side.as_str().to_string(),
            confidence: s.confidence,
            reason: s.reason.clone(),
            thinking: if s.thinking.is_empty() {
                None
            } else {
                Some(s.thinking.clone())
            },
            prompt_tokens: s.prompt_tokens,
            completion_tokens: s.completion_tokens,
            total_tokens: s.total_tokens,
            model_name: s.model_name.clone(),
            ttl_seconds: s.ttl_seconds,
            created_at: time_util::to_ts_string(s.created_at),
        }
    }

    pub fn to_domain(&self) -> Signal {
        Signal {
            id: self.id.clone(),
            cycle_id: self.cycle_id.clone(),
            pair: self.pair.clone(),
            side: Side::from_str(&self.side),
            confidence: self.confidence,
            reason: self.reason.clone(),
            thinking: self.thinking.clone().unwrap_or_default(),
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
            model_name: self.model_name.clone(),
            ttl_seconds: self.ttl_seconds,
            created_at: time_util::parse_ts_string(&self.created_at),
        }
    }
}

pub struct SignalModel {
    db: &'static RBatis,
}

impl SignalModel {
    pub fn new() -> Self {
        Self {
            db: get_db_client(),
        }
    }

    pub async fn add(&self, signal: &Signal) -> Result<()> {
        let entity = SignalEntity::from_domain(signal);
        SignalEntity::insert(self.db, &entity)
            .await
            .map_err(|e| anyhow!("插入信号失败: {}", e))?;
        Ok(())
    }

    pub async fn latest_by_cycle(&self, cycle_id: &str) -> Result<Option<Signal>> {
        let rows = SignalEntity::select_latest_by_cycle(self.db, cycle_id).await?;
        Ok(rows.first().map(|e| e.to_domain()))
    }
}
