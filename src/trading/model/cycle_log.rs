use anyhow::{anyhow, Result};
use rbatis::{crud, impl_select, RBatis};
use serde::{Deserialize, Serialize};

use crate::app_config::db::get_db_client;
use crate::time_util;
use crate::trading::domain::CycleLog;

/// table；id 为自增主键，插入时置 NULL
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct CycleLogEntity {
    pub id: Option<i64>,
    pub cycle_id: String,
    pub stage: String,
    pub message: String,
    pub created_at: String,
}

crud!(CycleLogEntity {}, "cycle_logs");
impl_select!(CycleLogEntity{select_by_cycle(cycle_id:&str) => "`where cycle_id = #{cycle_id} order by id asc`"},"cycle_logs");

pub struct CycleLogModel {
    db: &'static RBatis,
}

impl CycleLogModel {
    pub fn new() -> Self {
        Self {
            db: get_db_client(),
        }
    }

    pub async fn add(&self, cycle_id: &str, stage: &str, message: &str) -> Result<CycleLog> {
        let now = time_util::now_utc();
        let entity = CycleLogEntity {
            id: None,
            cycle_id: cycle_id.to_string(),
            stage: stage.to_string(),
            message: message.to_string(),
            created_at: time_util::to_ts_string(now),
        };
        let res = CycleLogEntity::insert(self.db, &entity)
            .await
            .map_err(|e| anyhow!("插入周期日志失败: {}", e))?;
        Ok(CycleLog {
            id: res.last_insert_id.as_i64().unwrap_or(0),
            cycle_id: cycle_id.to_string(),
            stage: stage.to_string(),
            message: message.to_string(),
            created_at: now,
        })
    }

    /// 按自增 id 升序，即周期的标准回放顺序
    pub async fn list_by_cycle(&self, cycle_id: &str) -> Result<Vec<CycleLog>> {
        let rows = CycleLogEntity::select_by_cycle(self.db, cycle_id).await?;
        Ok(rows
            .into_iter()
            .map(|e| CycleLog {
                id: e.id.unwrap_or(0),
                cycle_id: e.cycle_id,
                stage: e.stage,
                message: e.message,
                created_at: time_util::parse_ts_string(&e.created_at),
            })
            .collect())
    }
}
