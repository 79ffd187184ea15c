use anyhow::{anyhow, Result};
use rbatis::{crud, RBatis};
use rbs::to_value;
use serde::{Deserialize, Serialize};

use crate::app_config::db::get_db_client;
use crate::time_util;
use crate::trading::domain::{Cycle, CycleStatus, CycleSummary, Side};

/// table
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct CycleEntity {
    pub id: String,
    pub pair: String,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

crud!(CycleEntity {}, "cycles");

impl CycleEntity {
    pub fn from_domain(c: &Cycle) -> Self {
        Self {
            id: c.id.clone(),
            pair: c.pair.clone(),
            status: c.status.as_str().to_string(),
            error_message: if c.error_message.is_empty() {
                None
            } else {
                Some(c.error_message.clone())
            },
            created_at: time_util::to_ts_string(c.created_at),
            updated_at: time_util::to_ts_string(c.updated_at),
        }
    }

    pub fn to_domain(&self) -> Cycle {
        Cycle {
            id: self.id.clone(),
            pair: self.pair.clone(),
            status: CycleStatus::from_str(&self.status),
            error_message: self.error_message.clone().unwrap_or_default(),
            created_at: time_util::parse_ts_string(&self.created_at),
            updated_at: time_util::parse_ts_string(&self.updated_at),
        }
    }
}

/// 分页查询的中间行（LEFT JOIN 展平）
#[derive(Serialize, Deserialize, Debug)]
struct CycleSummaryRow {
    cycle_id: String,
    pair: String,
    status: String,
    error_message: String,
    signal_side: String,
    confidence: f64,
    signal_reason: String,
    total_tokens: i64,
    model_name: String,
    risk_approved: Option<i64>,
    reject_reason: String,
    stake_usdt: f64,
    filled_price: f64,
    order_status: String,
    created_at: String,
}

pub struct CycleModel {
    db: &'static RBatis,
}

impl CycleModel {
    pub fn new() -> Self {
        Self {
            db: get_db_client(),
        }
    }

    /// 创建周期（要求 status=running）
    pub async fn create(&self, cycle: &Cycle) -> Result<()> {
        let entity = CycleEntity::from_domain(cycle);
        CycleEntity::insert(self.db, &entity)
            .await
            .map_err(|e| anyhow!("插入周期失败: {}", e))?;
        Ok(())
    }

    /// 更新周期状态（状态单调性由调用方保证，不在库层强制）
    pub async fn update_status(
        &self,
        cycle_id: &str,
        status: CycleStatus,
        err_msg: &str,
    ) -> Result<()> {
        let err_value = if err_msg.is_empty() {
            rbs::Value::Null
        } else {
            to_value!(err_msg)
        };
        self.db
            .exec(
                "UPDATE cycles SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
                vec![
                    to_value!(status.as_str()),
                    err_value,
                    to_value!(time_util::to_ts_string(time_util::now_utc())),
                    to_value!(cycle_id),
                ],
            )
            .await
            .map_err(|e| anyhow!("更新周期状态失败: {}", e))?;
        Ok(())
    }

    pub async fn get(&self, cycle_id: &str) -> Result<Option<Cycle>> {
        let rows = CycleEntity::select_by_column(self.db, "id", cycle_id).await?;
        Ok(rows.first().map(|e| e.to_domain()))
    }

    /// 删除周期及其关联的所有数据（信号、风控、订单、日志、建仓策略），单事务
    pub async fn delete_cascade(&self, cycle_id: &str) -> Result<()> {
        let mut tx = self.db.acquire_begin().await?;

        let dependents = [
            "cycle_logs",
            "orders",
            "risk_checks",
            "position_strategies",
            "signals",
        ];
        for table in dependents {
            if let Err(e) = tx
                .exec(
                    &format!("DELETE FROM {} WHERE cycle_id = ?", table),
                    vec![to_value!(cycle_id)],
                )
                .await
            {
                let _ = tx.rollback().await;
                return Err(anyhow!("删除 {} 失败: {}", table, e));
            }
        }
        if let Err(e) = tx
            .exec("DELETE FROM cycles WHERE id = ?", vec![to_value!(cycle_id)])
            .await
        {
            let _ = tx.rollback().await;
            return Err(anyhow!("删除 cycles 失败: {}", e));
        }

        tx.commit().await.map_err(|e| anyhow!("提交事务失败: {}", e))?;
        Ok(())
    }

    /// 统计周期总数
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = self
            .db
            .query_decode("SELECT COUNT(*) FROM cycles", vec![])
            .await?;
        Ok(count)
    }

    /// 分页查询周期摘要（含信号、风控、订单关键字段），按创建时间倒序。
    /// page 下限 1，page_size 约束到 [1, 100]
    pub async fn list_summaries(&self, page: i64, page_size: i64) -> Result<Vec<CycleSummary>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        let rows: Vec<CycleSummaryRow> = self
            .db
            .query_decode(
                r#"
            SELECT
                c.id AS cycle_id, c.pair AS pair, c.status AS status,
                COALESCE(c.error_message, '') AS error_message,
                COALESCE(s.side, '') AS signal_side,
                COALESCE(s.confidence, 0.0) AS confidence,
                COALESCE(s.reason, '') AS signal_reason,
                COALESCE(s.total_tokens, 0) AS total_tokens,
                COALESCE(s.model_name, '') AS model_name,
                r.approved AS risk_approved,
                COALESCE(r.reject_reason, '') AS reject_reason,
                COALESCE(o.stake_usdt, 0.0) AS stake_usdt,
                COALESCE(o.filled_price, 0.0) AS filled_price,
                COALESCE(o.status, '') AS order_status,
                c.created_at AS created_at
            FROM cycles c
            LEFT JOIN signals s ON s.cycle_id = c.id
            LEFT JOIN risk_checks r ON r.cycle_id = c.id
            LEFT JOIN orders o ON o.cycle_id = c.id
            ORDER BY c.created_at DESC
            LIMIT ? OFFSET ?
            "#,
                vec![to_value!(page_size), to_value!(offset)],
            )
            .await
            .map_err(|e| anyhow!("查询周期列表失败: {}", e))?;

        Ok(rows
            .into_iter()
            .map(|r| CycleSummary {
                cycle_id: r.cycle_id,
                pair: r.pair,
                status: CycleStatus::from_str(&r.status),
                signal_side: Side::from_str(&r.signal_side),
                confidence: r.confidence,
                signal_reason: r.signal_reason,
                total_tokens: r.total_tokens,
                model_name: r.model_name,
                risk_approved: r.risk_approved.map(|v| v == 1),
                reject_reason: r.reject_reason,
                stake_usdt: r.stake_usdt,
                filled_price: r.filled_price,
                order_status: r.order_status,
                error_message: r.error_message,
                created_at: time_util::parse_ts_string(&r.created_at),
            })
            .collect())
    }
}
