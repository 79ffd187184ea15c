use std::collections::HashMap;

use anyhow::{anyhow, Result};
use rbatis::RBatis;
use rbs::to_value;
use serde::{Deserialize, Serialize};

use crate::app_config::db::get_db_client;
use crate::time_util;
use crate::trading::domain::Holding;

/// table
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct HoldingEntity {
    pub id: i64,
    pub pair: String,
    pub symbol: String,
    pub quantity: f64,
    pub avg_price: f64,
    pub total_cost: f64,
    pub source: String,
    pub updated_at: String,
}

impl HoldingEntity {
    pub fn to_domain(&self) -> Holding {
        Holding {
            id: self.id,
            pair: self.pair.clone(),
            symbol: self.symbol.clone(),
            quantity: self.quantity,
            avg_price: self.avg_price,
            total_cost: self.total_cost,
            source: self.source.clone(),
            updated_at: time_util::parse_ts_string(&self.updated_at),
        }
    }
}

/// 订单回放的中间行
#[derive(Serialize, Deserialize, Debug)]
struct FilledOrderRow {
    pair: String,
    side: String,
    filled_price: f64,
    filled_qty: f64,
}

pub struct HoldingModel {
    db: &'static RBatis,
}

impl HoldingModel {
    pub fn new() -> Self {
        Self {
            db: get_db_client(),
        }
    }

    /// 插入或更新持仓（按 pair 唯一键）
    pub async fn upsert(&self, h: &Holding) -> Result<()> {
        self.db
            .exec(
                r#"
            INSERT INTO holdings (pair, symbol, quantity, avg_price, total_cost, source, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(pair) DO UPDATE SET
                quantity   = excluded.quantity,
                avg_price  = excluded.avg_price,
                total_cost = excluded.total_cost,
                source     = excluded.source,
                updated_at = excluded.updated_at
            "#,
                vec![
                    to_value!(&h.pair),
                    to_value!(&h.symbol),
                    to_value!(h.quantity),
                    to_value!(h.avg_price),
                    to_value!(h.total_cost),
                    to_value!(&h.source),
                    to_value!(time_util::to_ts_string(h.updated_at)),
                ],
            )
            .await
            .map_err(|e| anyhow!("更新持仓失败: {}", e))?;
        Ok(())
    }

    /// 获取全部持仓记录（仅 quantity > 0，按总成本倒序）
    pub async fn list(&self) -> Result<Vec<Holding>> {
        let rows: Vec<HoldingEntity> = self
            .db
            .query_decode(
                r#"
            SELECT id, pair, symbol, quantity, avg_price, total_cost, source, updated_at
            FROM holdings
            WHERE quantity > 0
            ORDER BY total_cost DESC
            "#,
                vec![],
            )
            .await
            .map_err(|e| anyhow!("查询持仓失败: {}", e))?;
        Ok(rows.iter().map(|e| e.to_domain()).collect())
    }

    /// 从历史订单聚合计算各币对当前持仓。
    /// 按时间正序回放已成交订单：买入增加持仓和成本，
    /// 卖出按比例减少成本并扣减数量，下限为零。
    pub async fn aggregate_from_orders(&self) -> Result<Vec<Holding>> {
        let rows: Vec<FilledOrderRow> = self
            .db
            .query_decode(
                r#"
            SELECT pair, side, filled_price, filled_qty
            FROM orders
            WHERE status IN ('filled', 'simulated_filled')
              AND filled_qty > 0 AND filled_price > 0
            ORDER BY created_at ASC
            "#,
                vec![],
            )
            .await
            .map_err(|e| anyhow!("查询订单聚合失败: {}", e))?;

        struct Acc {
            qty: f64,
            total_cost: f64,
        }
        let mut pair_map: HashMap<String, Acc> = HashMap::new();

        for row in rows {
            let acc = pair_map.entry(row.pair.clone()).or_insert(Acc {
                qty: 0.0,
                total_cost: 0.0,
            });
            match row.side.as_str() {
                "long" => {
                    acc.total_cost += row.filled_qty * row.filled_price;
                    acc.qty += row.filled_qty;
                }
                "close" => {
                    if acc.qty > 0.0 {
                        let ratio = (row.filled_qty / acc.qty).min(1.0);
                        acc.total_cost -= acc.total_cost * ratio;
                    }
                    acc.qty -= row.filled_qty;
                    if acc.qty < 0.0 {
                        acc.qty = 0.0;
                        acc.total_cost = 0.0;
                    }
                }
                _ => {}
            }
        }

        let now = time_util::now_utc();
        let mut result = Vec::with_capacity(pair_map.len());
        for (pair, acc) in pair_map {
            if acc.qty <= 0.0 {
                continue;
            }
            let symbol = pair.split('/').next().unwrap_or(&pair).to_string();
            let avg_price = if acc.qty > 0.0 {
                acc.total_cost / acc.qty
            } else {
                0.0
            };
            result.push(Holding {
                id: 0,
                pair,
                symbol,
                quantity: acc.qty,
                avg_price,
                total_cost: acc.total_cost,
                source: "local".to_string(),
                updated_at: now,
            });
        }
        Ok(result)
    }
}
