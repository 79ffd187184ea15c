use anyhow::{anyhow, Result};
use rbatis::{crud, impl_select, RBatis};
use rbs::to_value;
use serde::{Deserialize, Serialize};

use crate::app_config::db::get_db_client;
use crate::time_util;
use crate::trading::domain::{Order, PositionView, Side};

/// table
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct OrderEntity {
    pub id: String,
    pub cycle_id: String,
    pub signal_id: String,
    pub client_order_id: String,
    pub pair: String,
    pub side: String,
    pub stake_usdt: f64,
    pub leverage: i32,
    pub status: String,
    pub exchange_order_id: Option<String>,
    pub filled_price: Option<f64>,
    pub filled_qty: Option<f64>,
    pub raw_response: Option<String>,
    pub created_at: String,
}

crud!(OrderEntity {}, "orders");
impl_select!(OrderEntity{select_latest_by_cycle(cycle_id:&str) => "`where cycle_id = #{cycle_id} order by created_at desc limit 1`"},"orders");

impl OrderEntity {
    pub fn from_domain(o: &Order) -> Self {
        Self {
            id: o.id.clone(),
            cycle_id: o.cycle_id.clone(),
            signal_id: o.signal_id.clone(),
            client_order_id: o.client_order_id.clone(),
            pair: o.pair.clone(),
            side: o.side.as_str().to_string(),
            stake_usdt: o.stake_usdt,
            leverage: o.leverage,
            status: o.status.clone(),
            exchange_order_id: if o.exchange_order_id.is_empty() {
                None
            } else {
                Some(o.exchange_order_id.clone())
            },
            filled_price: if o.filled_price == 0.0 {
                None
            } else {
                Some(o.filled_price)
            },
            filled_qty: if o.filled_quantity == 0.0 {
                None
            } else {
                Some(o.filled_quantity)
            },
            raw_response: if o.raw_response.is_empty() {
                None
            } else {
                Some(o.raw_response.clone())
            },
            created_at: time_util::to_ts_string(o.created_at),
        }
    }

    pub fn to_domain(&self) -> Order {
        Order {
            id: self.id.clone(),
            cycle_id: self.cycle_id.clone(),
            signal_id: self.signal_id.clone(),
            client_order_id: self.client_order_id.clone(),
            pair: self.pair.clone(),
            side: Side::from_str(&self.side),
            stake_usdt: self.stake_usdt,
            leverage: self.leverage,
            status: self.status.clone(),
            exchange_order_id: self.exchange_order_id.clone().unwrap_or_default(),
            filled_price: self.filled_price.unwrap_or(0.0),
            filled_quantity: self.filled_qty.unwrap_or(0.0),
            raw_response: self.raw_response.clone().unwrap_or_default(),
            created_at: time_util::parse_ts_string(&self.created_at),
        }
    }
}

/// 仓位视图中间行
#[derive(Serialize, Deserialize, Debug)]
struct PositionViewRow {
    order_id: String,
    cycle_id: String,
    pair: String,
    side: String,
    stake_usdt: f64,
    filled_price: Option<f64>,
    filled_qty: Option<f64>,
    status: String,
    exchange_order_id: String,
    signal_reason: String,
    confidence: f64,
    cycle_status: String,
    created_at: String,
}

pub struct OrderModel {
    db: &'static RBatis,
}

impl OrderModel {
    pub fn new() -> Self {
        Self {
            db: get_db_client(),
        }
    }

    /// 插入订单；client_order_id 唯一约束提供幂等
    pub async fn add(&self, order: &Order) -> Result<()> {
        let entity = OrderEntity::from_domain(order);
        OrderEntity::insert(self.db, &entity)
            .await
            .map_err(|e| anyhow!("插入订单失败: {}", e))?;
        Ok(())
    }

    pub async fn latest_by_cycle(&self, cycle_id: &str) -> Result<Option<Order>> {
        let rows = OrderEntity::select_latest_by_cycle(self.db, cycle_id).await?;
        Ok(rows.first().map(|e| e.to_domain()))
    }

    /// 检查某个交易所订单 ID 是否已存在（导入外部成交记录时去重）
    pub async fn exists_by_exchange_id(&self, exchange_order_id: &str) -> Result<bool> {
        let count: i64 = self
            .db
            .query_decode(
                "SELECT COUNT(*) FROM orders WHERE exchange_order_id = ?",
                vec![to_value!(exchange_order_id)],
            )
            .await?;
        Ok(count > 0)
    }

    /// 仓位列表：orders × signals × cycles 连接视图，按时间倒序
    pub async fn list_positions(&self, limit: i64) -> Result<Vec<PositionView>> {
        let limit = if limit <= 0 { 50 } else { limit };
        let rows: Vec<PositionViewRow> = self
            .db
            .query_decode(
                r#"
            SELECT
                o.id AS order_id, o.cycle_id AS cycle_id, o.pair AS pair, o.side AS side,
                o.stake_usdt AS stake_usdt, o.filled_price AS filled_price,
                o.filled_qty AS filled_qty, o.status AS status,
                COALESCE(o.exchange_order_id, '') AS exchange_order_id,
                s.reason AS signal_reason, s.confidence AS confidence,
                c.status AS cycle_status, o.created_at AS created_at
            FROM orders o
            JOIN signals s ON s.cycle_id = o.cycle_id
            JOIN cycles c ON c.id = o.cycle_id
            ORDER BY o.created_at DESC
            LIMIT ?
            "#,
                vec![to_value!(limit)],
            )
            .await
            .map_err(|e| anyhow!("查询仓位列表失败: {}", e))?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let filled_price = r.filled_price.unwrap_or(0.0);
                let filled_quantity = match r.filled_qty {
                    Some(q) => q,
                    // 旧数据兜底计算
                    None if filled_price > 0.0 && r.stake_usdt > 0.0 => {
                        r.stake_usdt / filled_price
                    }
                    None => 0.0,
                };
                PositionView {
                    order_id: r.order_id,
                    cycle_id: r.cycle_id,
                    pair: r.pair,
                    side: Side::from_str(&r.side),
                    stake_usdt: r.stake_usdt,
                    filled_price,
                    filled_quantity,
                    status: r.status,
                    exchange_order_id: r.exchange_order_id,
                    signal_reason: r.signal_reason,
                    confidence: r.confidence,
                    cycle_status: r.cycle_status,
                    created_at: time_util::parse_ts_string(&r.created_at),
                }
            })
            .collect())
    }
}
