use once_cell::sync::OnceCell;
use rbatis::RBatis;
use rbdc_sqlite::SqliteDriver;

static DB_CLIENT: OnceCell<RBatis> = OnceCell::new();

/// 初始化 SQLite 连接（幂等，重复调用返回已有实例）
///
/// 连接池上限为 1：整个进程共用单个写连接，保证单写者纪律
pub async fn init_db(dsn: &str) -> anyhow::Result<&'static RBatis> {
    if let Some(rb) = DB_CLIENT.get() {
        return Ok(rb);
    }

    let rb = RBatis::new();
    rb.link(SqliteDriver {}, dsn).await?;
    if let Ok(pool) = rb.get_pool() {
        pool.set_max_open_conns(1).await;
    }

    // 并发初始化时可能已有其他任务抢先 set，忽略即可
    let _ = DB_CLIENT.set(rb);
    Ok(DB_CLIENT.get().expect("DB_CLIENT is not initialized"))
}

pub fn get_db_client() -> &'static RBatis {
    DB_CLIENT.get().expect("DB_CLIENT is not initialized")
}
