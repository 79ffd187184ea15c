#![allow(dead_code)]
#![allow(unused_imports)]

pub mod app_config;
pub mod auth;
pub mod error;
pub mod time_util;
pub mod trading;

use dotenv::dotenv;

use crate::app_config::Config;

/// 应用初始化：加载 .env、日志、数据库连接与迁移
pub async fn app_init() -> anyhow::Result<Config> {
    //设置env
    dotenv().ok();
    let cfg = Config::load();

    // 设置日志
    crate::app_config::log::setup_logging().await?;

    //初始化数据库连接 + 表结构迁移
    crate::app_config::db::init_db(&cfg.sqlite_dsn).await?;
    crate::trading::model::init_schema().await?;

    Ok(cfg)
}
