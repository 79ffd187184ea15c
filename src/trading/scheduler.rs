use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{error, info};

use crate::trading::domain::PortfolioState;
use crate::trading::orchestrator::{RunRequest, Service};

/// 定时自动执行交易周期。
/// 启动后等满一个完整间隔才触发第一轮（避免启动时突发）；
/// 每轮按配置顺序串行遍历交易对，单个失败不影响后续。
pub struct Scheduler {
    service: Arc<Service>,
    interval: Duration,
    pairs: Vec<String>,
    stop_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(service: Arc<Service>, interval_sec: u64, pairs_str: &str) -> Self {
        let mut pairs: Vec<String> = parse_pairs(pairs_str);
        if pairs.is_empty() {
            pairs = vec!["BTC/USDT".to_string()];
        }

        let (stop_tx, _) = watch::channel(false);
        Self {
            service,
            interval: Duration::from_secs(interval_sec.max(1)),
            pairs,
            stop_tx,
        }
    }

    /// 启动定时任务（非阻塞，在后台任务中运行）
    pub fn start(&self) {
        info!(
            "[定时器] 已启动 间隔={:?} 交易对={:?}",
            self.interval, self.pairs
        );

        let service = Arc::clone(&self.service);
        let pairs = self.pairs.clone();
        let period = self.interval;
        let mut stop_rx = self.stop_tx.subscribe();

        tokio::spawn(async move {
            // 不立即触发：第一轮在一个完整间隔之后
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_all(&service, &pairs).await;
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            info!("[定时器] 已停止");
                            return;
                        }
                    }
                }
            }
        });
    }

    /// 停止定时任务；正在执行的周期按自身超时自然结束
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

async fn run_all(service: &Arc<Service>, pairs: &[String]) {
    for pair in pairs {
        run_once(service, pair).await;
    }
}

async fn run_once(service: &Arc<Service>, pair: &str) {
    info!("[定时器] 自动执行 {}", pair);

    let result = tokio::time::timeout(
        Duration::from_secs(90),
        service.run_cycle(RunRequest {
            pair: pair.to_string(),
            snapshot: None,
            portfolio: PortfolioState::default(),
        }),
    )
    .await;

    match result {
        Ok(Ok(r)) => {
            info!(
                "[定时器] {} 执行完成 状态={} 信号={} 置信度={:.2}",
                pair, r.cycle.status, r.signal.side, r.signal.confidence
            );
        }
        Ok(Err(e)) => {
            error!("[定时器] {} 执行失败: {}", pair, e);
        }
        Err(_) => {
            error!("[定时器] {} 执行超时(90s)", pair);
        }
    }
}

/// 解析逗号分隔的交易对列表：去空格、大写、丢弃空项
pub fn parse_pairs(pairs_str: &str) -> Vec<String> {
    pairs_str
        .split(',')
        .map(|p| p.trim().to_uppercase())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        assert_eq!(
            parse_pairs("btc/usdt, DOGE/USDT ,eth/usdt"),
            vec!["BTC/USDT", "DOGE/USDT", "ETH/USDT"]
        );
        assert_eq!(parse_pairs(" , ,"), Vec::<String>::new());
        assert_eq!(parse_pairs(""), Vec::<String>::new());
    }
}
