//! Pool under contention: many tasks competing for a small pool never
//! exceed `max_connections` and all eventually complete.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cluster_monitor::error::PoolError;
use cluster_monitor::pool::{Connector, Pool, PoolConfig};

#[derive(Default)]
struct SlowConnector {
    opened: Arc<AtomicUsize>,
    in_use: Arc<AtomicUsize>,
    max_observed_in_use: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for SlowConnector {
    type Connection = u64;

    async fn connect(&self) -> Result<u64, PoolError> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst) as u64;
        Ok(n)
    }

    async fn health_check(&self, _conn: &mut u64, _query: &str) -> bool {
        true
    }
}

#[tokio::test]
async fn contention_never_exceeds_max_connections() {
    let connector = SlowConnector::default();
    let in_use = connector.in_use.clone();
    let max_observed = connector.max_observed_in_use.clone();

    let pool = Pool::new(connector, PoolConfig {
        min_connections: 0,
        max_connections: 4,
        initial_connections: 0,
        acquire_timeout: Duration::from_secs(2),
        health_check_interval: Duration::from_secs(3600),
        ..PoolConfig::default()
    })
    .await
    .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let pool = pool.clone();
        let in_use = in_use.clone();
        let max_observed = max_observed.clone();
        tasks.push(tokio::spawn(async move {
            let _guard = pool.acquire().await.expect("acquire should eventually succeed");
            let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
            max_observed.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            in_use.fetch_sub(1, Ordering::SeqCst);
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    assert!(max_observed.load(Ordering::SeqCst) <= 4);

    let stats = pool.stats().await;
    assert!(stats.total <= 4);
    assert_eq!(stats.active, 0, "every guard was dropped by the time its task returned");
}
