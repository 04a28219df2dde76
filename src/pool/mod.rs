//! Generic bounded connection pool.
//!
//! Backend-agnostic: callers supply a [`Connector`] (how to open a
//! connection and how to health-check one) and get back a [`Pool`] that
//! handles warm-up, idle/lifetime reaping, health checks, and
//! acquire-with-timeout the same way regardless of whether the backing
//! connection is a MySQL session or a TDengine session.
//!
//! This replaces the manually reference-counted connection handles and
//! scattered reconnect loops of the original design: callers acquire a
//! [`PoolGuard`], use it, and let `Drop` return it (or a caller that
//! detected a broken connection can call [`PoolGuard::mark_broken`]
//! before dropping it).

mod connectors;
mod guard;
mod maintenance;

pub use connectors::{MySqlConnector, TaosConnector};
pub use guard::PoolGuard;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};

use crate::error::PoolError;

/// How to open and health-check a connection of type `Self::Connection`.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self) -> Result<Self::Connection, PoolError>;

    /// Send the configured sentinel query; `false` means the connection
    /// is considered broken and will be discarded.
    async fn health_check(&self, conn: &mut Self::Connection, query: &str) -> bool;
}

/// Pool configuration (§4.1). All durations are expressed in whole
/// seconds/milliseconds for trivial YAML round-tripping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_connections: usize,
    pub max_connections: usize,
    pub initial_connections: usize,
    pub connection_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub health_check_interval: Duration,
    pub health_check_query: String,
    pub auto_reconnect: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            initial_connections: 1,
            connection_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(3600),
            health_check_interval: Duration::from_secs(60),
            health_check_query: "SELECT 1".to_string(),
            auto_reconnect: true,
        }
    }
}

/// Point-in-time pool counters exposed via `stats()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    pub pending_waiters: usize,
    pub created_total: u64,
    pub destroyed_total: u64,
    pub average_wait_ms: f64,
}

pub(crate) struct Idle<C> {
    pub conn: C,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub use_count: u64,
}

struct Counters {
    created_total: AtomicU64,
    destroyed_total: AtomicU64,
    pending_waiters: AtomicUsize,
    active: AtomicUsize,
    wait_samples: AtomicU64,
    wait_total_ms: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            created_total: AtomicU64::new(0),
            destroyed_total: AtomicU64::new(0),
            pending_waiters: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            wait_samples: AtomicU64::new(0),
            wait_total_ms: AtomicU64::new(0),
        }
    }
}

pub(crate) struct Inner<C: Connector> {
    connector: C,
    config: std::sync::RwLock<PoolConfig>,
    idle: Mutex<VecDeque<Idle<C::Connection>>>,
    semaphore: Arc<Semaphore>,
    shutdown: AtomicBool,
    counters: Counters,
}

/// A bounded pool of connections of type `C::Connection`.
///
/// Cheaply clonable: internally an `Arc`, so every component that needs
/// a handle to the same pool just clones it.
pub struct Pool<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Connector> Pool<C> {
    /// Construct a pool and eagerly open `initial_connections`.
    pub async fn new(connector: C, config: PoolConfig) -> Result<Self, PoolError> {
        let max = config.max_connections.max(1);
        let inner = Arc::new(Inner {
            connector,
            semaphore: Arc::new(Semaphore::new(max)),
            idle: Mutex::new(VecDeque::with_capacity(max)),
            config: std::sync::RwLock::new(config.clone()),
            shutdown: AtomicBool::new(false),
            counters: Counters::default(),
        });

        let pool = Self { inner };
        for _ in 0..config.initial_connections.min(max) {
            match pool.inner.connector.connect().await {
                Ok(conn) => {
                    let now = Instant::now();
                    pool.inner.counters.created_total.fetch_add(1, Ordering::Relaxed);
                    pool.inner.idle.lock().await.push_back(Idle {
                        conn,
                        created_at: now,
                        last_used_at: now,
                        use_count: 0,
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to eagerly open initial pool connection");
                }
            }
        }

        maintenance::spawn(pool.inner.clone());
        Ok(pool)
    }

    /// Lease a connection, waiting up to `acquire_timeout` if none is
    /// immediately available and the pool is already at `max_connections`.
    pub async fn acquire(&self) -> Result<PoolGuard<C>, PoolError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::Unavailable);
        }

        let acquire_timeout = self.inner.config.read().unwrap().acquire_timeout;
        self.inner.counters.pending_waiters.fetch_add(1, Ordering::Relaxed);
        let wait_start = Instant::now();

        let permit_result =
            tokio::time::timeout(acquire_timeout, Arc::clone(&self.inner.semaphore).acquire_owned())
                .await;
        self.inner.counters.pending_waiters.fetch_sub(1, Ordering::Relaxed);

        let permit = match permit_result {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Unavailable), // semaphore closed on shutdown
            Err(_) => return Err(PoolError::Exhausted),
        };

        let waited_ms = wait_start.elapsed().as_millis() as u64;
        self.inner.counters.wait_samples.fetch_add(1, Ordering::Relaxed);
        self.inner.counters.wait_total_ms.fetch_add(waited_ms, Ordering::Relaxed);

        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::Unavailable);
        }

        // Prefer a warm idle connection.
        if let Some(idle) = self.inner.idle.lock().await.pop_front() {
            self.inner.counters.active.fetch_add(1, Ordering::Relaxed);
            return Ok(PoolGuard::new(self.clone(), idle.conn, permit, idle.use_count));
        }

        // Otherwise open a new one, with a small bounded retry budget
        // within whatever's left of the acquire timeout.
        let remaining = acquire_timeout.saturating_sub(wait_start.elapsed());
        let deadline = Instant::now() + remaining.max(Duration::from_millis(1));
        let mut last_err = None;
        for attempt in 0..3 {
            if Instant::now() >= deadline {
                break;
            }
            match self.inner.connector.connect().await {
                Ok(conn) => {
                    self.inner.counters.created_total.fetch_add(1, Ordering::Relaxed);
                    self.inner.counters.active.fetch_add(1, Ordering::Relaxed);
                    return Ok(PoolGuard::new(self.clone(), conn, permit, 0));
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "pool connect attempt failed, retrying");
                    last_err = Some(e);
                }
            }
        }

        // Failed to open a connection; release the permit back since we
        // are not returning a guard that would do it for us.
        drop(permit);
        Err(last_err.unwrap_or(PoolError::Backend("connect failed with no error detail".into())))
    }

    /// Snapshot of current pool counters.
    pub async fn stats(&self) -> PoolStats {
        let idle = self.inner.idle.lock().await.len();
        let active = self.inner.counters.active.load(Ordering::Relaxed);
        let samples = self.inner.counters.wait_samples.load(Ordering::Relaxed);
        let total_ms = self.inner.counters.wait_total_ms.load(Ordering::Relaxed);
        PoolStats {
            total: idle + active,
            active,
            idle,
            pending_waiters: self.inner.counters.pending_waiters.load(Ordering::Relaxed),
            created_total: self.inner.counters.created_total.load(Ordering::Relaxed),
            destroyed_total: self.inner.counters.destroyed_total.load(Ordering::Relaxed),
            average_wait_ms: if samples == 0 { 0.0 } else { total_ms as f64 / samples as f64 },
        }
    }

    /// Atomically swap the pool's configuration; affects subsequent
    /// acquires and the next maintenance tick. Does not resize the
    /// semaphore retroactively if `max_connections` shrinks — connections
    /// above the new cap are reaped by maintenance as they're released.
    pub fn update_config(&self, config: PoolConfig) {
        *self.inner.config.write().unwrap() = config;
    }

    pub fn config(&self) -> PoolConfig {
        self.inner.config.read().unwrap().clone()
    }

    /// Drain and close every connection; subsequent `acquire()` calls
    /// fail immediately with `PoolError::Unavailable`.
    pub async fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.semaphore.close();
        let mut idle = self.inner.idle.lock().await;
        let drained = idle.len() as u64;
        idle.clear();
        self.inner.counters.destroyed_total.fetch_add(drained, Ordering::Relaxed);
    }

    pub(crate) fn inner(&self) -> &Arc<Inner<C>> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[derive(Default)]
    struct CountingConnector {
        opened: Arc<StdAtomicUsize>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Connection = u64;

        async fn connect(&self) -> Result<u64, PoolError> {
            let n = self.opened.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.fail_after {
                if n >= limit {
                    return Err(PoolError::Backend("simulated connect failure".into()));
                }
            }
            Ok(n as u64)
        }

        async fn health_check(&self, _conn: &mut u64, _query: &str) -> bool {
            true
        }
    }

    fn small_config() -> PoolConfig {
        PoolConfig {
            min_connections: 0,
            max_connections: 2,
            initial_connections: 0,
            acquire_timeout: Duration::from_millis(200),
            health_check_interval: Duration::from_secs(3600),
            ..PoolConfig::default()
        }
    }

    #[tokio::test]
    async fn acquire_creates_up_to_max_then_blocks_and_exhausts() {
        let connector = CountingConnector { opened: Arc::new(StdAtomicUsize::new(0)), fail_after: None };
        let pool = Pool::new(connector, small_config()).await.unwrap();

        let g1 = pool.acquire().await.expect("first acquire succeeds");
        let g2 = pool.acquire().await.expect("second acquire succeeds");

        let stats = pool.stats().await;
        assert_eq!(stats.active, 2);

        let err = pool.acquire().await.expect_err("third acquire should time out");
        assert!(matches!(err, PoolError::Exhausted));

        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn released_connection_is_reused() {
        let connector = CountingConnector { opened: Arc::new(StdAtomicUsize::new(0)), fail_after: None };
        let opened = connector.opened.clone();
        let pool = Pool::new(connector, small_config()).await.unwrap();

        {
            let _g = pool.acquire().await.unwrap();
        }
        let _g2 = pool.acquire().await.unwrap();

        assert_eq!(opened.load(Ordering::SeqCst), 1, "second acquire should reuse the idle connection");
    }

    #[tokio::test]
    async fn marking_broken_discards_the_connection() {
        let connector = CountingConnector { opened: Arc::new(StdAtomicUsize::new(0)), fail_after: None };
        let opened = connector.opened.clone();
        let pool = Pool::new(connector, small_config()).await.unwrap();

        {
            let mut g = pool.acquire().await.unwrap();
            g.mark_broken();
        }
        let _g2 = pool.acquire().await.unwrap();

        assert_eq!(opened.load(Ordering::SeqCst), 2, "broken connection must not be reused");
    }

    #[tokio::test]
    async fn shutdown_fails_subsequent_acquires() {
        let connector = CountingConnector { opened: Arc::new(StdAtomicUsize::new(0)), fail_after: None };
        let pool = Pool::new(connector, small_config()).await.unwrap();
        pool.shutdown().await;

        let err = pool.acquire().await.expect_err("acquire after shutdown must fail");
        assert!(matches!(err, PoolError::Unavailable));
    }
}
