use std::time::Instant;

use tokio::sync::OwnedSemaphorePermit;

use super::{Connector, Idle, Pool};
use std::sync::atomic::Ordering;

/// RAII lease on a pooled connection.
///
/// Dereferences to `C::Connection`. Returning the connection to the idle
/// set (or discarding it, if [`mark_broken`](Self::mark_broken) was
/// called) happens on `Drop`, so callers never have to remember to give
/// a connection back.
pub struct PoolGuard<C: Connector> {
    pool: Pool<C>,
    conn: Option<C::Connection>,
    permit: Option<OwnedSemaphorePermit>,
    created_at: Instant,
    use_count: u64,
    broken: bool,
}

impl<C: Connector> PoolGuard<C> {
    pub(crate) fn new(
        pool: Pool<C>,
        conn: C::Connection,
        permit: OwnedSemaphorePermit,
        use_count: u64,
    ) -> Self {
        Self {
            pool,
            conn: Some(conn),
            permit: Some(permit),
            created_at: Instant::now(),
            use_count,
            broken: false,
        }
    }

    /// Mark this connection as unusable; it will be dropped instead of
    /// returned to the idle set. Call this after a query on the
    /// connection fails with a connection-level error.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<C: Connector> std::ops::Deref for PoolGuard<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection taken before drop")
    }
}

impl<C: Connector> std::ops::DerefMut for PoolGuard<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection taken before drop")
    }
}

impl<C: Connector> Drop for PoolGuard<C> {
    fn drop(&mut self) {
        let inner = self.pool.inner();
        inner.counters.active.fetch_sub(1, Ordering::Relaxed);

        let Some(conn) = self.conn.take() else { return };
        let permit = self.permit.take();

        if self.broken {
            inner.counters.destroyed_total.fetch_add(1, Ordering::Relaxed);
            drop(permit);
            return;
        }

        let idle = Idle {
            conn,
            created_at: self.created_at,
            last_used_at: Instant::now(),
            use_count: self.use_count + 1,
        };

        // We're in a sync Drop; hand the return off to a detached task
        // rather than blocking on the idle-set mutex here.
        let inner = inner.clone();
        tokio::spawn(async move {
            inner.idle.lock().await.push_back(idle);
            drop(permit);
        });
    }
}
