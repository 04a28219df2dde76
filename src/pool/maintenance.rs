use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use super::{Connector, Idle, Inner};

/// Background task: periodically health-checks and reaps idle
/// connections, then tops the idle set back up to `min_connections`.
///
/// Mirrors the interval-driven drain/flush loop used elsewhere in this
/// codebase for batched background work, adapted here to pool upkeep
/// instead of event draining.
pub(super) fn spawn<C: Connector>(inner: Arc<Inner<C>>) {
    tokio::spawn(async move {
        loop {
            let interval = inner.config.read().unwrap().health_check_interval;
            tokio::time::sleep(interval).await;

            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }

            tick(&inner).await;
        }
    });
}

async fn tick<C: Connector>(inner: &Arc<Inner<C>>) {
    let config = inner.config.read().unwrap().clone();
    let mut surviving = Vec::new();
    let mut drained = Vec::new();
    {
        let mut idle = inner.idle.lock().await;
        while let Some(entry) = idle.pop_front() {
            drained.push(entry);
        }
    }

    let now = Instant::now();
    for mut entry in drained {
        let idle_for = now.saturating_duration_since(entry.last_used_at);
        let lifetime = now.saturating_duration_since(entry.created_at);
        if idle_for > config.idle_timeout || lifetime > config.max_lifetime {
            inner.counters.destroyed_total.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        if inner.connector.health_check(&mut entry.conn, &config.health_check_query).await {
            surviving.push(entry);
        } else {
            inner.counters.destroyed_total.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("pooled connection failed health check, discarding");
        }
    }

    let mut idle = inner.idle.lock().await;
    for entry in surviving {
        idle.push_back(entry);
    }

    let active = inner.counters.active.load(Ordering::Relaxed);
    let total = idle.len() + active;
    if total < config.min_connections {
        for _ in total..config.min_connections {
            match inner.connector.connect().await {
                Ok(conn) => {
                    inner.counters.created_total.fetch_add(1, Ordering::Relaxed);
                    let now = Instant::now();
                    idle.push_back(Idle { conn, created_at: now, last_used_at: now, use_count: 0 });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "pool maintenance: failed to top up min_connections");
                    break;
                }
            }
        }
    }
}
