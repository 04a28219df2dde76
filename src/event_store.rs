//! Event Store (C3): persists firing/resolved alarm events and serves
//! paginated reads, enforcing "at most one open row per fingerprint".

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::error::ConsistencyError;
use crate::models::{AlarmEvent, AlarmStatus, PersistedAlarmEvent};
use crate::pagination::{Page, PageParams};
use crate::pool::{MySqlConnector, Pool};

pub struct EventStore {
    pool: Pool<MySqlConnector>,
}

impl EventStore {
    pub fn new(pool: Pool<MySqlConnector>) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.context("acquiring connection for schema init")?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alarm_events (
                id VARCHAR(64) PRIMARY KEY,
                fingerprint VARCHAR(512) NOT NULL,
                status VARCHAR(16) NOT NULL,
                labels_json TEXT NOT NULL,
                annotations_json TEXT NOT NULL,
                starts_at DATETIME NOT NULL,
                ends_at DATETIME NULL,
                generator_url TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                INDEX idx_fingerprint (fingerprint),
                INDEX idx_status (status),
                INDEX idx_starts_at (starts_at),
                INDEX idx_created_at (created_at)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating alarm_events table")?;
        Ok(())
    }

    /// `firing` inserts a new open row; `resolved` closes the open row
    /// for that fingerprint. Errors if a `resolved` event has no
    /// matching open row (§7 ConsistencyError).
    pub async fn process(&self, event: &AlarmEvent) -> Result<()> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let now = Utc::now();
        match event.status {
            AlarmStatus::Firing => {
                sqlx::query(
                    "INSERT INTO alarm_events \
                     (id, fingerprint, status, labels_json, annotations_json, starts_at, ends_at, generator_url, created_at, updated_at) \
                     VALUES (?, ?, 'firing', ?, ?, ?, NULL, ?, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&event.fingerprint)
                .bind(serde_json::to_string(&event.labels)?)
                .bind(serde_json::to_string(&event.annotations)?)
                .bind(event.starts_at)
                .bind(&event.generator_url)
                .bind(now)
                .bind(now)
                .execute(&mut *conn)
                .await
                .context("inserting firing event")?;
            }
            AlarmStatus::Resolved => {
                let result = sqlx::query(
                    "UPDATE alarm_events SET status='resolved', ends_at=?, updated_at=? \
                     WHERE fingerprint=? AND status='firing' AND ends_at IS NULL",
                )
                .bind(event.ends_at.unwrap_or(now))
                .bind(now)
                .bind(&event.fingerprint)
                .execute(&mut *conn)
                .await
                .context("resolving event")?;

                if result.rows_affected() == 0 {
                    tracing::error!(fingerprint = %event.fingerprint, "no open event to resolve");
                    return Err(ConsistencyError::NoOpenEvent(event.fingerprint.clone()).into());
                }
            }
        }
        Ok(())
    }

    pub async fn list_active(&self) -> Result<Vec<PersistedAlarmEvent>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let rows = sqlx::query(
            "SELECT * FROM alarm_events WHERE status='firing' AND ends_at IS NULL ORDER BY starts_at DESC",
        )
        .fetch_all(&mut *conn)
        .await
        .context("listing active events")?;
        rows.into_iter().map(row_to_event).collect()
    }

    pub async fn list_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<PersistedAlarmEvent>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let rows = sqlx::query("SELECT * FROM alarm_events WHERE fingerprint=? ORDER BY starts_at DESC")
            .bind(fingerprint)
            .fetch_all(&mut *conn)
            .await
            .context("listing events by fingerprint")?;
        rows.into_iter().map(row_to_event).collect()
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<PersistedAlarmEvent>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let rows = sqlx::query("SELECT * FROM alarm_events ORDER BY created_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&mut *conn)
            .await
            .context("listing recent events")?;
        rows.into_iter().map(row_to_event).collect()
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<PersistedAlarmEvent>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let row = sqlx::query("SELECT * FROM alarm_events WHERE id=?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .context("fetching event by id")?;
        row.map(row_to_event).transpose()
    }

    pub async fn list_paginated(
        &self,
        params: PageParams,
        status_filter: Option<AlarmStatus>,
    ) -> Result<Page<PersistedAlarmEvent>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let where_clause = match status_filter {
            Some(AlarmStatus::Firing) => "WHERE status='firing'",
            Some(AlarmStatus::Resolved) => "WHERE status='resolved'",
            None => "",
        };

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS c FROM alarm_events {where_clause}"))
            .fetch_one(&mut *conn)
            .await
            .context("counting events")?
            .try_get("c")?;

        let rows = sqlx::query(&format!(
            "SELECT * FROM alarm_events {where_clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(params.page_size as i64)
        .bind(params.offset() as i64)
        .fetch_all(&mut *conn)
        .await
        .context("listing paginated events")?;

        let items = rows.into_iter().map(row_to_event).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, params, total as u64))
    }

    pub async fn count_active(&self) -> Result<u64> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM alarm_events WHERE status='firing' AND ends_at IS NULL")
            .fetch_one(&mut *conn)
            .await
            .context("counting active events")?
            .try_get("c")?;
        Ok(count as u64)
    }

    pub async fn count_total(&self) -> Result<u64> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM alarm_events")
            .fetch_one(&mut *conn)
            .await
            .context("counting total events")?
            .try_get("c")?;
        Ok(count as u64)
    }
}

fn row_to_event(row: sqlx::mysql::MySqlRow) -> Result<PersistedAlarmEvent> {
    let status_str: String = row.try_get("status")?;
    let status = match status_str.as_str() {
        "firing" => AlarmStatus::Firing,
        _ => AlarmStatus::Resolved,
    };
    Ok(PersistedAlarmEvent {
        id: row.try_get("id")?,
        fingerprint: row.try_get("fingerprint")?,
        status,
        labels_json: row.try_get("labels_json")?,
        annotations_json: row.try_get("annotations_json")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        generator_url: row.try_get("generator_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_string() {
        assert!(matches!(
            match "firing" {
                "firing" => AlarmStatus::Firing,
                _ => AlarmStatus::Resolved,
            },
            AlarmStatus::Firing
        ));
    }
}
