//! Rule Store (C2): CRUD and pagination over `alarm_rules` in the
//! relational backing store.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::Row;

use crate::models::{AlarmRule, NewAlarmRule};
use crate::pagination::{Page, PageParams};
use crate::pool::{MySqlConnector, Pool};
use crate::rule_engine::expression::Expr;

pub struct RuleStore {
    pool: Pool<MySqlConnector>,
}

impl RuleStore {
    pub fn new(pool: Pool<MySqlConnector>) -> Self {
        Self { pool }
    }

    /// Idempotent: safe to call on every startup.
    pub async fn init_schema(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.context("acquiring connection for schema init")?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alarm_rules (
                id VARCHAR(64) PRIMARY KEY,
                alert_name VARCHAR(255) NOT NULL UNIQUE,
                expression_json TEXT NOT NULL,
                for_duration VARCHAR(32) NOT NULL,
                severity VARCHAR(32) NOT NULL,
                summary TEXT NOT NULL,
                description TEXT NOT NULL,
                alert_type VARCHAR(64) NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                INDEX idx_alert_name (alert_name),
                INDEX idx_enabled (enabled),
                INDEX idx_severity (severity),
                INDEX idx_alert_type (alert_type)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating alarm_rules table")?;
        Ok(())
    }

    pub async fn create(&self, new_rule: NewAlarmRule) -> Result<AlarmRule> {
        let rule = new_rule.into_rule(Utc::now());
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        sqlx::query(
            "INSERT INTO alarm_rules \
             (id, alert_name, expression_json, for_duration, severity, summary, description, alert_type, enabled, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&rule.id)
        .bind(&rule.alert_name)
        .bind(serde_json::to_string(&rule.expression)?)
        .bind(&rule.for_duration)
        .bind(&rule.severity)
        .bind(&rule.summary)
        .bind(&rule.description)
        .bind(&rule.alert_type)
        .bind(rule.enabled)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&mut *conn)
        .await
        .context("inserting alarm rule")?;
        Ok(rule)
    }

    pub async fn get(&self, id: &str) -> Result<Option<AlarmRule>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let row = sqlx::query("SELECT * FROM alarm_rules WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .context("fetching alarm rule")?;
        row.map(row_to_rule).transpose()
    }

    pub async fn update(&self, id: &str, new_rule: NewAlarmRule) -> Result<Option<AlarmRule>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE alarm_rules SET alert_name=?, expression_json=?, for_duration=?, severity=?, \
             summary=?, description=?, alert_type=?, enabled=?, updated_at=? WHERE id=?",
        )
        .bind(&new_rule.alert_name)
        .bind(serde_json::to_string(&new_rule.expression)?)
        .bind(&new_rule.for_duration)
        .bind(&new_rule.severity)
        .bind(&new_rule.summary)
        .bind(&new_rule.description)
        .bind(&new_rule.alert_type)
        .bind(new_rule.enabled)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await
        .context("updating alarm rule")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        drop(conn);
        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let result = sqlx::query("DELETE FROM alarm_rules WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .context("deleting alarm rule")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_all(&self) -> Result<Vec<AlarmRule>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let rows = sqlx::query("SELECT * FROM alarm_rules ORDER BY created_at")
            .fetch_all(&mut *conn)
            .await
            .context("listing alarm rules")?;
        Ok(rows.into_iter().filter_map(skip_malformed).collect())
    }

    /// One rule with unparseable `expression_json` (§7 `RuleParseError`)
    /// is logged and skipped rather than failing the whole reload, so a
    /// single bad rule never takes every other rule off the evaluation
    /// loop with it.
    pub async fn list_enabled(&self) -> Result<Vec<AlarmRule>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let rows = sqlx::query("SELECT * FROM alarm_rules WHERE enabled = TRUE ORDER BY created_at")
            .fetch_all(&mut *conn)
            .await
            .context("listing enabled alarm rules")?;
        Ok(rows.into_iter().filter_map(skip_malformed).collect())
    }

    pub async fn list_paginated(&self, params: PageParams, enabled_only: bool) -> Result<Page<AlarmRule>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let where_clause = if enabled_only { "WHERE enabled = TRUE" } else { "" };

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS c FROM alarm_rules {where_clause}"))
            .fetch_one(&mut *conn)
            .await
            .context("counting alarm rules")?
            .try_get("c")?;

        let rows = sqlx::query(&format!(
            "SELECT * FROM alarm_rules {where_clause} ORDER BY created_at LIMIT ? OFFSET ?"
        ))
        .bind(params.page_size as i64)
        .bind(params.offset() as i64)
        .fetch_all(&mut *conn)
        .await
        .context("listing paginated alarm rules")?;

        let items = rows.into_iter().filter_map(skip_malformed).collect();
        Ok(Page::new(items, params, total as u64))
    }
}

/// Logs and drops a row whose `expression_json` fails to parse, instead
/// of failing the whole listing (§7 `RuleParseError` policy).
fn skip_malformed(row: sqlx::mysql::MySqlRow) -> Option<AlarmRule> {
    match row_to_rule(row) {
        Ok(rule) => Some(rule),
        Err(e) => {
            tracing::warn!(error = %e, "skipping alarm rule row with malformed expression");
            None
        }
    }
}

fn row_to_rule(row: sqlx::mysql::MySqlRow) -> Result<AlarmRule> {
    let expression_json: String = row.try_get("expression_json")?;
    let expression = Expr::parse(&expression_json).context("decoding stored rule expression")?;
    Ok(AlarmRule {
        id: row.try_get("id")?,
        alert_name: row.try_get("alert_name")?,
        expression,
        for_duration: row.try_get("for_duration")?,
        severity: row.try_get("severity")?,
        summary: row.try_get("summary")?,
        description: row.try_get("description")?,
        alert_type: row.try_get("alert_type")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
