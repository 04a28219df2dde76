//! Concrete [`Connector`] implementations for the two backing stores.

use async_trait::async_trait;
use sqlx::{Connection, MySqlConnection};

use crate::error::PoolError;
use crate::pool::Connector;

/// Opens raw `sqlx::MySqlConnection`s against a fixed DSN.
///
/// Deliberately not `sqlx::MySqlPool` — the pool substrate here owns
/// pooling semantics uniformly across both backing stores, so each
/// connector just knows how to open and ping a single connection.
pub struct MySqlConnector {
    dsn: String,
}

impl MySqlConnector {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self { dsn: dsn.into() }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Connection = MySqlConnection;

    async fn connect(&self) -> Result<Self::Connection, PoolError> {
        MySqlConnection::connect(&self.dsn)
            .await
            .map_err(|e| PoolError::Backend(e.to_string()))
    }

    async fn health_check(&self, conn: &mut Self::Connection, query: &str) -> bool {
        sqlx::query(query).execute(conn).await.is_ok()
    }
}

/// Opens `taos::Taos` sessions against a fixed DSN.
pub struct TaosConnector {
    dsn: String,
}

impl TaosConnector {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self { dsn: dsn.into() }
    }
}

#[async_trait]
impl Connector for TaosConnector {
    type Connection = taos::Taos;

    async fn connect(&self) -> Result<Self::Connection, PoolError> {
        use taos::TBuilder;
        let builder = taos::TaosBuilder::from_dsn(&self.dsn)
            .map_err(|e| PoolError::Backend(e.to_string()))?;
        builder.build().await.map_err(|e| PoolError::Backend(e.to_string()))
    }

    async fn health_check(&self, conn: &mut Self::Connection, query: &str) -> bool {
        use taos::AsyncQueryable;
        conn.exec(query).await.is_ok()
    }
}
