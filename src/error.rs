//! Shared error taxonomy.
//!
//! Each component gets its own `thiserror` enum at the boundary it owns;
//! this module holds the handful of error types that cross component
//! lines (pool failures surface into every store; HTTP needs a uniform
//! mapping to status codes).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Errors surfaced by [`crate::pool::Pool::acquire`].
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("pool exhausted: no connection available within the acquire timeout")]
    Exhausted,
    #[error("pool unavailable: not yet initialized or already shut down")]
    Unavailable,
    #[error("backend connection error: {0}")]
    Backend(String),
}

/// Top-level application error used by HTTP handlers and the orchestrator.
///
/// Maps 1:1 onto the taxonomy of ERROR HANDLING DESIGN: bad input is
/// `BadRequest`, a missing row is `NotFound`, everything else that made
/// it this far is a backend failure.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            AppError::Pool(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Backend(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        tracing::error!(status = %status, error = %message, "request failed");
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Errors from parsing a persisted [`crate::rule_engine::expression::Expr`].
#[derive(Debug, thiserror::Error)]
pub enum RuleParseError {
    #[error("rule expression is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("rule expression mixes stables '{0}' and '{1}' under one rule")]
    MixedStables(String, String),
    #[error("rule expression leaf missing required field: {0}")]
    MissingField(&'static str),
    #[error("unknown comparison operator: {0}")]
    UnknownOperator(String),
    #[error("empty composite expression ({0})")]
    EmptyComposite(&'static str),
}

/// Errors from [`crate::bmc::packet`] decoding.
#[derive(Debug, thiserror::Error)]
pub enum PacketFormatError {
    #[error("packet too short: got {got} bytes, expected {expected}")]
    WrongLength { got: usize, expected: usize },
    #[error("bad head marker: 0x{0:04X}")]
    BadHead(u16),
    #[error("bad tail marker: 0x{0:04X}")]
    BadTail(u16),
}

/// Errors from [`crate::event_store::EventStore::process`].
#[derive(Debug, thiserror::Error)]
pub enum ConsistencyError {
    #[error("cannot resolve fingerprint '{0}': no open firing row")]
    NoOpenEvent(String),
}
