//! `GET /alarm/events[...]` and `/alarm/events/count` (§6).

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::Response;

use crate::error::AppError;
use crate::models::AlarmStatus;
use crate::pagination::PageParams;

use super::response::ok;
use super::state::AppState;

fn parse_status(raw: Option<&String>) -> Option<AlarmStatus> {
    match raw.map(String::as_str) {
        Some("firing") => Some(AlarmStatus::Firing),
        Some("resolved") => Some(AlarmStatus::Resolved),
        _ => None,
    }
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let status = parse_status(params.get("status"));

    if let Some(limit) = params.get("limit").and_then(|v| v.parse::<u32>().ok()) {
        let events = state.event_store.list_recent(limit).await.map_err(AppError::Backend)?;
        return Ok(ok(events));
    }

    let page_params = PageParams::coerce(
        params.get("page").and_then(|v| v.parse().ok()),
        params.get("page_size").and_then(|v| v.parse().ok()),
    );
    let page = state.event_store.list_paginated(page_params, status).await.map_err(AppError::Backend)?;
    Ok(ok(page))
}

pub async fn count_events(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let count = match parse_status(params.get("status")) {
        Some(AlarmStatus::Firing) => state.event_store.count_active().await.map_err(AppError::Backend)?,
        _ => state.event_store.count_total().await.map_err(AppError::Backend)?,
    };
    Ok(ok(serde_json::json!({ "count": count })))
}
