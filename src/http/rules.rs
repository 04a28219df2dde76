//! `POST/GET /alarm/rules[...]` (§6).

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;

use crate::error::AppError;
use crate::models::NewAlarmRule;
use crate::pagination::PageParams;

use super::response::ok;
use super::state::AppState;

pub async fn create_rule(
    State(state): State<AppState>,
    Json(new_rule): Json<NewAlarmRule>,
) -> Result<Response, AppError> {
    // serde already parsed the wire JSON into Expr; still reject a
    // mixed-stable expression before it's ever persisted (§4.2.1).
    new_rule.expression.validate_single_stable().map_err(|e| AppError::BadRequest(e.to_string()))?;
    let rule = state.rule_store.create(new_rule).await.map_err(AppError::Backend)?;
    Ok(ok(rule))
}

pub async fn list_rules(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let page_params = PageParams::coerce(
        params.get("page").and_then(|v| v.parse().ok()),
        params.get("page_size").and_then(|v| v.parse().ok()),
    );
    let enabled_only = params.get("enabled_only").map(|v| v == "true").unwrap_or(false);
    let page = state.rule_store.list_paginated(page_params, enabled_only).await.map_err(AppError::Backend)?;
    Ok(ok(page))
}

pub async fn get_rule(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let rule = state
        .rule_store
        .get(&id)
        .await
        .map_err(AppError::Backend)?
        .ok_or_else(|| AppError::NotFound(format!("rule {id} not found")))?;
    Ok(ok(rule))
}

pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(new_rule): Json<NewAlarmRule>,
) -> Result<Response, AppError> {
    new_rule.expression.validate_single_stable().map_err(|e| AppError::BadRequest(e.to_string()))?;
    let rule = state
        .rule_store
        .update(&id, new_rule)
        .await
        .map_err(AppError::Backend)?
        .ok_or_else(|| AppError::NotFound(format!("rule {id} not found")))?;
    Ok(ok(rule))
}

pub async fn delete_rule(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let deleted = state.rule_store.delete(&id).await.map_err(AppError::Backend)?;
    if !deleted {
        return Err(AppError::NotFound(format!("rule {id} not found")));
    }
    Ok(ok(serde_json::json!({})))
}
