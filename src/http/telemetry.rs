//! `POST /heartbeat` and `POST /resource` (§6).

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::{BoxInfo, ResourceSnapshot};

use super::response::ok;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HeartbeatBody {
    #[allow(dead_code)]
    pub api_version: Option<u32>,
    pub data: BoxInfo,
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Json(body): Json<HeartbeatBody>,
) -> Result<Response, AppError> {
    if body.data.host_ip.is_empty() {
        return Err(AppError::BadRequest("host_ip is required".to_string()));
    }
    state.node_registry.upsert_heartbeat(body.data).await;
    Ok(ok(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
pub struct ResourceData {
    pub host_ip: String,
    pub resource: ResourceSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct ResourceBody {
    #[allow(dead_code)]
    pub api_version: Option<u32>,
    pub data: ResourceData,
}

pub async fn resource(
    State(state): State<AppState>,
    Json(body): Json<ResourceBody>,
) -> Result<Response, AppError> {
    if body.data.host_ip.is_empty() {
        return Err(AppError::BadRequest("host_ip is required".to_string()));
    }
    state.ts_store.insert_resource(&body.data.host_ip, &body.data.resource, Utc::now()).await;
    Ok(ok(serde_json::json!({})))
}
