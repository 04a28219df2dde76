//! `GET /node`, `/node/metrics`, `/node/historical-metrics`,
//! `/node/historical-bmc` (§6).

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderValue;
use axum::response::Response;

use crate::error::AppError;
use crate::pagination::PageParams;

use super::response::ok;
use super::state::AppState;
use super::time_range::parse_time_range;

pub async fn get_node(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    match params.get("host_ip") {
        Some(host_ip) => {
            let node = state.node_registry.get(host_ip).await;
            Ok(ok(node))
        }
        None => Ok(ok(state.node_registry.snapshot_all().await)),
    }
}

pub async fn node_metrics(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let page_params = PageParams::coerce(
        params.get("page").and_then(|v| v.parse().ok()),
        params.get("page_size").and_then(|v| v.parse().ok()),
    );

    let mut nodes = state.node_registry.snapshot_all().await;
    nodes.sort_by(|a, b| a.host_ip.cmp(&b.host_ip));
    let total = nodes.len() as u64;

    let start = page_params.offset() as usize;
    let end = (start + page_params.page_size as usize).min(nodes.len());
    let page_nodes = if start < nodes.len() { &nodes[start..end] } else { &[] };

    let mut samples = Vec::with_capacity(page_nodes.len());
    for node in page_nodes {
        samples.push(state.ts_store.latest(&node.host_ip).await);
    }

    let page = crate::pagination::Page::new(samples, page_params, total);
    let mut response = ok(&page);
    apply_pagination_headers(response.headers_mut(), &page.pagination);
    Ok(response)
}

fn apply_pagination_headers(headers: &mut axum::http::HeaderMap, p: &crate::pagination::Pagination) {
    headers.insert("X-Page", HeaderValue::from(p.page));
    headers.insert("X-Page-Size", HeaderValue::from(p.page_size));
    headers.insert("X-Total-Count", HeaderValue::from(p.total));
    headers.insert("X-Total-Pages", HeaderValue::from(p.total_pages));
    headers.insert("X-Has-Next", HeaderValue::from_static(if p.has_next { "true" } else { "false" }));
    headers.insert("X-Has-Prev", HeaderValue::from_static(if p.has_prev { "true" } else { "false" }));
}

const METRIC_FAMILIES: &[&str] = &["cpu", "memory", "disk", "network", "gpu", "container", "sensor"];
const BMC_FAMILIES: &[&str] = &["fan", "sensor"];

pub async fn historical_metrics(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let host_ip = params.get("host_ip").ok_or_else(|| AppError::BadRequest("host_ip is required".to_string()))?;
    let span = parse_time_range(params.get("time_range").map(String::as_str), Duration::from_secs(600));
    let families = requested_families(params.get("metrics"), METRIC_FAMILIES);

    let data = state
        .ts_store
        .range(("host_ip", host_ip), span, &families)
        .await
        .map_err(AppError::Backend)?;
    Ok(ok(data))
}

pub async fn historical_bmc(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let box_id = params.get("box_id").ok_or_else(|| AppError::BadRequest("box_id is required".to_string()))?;
    let span = parse_time_range(params.get("time_range").map(String::as_str), Duration::from_secs(3600));
    let requested = requested_families(params.get("metrics"), BMC_FAMILIES);
    let stables: Vec<&str> = requested
        .iter()
        .map(|f| match *f {
            "fan" => "bmc_fan_super",
            other => {
                if other == "sensor" {
                    "bmc_sensor_super"
                } else {
                    other
                }
            }
        })
        .collect();

    let data = state
        .ts_store
        .range(("box_id", box_id), span, &stables)
        .await
        .map_err(AppError::Backend)?;
    Ok(ok(data))
}

fn requested_families(raw: Option<&String>, default: &[&'static str]) -> Vec<&'static str> {
    match raw {
        Some(list) => {
            let requested: Vec<&'static str> =
                default.iter().copied().filter(|f| list.split(',').any(|s| s.trim() == *f)).collect();
            if requested.is_empty() {
                default.to_vec()
            } else {
                requested
            }
        }
        None => default.to_vec(),
    }
}
