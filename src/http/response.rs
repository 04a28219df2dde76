//! Uniform success envelope (§6): `{api_version:1, status:"success", data:…}`.
//! Errors bypass this and use [`crate::error::AppError`]'s `{error:"..."}` shape.

use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub api_version: u32,
    pub status: &'static str,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Response {
    Json(Envelope { api_version: 1, status: "success", data }).into_response()
}
