pub mod admin;
pub mod client;
pub mod health;
pub mod staff;

use axum::http::{header, HeaderMap};
use chrono::{DateTime, FixedOffset, Utc};

use crate::auth::{self, Actor};
use crate::error::ApiError;
use crate::AppState;

/// Salon-local wall clock. Dates and times in the schema are salon-local
/// and timezone-naive; this is the only place "now" enters the system.
pub fn salon_now(offset_hours: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
    Utc::now().with_timezone(&offset)
}

/// Pull the signed actor out of the Authorization header.
pub fn extract_actor(headers: &HeaderMap, state: &AppState) -> Result<Actor, ApiError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    auth::actor_from_header(header, &state.auth_secret, Utc::now().timestamp())
        .ok_or(ApiError::Unauthorized)
}
