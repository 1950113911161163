//! Management surface: salons, service catalog, staff onboarding.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

use crate::auth::{authorize_salon_owner, Role};
use crate::error::ApiError;
use crate::models::*;
use crate::scheduling::parse_time;
use crate::AppState;

use super::extract_actor;

/// POST /api/salons — platform admins register new salons.
pub async fn create_salon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateSalonRequest>,
) -> Result<Json<ApiResponse<Salon>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;
    if actor.role != Role::Admin {
        return Err(ApiError::Forbidden("admin required".into()));
    }

    let open_time = body.open_time.unwrap_or_else(|| "09:00".into());
    let close_time = body.close_time.unwrap_or_else(|| "20:00".into());
    if parse_time(&open_time).is_none() || parse_time(&close_time).is_none() {
        return Err(ApiError::InvalidInput("invalid time, expected HH:MM".into()));
    }

    let id = sqlx::query(
        "INSERT INTO salons (name, owner_id, open_time, close_time) VALUES (?, ?, ?, ?)",
    )
    .bind(&body.name)
    .bind(body.owner_id)
    .bind(&open_time)
    .bind(&close_time)
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    let salon = sqlx::query_as::<_, Salon>("SELECT * FROM salons WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(ApiResponse::success(salon)))
}

/// POST /api/salons/{id}/services — add a service to the catalog.
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(salon_id): Path<i64>,
    Json(body): Json<CreateServiceRequest>,
) -> Result<Json<ApiResponse<Service>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;
    authorize_salon_owner(&state.db, actor, salon_id).await?;

    if body.price < 0 || body.duration_min <= 0 {
        return Err(ApiError::InvalidInput(
            "price must be non-negative and duration positive".into(),
        ));
    }

    let id = sqlx::query(
        "INSERT INTO services (salon_id, name, price, duration_min, sort_order)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(salon_id)
    .bind(&body.name)
    .bind(body.price)
    .bind(body.duration_min)
    .bind(body.sort_order.unwrap_or(0))
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(ApiResponse::success(service)))
}

/// PUT /api/services/{id} — partial update. Existing bookings keep their
/// price/duration snapshots regardless.
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateServiceRequest>,
) -> Result<Json<ApiResponse<Service>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;

    let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("service not found".into()))?;
    authorize_salon_owner(&state.db, actor, service.salon_id).await?;

    if let Some(name) = &body.name {
        sqlx::query("UPDATE services SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(price) = body.price {
        if price < 0 {
            return Err(ApiError::InvalidInput("price must be non-negative".into()));
        }
        sqlx::query("UPDATE services SET price = ? WHERE id = ?")
            .bind(price)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(duration) = body.duration_min {
        if duration <= 0 {
            return Err(ApiError::InvalidInput("duration must be positive".into()));
        }
        sqlx::query("UPDATE services SET duration_min = ? WHERE id = ?")
            .bind(duration)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(active) = body.is_active {
        sqlx::query("UPDATE services SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(order) = body.sort_order {
        sqlx::query("UPDATE services SET sort_order = ? WHERE id = ?")
            .bind(order)
            .bind(id)
            .execute(&state.db)
            .await?;
    }

    let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(ApiResponse::success(service)))
}

/// POST /api/salons/{id}/staff — onboard a staff member. Seeds the
/// default weekly template: working 09:00–18:00 every day, Sunday off.
pub async fn create_staff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(salon_id): Path<i64>,
    Json(body): Json<CreateStaffRequest>,
) -> Result<Json<ApiResponse<Staff>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;
    authorize_salon_owner(&state.db, actor, salon_id).await?;

    let salon_exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM salons WHERE id = ?")
        .bind(salon_id)
        .fetch_one(&state.db)
        .await?;
    if !salon_exists {
        return Err(ApiError::NotFound("salon not found".into()));
    }

    let id = sqlx::query("INSERT INTO staff (salon_id, user_id, name) VALUES (?, ?, ?)")
        .bind(salon_id)
        .bind(body.user_id)
        .bind(&body.name)
        .execute(&state.db)
        .await?
        .last_insert_rowid();

    for dow in 0..7 {
        sqlx::query(
            "INSERT INTO weekly_schedules (staff_id, day_of_week, start_time, end_time, is_off)
             VALUES (?, ?, '09:00', '18:00', ?)",
        )
        .bind(id)
        .bind(dow)
        .bind(dow == 0)
        .execute(&state.db)
        .await?;
    }

    let staff = sqlx::query_as::<_, Staff>("SELECT * FROM staff WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(ApiResponse::success(staff)))
}
