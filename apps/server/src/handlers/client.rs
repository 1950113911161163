use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::*;
use crate::notify::BookingEvent;
use crate::{booking, status, AppState};

use super::{extract_actor, salon_now};

// ── Public endpoints ──

/// GET /api/salons/{id} — public salon card (active salons only).
pub async fn get_salon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Salon>>, ApiError> {
    let salon = sqlx::query_as::<_, Salon>("SELECT * FROM salons WHERE id = ? AND is_active = 1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("salon not found".into()))?;
    Ok(Json(ApiResponse::success(salon)))
}

/// GET /api/salons/{id}/services — active services, menu order.
pub async fn list_services(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<Service>>>, ApiError> {
    let services = sqlx::query_as::<_, Service>(
        "SELECT * FROM services WHERE salon_id = ? AND is_active = 1 ORDER BY sort_order ASC",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(services)))
}

/// GET /api/salons/{id}/staff — active staff.
pub async fn list_staff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<Staff>>>, ApiError> {
    let staff = sqlx::query_as::<_, Staff>(
        "SELECT * FROM staff WHERE salon_id = ? AND is_active = 1 ORDER BY name ASC",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(staff)))
}

/// GET /api/staff/{id}/slots?date=YYYY-MM-DD&duration=N — bookable start
/// times for a staff member on a date.
pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let slots = booking::list_available_slots(&state.db, id, &query.date, query.duration).await?;
    Ok(Json(ApiResponse::success(slots)))
}

// ── Customer endpoints ──

/// POST /api/bookings — create a booking for the calling customer.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Json<ApiResponse<BookingDetail>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;

    let now = salon_now(state.tz_offset_hours);
    let detail = booking::create_booking(&state.db, actor.id, &body, now).await?;

    state
        .notifier
        .dispatch(BookingEvent::new("booking.created", &detail.booking));

    Ok(Json(ApiResponse::success(detail)))
}

/// GET /api/bookings/my — the caller's bookings, soonest first.
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<Booking>>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;

    let bookings = sqlx::query_as::<_, Booking>(
        "SELECT * FROM bookings WHERE customer_id = ?
         ORDER BY date ASC, time_slot ASC",
    )
    .bind(actor.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(bookings)))
}

/// GET /api/bookings/code/{code} — look up one of the caller's bookings
/// by its human-readable code.
pub async fn booking_by_code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<BookingDetail>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;

    let found = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE booking_code = ?")
        .bind(&code)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;

    if found.customer_id != actor.id && actor.role != crate::auth::Role::Admin {
        return Err(ApiError::Forbidden("not your booking".into()));
    }

    let detail = booking::booking_detail(&state.db, found.id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// POST /api/bookings/{id}/cancel — a customer may cancel their own
/// booking while it is still pending or confirmed.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<CancelBookingRequest>,
) -> Result<Json<ApiResponse<Booking>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;

    let found = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;

    if found.customer_id != actor.id {
        return Err(ApiError::Forbidden("not your booking".into()));
    }
    if !matches!(
        found.status,
        BookingStatus::Pending | BookingStatus::Confirmed
    ) {
        return Err(ApiError::Forbidden(
            "customers may only cancel pending or confirmed bookings".into(),
        ));
    }

    let now = salon_now(state.tz_offset_hours)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    let updated = status::transition(
        &state.db,
        id,
        BookingStatus::Cancelled,
        actor.id,
        body.reason.as_deref(),
        &now,
    )
    .await?;

    state
        .notifier
        .dispatch(BookingEvent::new("booking.cancelled", &updated));

    Ok(Json(ApiResponse::success(updated)))
}
