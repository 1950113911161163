//! Staff/owner endpoints: the day sheet, status transitions and the
//! weekly schedule template.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

use crate::auth::{authorize_salon_manager, authorize_salon_owner};
use crate::error::ApiError;
use crate::models::*;
use crate::notify::BookingEvent;
use crate::{status, AppState};

use super::{extract_actor, salon_now};

/// POST /api/bookings/{id}/status — run a lifecycle transition.
/// Callable by the salon's owner, its staff, or a platform admin; the
/// transition table itself is enforced downstream.
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<Booking>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;

    let found = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;

    authorize_salon_manager(&state.db, actor, found.salon_id).await?;

    let now = salon_now(state.tz_offset_hours)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    let updated = status::transition(
        &state.db,
        id,
        body.status,
        actor.id,
        body.cancel_reason.as_deref(),
        &now,
    )
    .await?;

    state
        .notifier
        .dispatch(BookingEvent::new("booking.status_changed", &updated));

    Ok(Json(ApiResponse::success(updated)))
}

/// GET /api/salons/{id}/bookings?date=YYYY-MM-DD — the day sheet, or all
/// upcoming bookings when no date is given.
pub async fn salon_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(query): Query<DayQuery>,
) -> Result<Json<ApiResponse<Vec<Booking>>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;
    authorize_salon_manager(&state.db, actor, id).await?;

    let bookings = if let Some(date) = &query.date {
        sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE salon_id = ? AND date = ?
             ORDER BY time_slot ASC",
        )
        .bind(id)
        .bind(date)
        .fetch_all(&state.db)
        .await?
    } else {
        let today = salon_now(state.tz_offset_hours).format("%Y-%m-%d").to_string();
        sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE salon_id = ? AND date >= ?
             ORDER BY date ASC, time_slot ASC",
        )
        .bind(id)
        .bind(&today)
        .fetch_all(&state.db)
        .await?
    };

    Ok(Json(ApiResponse::success(bookings)))
}

/// GET /api/staff/{id}/schedule — the full weekly template.
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<WeeklySchedule>>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;

    let staff = sqlx::query_as::<_, Staff>("SELECT * FROM staff WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("staff not found".into()))?;
    authorize_salon_manager(&state.db, actor, staff.salon_id).await?;

    let rows = sqlx::query_as::<_, WeeklySchedule>(
        "SELECT * FROM weekly_schedules WHERE staff_id = ? ORDER BY day_of_week ASC",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(rows)))
}

/// PUT /api/staff/{id}/schedule/{day} — upsert one weekday of the
/// template (0 = Sunday .. 6 = Saturday). Owner or admin only. Fields
/// not supplied keep their current values.
pub async fn upsert_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, day)): Path<(i64, i64)>,
    Json(body): Json<UpsertScheduleRequest>,
) -> Result<Json<ApiResponse<WeeklySchedule>>, ApiError> {
    let actor = extract_actor(&headers, &state)?;

    if !(0..=6).contains(&day) {
        return Err(ApiError::InvalidInput(
            "day must be 0 (Sunday) through 6 (Saturday)".into(),
        ));
    }

    let staff = sqlx::query_as::<_, Staff>("SELECT * FROM staff WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("staff not found".into()))?;
    authorize_salon_owner(&state.db, actor, staff.salon_id).await?;

    let existing = sqlx::query_as::<_, WeeklySchedule>(
        "SELECT * FROM weekly_schedules WHERE staff_id = ? AND day_of_week = ?",
    )
    .bind(id)
    .bind(day)
    .fetch_optional(&state.db)
    .await?;

    let start_time = body
        .start_time
        .or_else(|| existing.as_ref().map(|r| r.start_time.clone()))
        .unwrap_or_else(|| "09:00".into());
    let end_time = body
        .end_time
        .or_else(|| existing.as_ref().map(|r| r.end_time.clone()))
        .unwrap_or_else(|| "18:00".into());
    let is_off = body
        .is_off
        .or(existing.as_ref().map(|r| r.is_off))
        .unwrap_or(false);

    if crate::scheduling::parse_time(&start_time).is_none()
        || crate::scheduling::parse_time(&end_time).is_none()
    {
        return Err(ApiError::InvalidInput("invalid time, expected HH:MM".into()));
    }

    sqlx::query(
        "INSERT INTO weekly_schedules (staff_id, day_of_week, start_time, end_time, is_off)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(staff_id, day_of_week) DO UPDATE SET
           start_time = excluded.start_time,
           end_time = excluded.end_time,
           is_off = excluded.is_off",
    )
    .bind(id)
    .bind(day)
    .bind(&start_time)
    .bind(&end_time)
    .bind(is_off)
    .execute(&state.db)
    .await?;

    let row = sqlx::query_as::<_, WeeklySchedule>(
        "SELECT * FROM weekly_schedules WHERE staff_id = ? AND day_of_week = ?",
    )
    .bind(id)
    .bind(day)
    .fetch_one(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sign_token;
    use crate::notify::Notifier;
    use std::time::Instant;

    const SECRET: &str = "staff-handler-secret";

    async fn test_state() -> Arc<AppState> {
        let db = crate::db::test_pool().await;
        Arc::new(AppState {
            db,
            auth_secret: SECRET.into(),
            tz_offset_hours: 7,
            notifier: Notifier::new(None),
            started_at: Instant::now(),
        })
    }

    fn headers_for(user_id: i64, role: &str) -> HeaderMap {
        let token = sign_token(user_id, role, chrono::Utc::now().timestamp(), SECRET);
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("sig {token}").parse().unwrap());
        headers
    }

    // Salon 1 owned by user 7, with one barber.
    async fn seed_staff(db: &sqlx::SqlitePool) -> i64 {
        sqlx::query("INSERT INTO salons (name, owner_id) VALUES ('Fade Factory', 7)")
            .execute(db)
            .await
            .unwrap();
        sqlx::query("INSERT INTO staff (salon_id, user_id, name) VALUES (1, 70, 'Minh')")
            .execute(db)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    async fn schedule_rows_for(db: &sqlx::SqlitePool, staff_id: i64, day: i64) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM weekly_schedules WHERE staff_id = ? AND day_of_week = ?",
        )
        .bind(staff_id)
        .bind(day)
        .fetch_one(db)
        .await
        .unwrap()
    }

    fn put(start: Option<&str>, end: Option<&str>, off: Option<bool>) -> UpsertScheduleRequest {
        UpsertScheduleRequest {
            start_time: start.map(String::from),
            end_time: end.map(String::from),
            is_off: off,
        }
    }

    #[tokio::test]
    async fn test_upsert_schedule_keeps_one_row_per_day() {
        let state = test_state().await;
        let staff_id = seed_staff(&state.db).await;

        for (start, end) in [("09:00", "17:00"), ("10:00", "19:00")] {
            upsert_schedule(
                State(state.clone()),
                headers_for(7, "owner"),
                Path((staff_id, 2)),
                Json(put(Some(start), Some(end), Some(false))),
            )
            .await
            .unwrap();
        }

        assert_eq!(schedule_rows_for(&state.db, staff_id, 2).await, 1);
        let row = sqlx::query_as::<_, WeeklySchedule>(
            "SELECT * FROM weekly_schedules WHERE staff_id = ? AND day_of_week = 2",
        )
        .bind(staff_id)
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(row.start_time, "10:00");
        assert_eq!(row.end_time, "19:00");
    }

    #[tokio::test]
    async fn test_upsert_schedule_merges_missing_fields() {
        let state = test_state().await;
        let staff_id = seed_staff(&state.db).await;

        upsert_schedule(
            State(state.clone()),
            headers_for(7, "owner"),
            Path((staff_id, 3)),
            Json(put(Some("10:00"), Some("16:00"), Some(false))),
        )
        .await
        .unwrap();

        // Flip the day off; the stored hours must survive.
        let Json(resp) = upsert_schedule(
            State(state.clone()),
            headers_for(7, "owner"),
            Path((staff_id, 3)),
            Json(put(None, None, Some(true))),
        )
        .await
        .unwrap();

        let row = resp.data.unwrap();
        assert_eq!(row.start_time, "10:00");
        assert_eq!(row.end_time, "16:00");
        assert!(row.is_off);
        assert_eq!(schedule_rows_for(&state.db, staff_id, 3).await, 1);
    }

    #[tokio::test]
    async fn test_upsert_schedule_rejects_bad_day() {
        let state = test_state().await;
        let staff_id = seed_staff(&state.db).await;

        let err = upsert_schedule(
            State(state.clone()),
            headers_for(7, "owner"),
            Path((staff_id, 7)),
            Json(put(Some("09:00"), Some("17:00"), None)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_duplicate_schedule_row_rejected_by_index() {
        let state = test_state().await;
        let staff_id = seed_staff(&state.db).await;

        sqlx::query(
            "INSERT INTO weekly_schedules (staff_id, day_of_week, start_time, end_time, is_off)
             VALUES (?, 4, '09:00', '17:00', 0)",
        )
        .bind(staff_id)
        .execute(&state.db)
        .await
        .unwrap();
        let dup = sqlx::query(
            "INSERT INTO weekly_schedules (staff_id, day_of_week, start_time, end_time, is_off)
             VALUES (?, 4, '11:00', '15:00', 0)",
        )
        .bind(staff_id)
        .execute(&state.db)
        .await;
        assert!(dup.is_err());
    }
}
