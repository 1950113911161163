//! Booking allocation: slot listing and conflict-checked creation.
//!
//! Creation runs the conflict query and the insert inside one transaction,
//! and the partial unique index on (staff_id, date, time_slot) backstops
//! two concurrent requests for the identical start time.

use chrono::{DateTime, FixedOffset, NaiveDate};
use rand::Rng;
use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::models::{
    Booking, BookingDetail, BookingService, CreateBookingRequest, Salon, Service, Staff,
    WeeklySchedule,
};
use crate::scheduling::{
    self, available_starts, interval_conflicts, parse_time, WorkingWindow,
};

/// Booking codes: fixed tag + base36 timestamp tail + random filler.
const CODE_TAG: &str = "BK";
const CODE_LEN: usize = 12;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Attempts at regenerating a colliding booking code before giving up.
const CODE_RETRIES: usize = 3;

/// Build a booking code from a millisecond timestamp plus random filler,
/// truncated to `CODE_LEN`. Uniqueness is enforced by the database.
pub fn generate_booking_code(now_ms: i64) -> String {
    let ts = base36(now_ms);
    let tail = &ts[ts.len().saturating_sub(6)..];
    let mut code = format!("{}{}", CODE_TAG, tail);
    let mut rng = rand::thread_rng();
    while code.len() < CODE_LEN {
        code.push(CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char);
    }
    code.truncate(CODE_LEN);
    code
}

fn base36(mut n: i64) -> String {
    if n <= 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(CODE_CHARSET[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("charset is ascii")
}

/// Active (non-cancelled, non-no-show) booking intervals for a staff
/// member on a date, in minutes since midnight.
async fn active_intervals<'a, E>(
    ex: E,
    staff_id: i64,
    date: &str,
) -> Result<Vec<(i64, i64)>, sqlx::Error>
where
    E: sqlx::Executor<'a, Database = sqlx::Sqlite>,
{
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT time_slot, end_time FROM bookings
         WHERE staff_id = ? AND date = ? AND status NOT IN ('cancelled', 'no_show')",
    )
    .bind(staff_id)
    .bind(date)
    .fetch_all(ex)
    .await?;

    Ok(rows
        .iter()
        .filter_map(|(s, e)| Some((parse_time(s)?, parse_time(e)?)))
        .collect())
}

/// Weekly template rows for a staff member.
async fn schedule_rows(db: &SqlitePool, staff_id: i64) -> Result<Vec<WeeklySchedule>, sqlx::Error> {
    sqlx::query_as::<_, WeeklySchedule>(
        "SELECT * FROM weekly_schedules WHERE staff_id = ? ORDER BY day_of_week ASC",
    )
    .bind(staff_id)
    .fetch_all(db)
    .await
}

fn parse_date(date: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ApiError::InvalidInput("invalid date, expected YYYY-MM-DD".into()))
}

/// Candidate start times a customer can book for (staff, date, duration):
/// the staff's working window discretized every 30 minutes, minus starts
/// that would run past closing, minus starts inside an active booking.
pub async fn list_available_slots(
    db: &SqlitePool,
    staff_id: i64,
    date: &str,
    duration_min: i64,
) -> Result<Vec<String>, ApiError> {
    let day = parse_date(date)?;
    if duration_min <= 0 {
        return Err(ApiError::InvalidInput("duration must be positive".into()));
    }

    let staff = sqlx::query_as::<_, Staff>("SELECT * FROM staff WHERE id = ?")
        .bind(staff_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound("staff not found".into()))?;
    if !staff.is_active {
        return Err(ApiError::NotFound("staff not found".into()));
    }

    let rows = schedule_rows(db, staff_id).await?;
    let Some(window) = scheduling::working_window(&rows, day) else {
        return Ok(vec![]);
    };

    let busy = active_intervals(db, staff_id, date).await?;
    Ok(available_starts(window, duration_min, &busy))
}

/// Create a booking. Validation order: salon, services, staff/window,
/// then the conflict-checked insert. Every step fails with its own
/// taxonomy entry; nothing falls back silently.
pub async fn create_booking(
    db: &SqlitePool,
    customer_id: i64,
    req: &CreateBookingRequest,
    now: DateTime<FixedOffset>,
) -> Result<BookingDetail, ApiError> {
    let day = parse_date(&req.date)?;
    let slot_min = parse_time(&req.time_slot)
        .ok_or_else(|| ApiError::InvalidInput("invalid time, expected HH:MM".into()))?;

    // 1. Salon must exist and be active.
    let salon = sqlx::query_as::<_, Salon>("SELECT * FROM salons WHERE id = ?")
        .bind(req.salon_id)
        .fetch_optional(db)
        .await?
        .filter(|s| s.is_active)
        .ok_or_else(|| ApiError::NotFound("salon not found".into()))?;

    // 2. Every requested service must resolve to an active service of this
    //    salon; duplicates are not silently dropped.
    if req.service_ids.is_empty() {
        return Err(ApiError::InvalidInput("at least one service required".into()));
    }
    let placeholders = vec!["?"; req.service_ids.len()].join(", ");
    let sql = format!(
        "SELECT * FROM services WHERE salon_id = ? AND is_active = 1 AND id IN ({})",
        placeholders
    );
    let mut query = sqlx::query_as::<_, Service>(&sql).bind(req.salon_id);
    for id in &req.service_ids {
        query = query.bind(id);
    }
    let services = query.fetch_all(db).await?;
    if services.len() != req.service_ids.len() {
        return Err(ApiError::InvalidInput(
            "one or more services are unknown, inactive or belong to another salon".into(),
        ));
    }

    let total_duration: i64 = services.iter().map(|s| s.duration_min).sum();
    let total_amount: i64 = services.iter().map(|s| s.price).sum();
    let end_min = slot_min + total_duration;
    if end_min > 24 * 60 {
        return Err(ApiError::InvalidInput("booking runs past midnight".into()));
    }
    let end_time = scheduling::format_time(end_min);

    // 3. Staff, when requested, must be an active member of this salon and
    //    the slot must sit inside their working window. Without a staff
    //    preference the salon's operating hours bound the slot instead.
    if let Some(staff_id) = req.staff_id {
        let staff = sqlx::query_as::<_, Staff>("SELECT * FROM staff WHERE id = ?")
            .bind(staff_id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| ApiError::InvalidInput("staff not found".into()))?;
        if staff.salon_id != req.salon_id || !staff.is_active {
            return Err(ApiError::InvalidInput(
                "staff is inactive or belongs to another salon".into(),
            ));
        }

        let rows = schedule_rows(db, staff_id).await?;
        let window = scheduling::working_window(&rows, day)
            .ok_or_else(|| ApiError::InvalidInput("slot outside working window".into()))?;
        if slot_min < window.start_min || end_min > window.end_min {
            return Err(ApiError::InvalidInput("slot outside working window".into()));
        }
    } else {
        let window = WorkingWindow {
            start_min: parse_time(&salon.open_time)
                .ok_or_else(|| ApiError::InvalidInput("salon has no operating hours".into()))?,
            end_min: parse_time(&salon.close_time)
                .ok_or_else(|| ApiError::InvalidInput("salon has no operating hours".into()))?,
        };
        if slot_min < window.start_min || end_min > window.end_min {
            return Err(ApiError::InvalidInput("slot outside working window".into()));
        }
    }

    // 4.–6. Conflict check and insert share one transaction; the partial
    //       unique index catches what the check cannot.
    let created_at = now.format("%Y-%m-%d %H:%M:%S").to_string();
    let mut tx = db.begin().await?;

    if let Some(staff_id) = req.staff_id {
        let busy = active_intervals(&mut *tx, staff_id, &req.date).await?;
        if interval_conflicts(slot_min, end_min, &busy) {
            return Err(ApiError::Conflict(
                "staff not available at the requested time".into(),
            ));
        }
    }

    let mut booking_id = None;
    for attempt in 0..CODE_RETRIES {
        let code = generate_booking_code(now.timestamp_millis());
        let inserted = sqlx::query(
            "INSERT INTO bookings (booking_code, customer_id, salon_id, staff_id, date,
             time_slot, end_time, total_duration, total_amount, status, payment_status,
             note, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', 'unpaid', ?, ?)",
        )
        .bind(&code)
        .bind(customer_id)
        .bind(req.salon_id)
        .bind(req.staff_id)
        .bind(&req.date)
        .bind(&req.time_slot)
        .bind(&end_time)
        .bind(total_duration)
        .bind(total_amount)
        .bind(&req.note)
        .bind(&created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(result) => {
                booking_id = Some(result.last_insert_rowid());
                break;
            }
            Err(err) => {
                let unique = err
                    .as_database_error()
                    .is_some_and(|d| d.is_unique_violation());
                if !unique {
                    return Err(ApiError::Database(err));
                }
                let on_code = err
                    .as_database_error()
                    .is_some_and(|d| d.message().contains("booking_code"));
                if on_code && attempt + 1 < CODE_RETRIES {
                    tracing::warn!(attempt, "booking code collision, regenerating");
                    continue;
                }
                // Slot index violation, or codes kept colliding.
                return Err(ApiError::Conflict(
                    "staff not available at the requested time".into(),
                ));
            }
        }
    }
    let booking_id = booking_id.ok_or_else(|| {
        ApiError::Conflict("could not allocate a unique booking code".into())
    })?;

    for service in &services {
        sqlx::query(
            "INSERT INTO booking_services (booking_id, service_id, price, duration_min)
             VALUES (?, ?, ?, ?)",
        )
        .bind(booking_id)
        .bind(service.id)
        .bind(service.price)
        .bind(service.duration_min)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        booking_id,
        customer_id,
        salon_id = req.salon_id,
        date = %req.date,
        time_slot = %req.time_slot,
        "booking created"
    );

    booking_detail(db, booking_id).await
}

/// A booking with its line-item snapshots.
pub async fn booking_detail(db: &SqlitePool, booking_id: i64) -> Result<BookingDetail, ApiError> {
    let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(booking_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;

    let services = sqlx::query_as::<_, BookingService>(
        "SELECT * FROM booking_services WHERE booking_id = ? ORDER BY id ASC",
    )
    .bind(booking_id)
    .fetch_all(db)
    .await?;

    Ok(BookingDetail { booking, services })
}

// ── Tests ──
