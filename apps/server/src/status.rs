//! Booking lifecycle state machine. Authorization is the caller's job;
//! this module only enforces the transition table and its side effects.

use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::models::{Booking, BookingStatus};

/// The full transition table. Completed, cancelled and no-show are
/// terminal: nothing leaves them.
pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    matches!(
        (from, to),
        (Pending, Confirmed)
            | (Pending, Cancelled)
            | (Confirmed, InProgress)
            | (Confirmed, Cancelled)
            | (Confirmed, NoShow)
            | (InProgress, Completed)
            | (InProgress, Cancelled)
    )
}

/// Guarded status write: only applies while the row still holds the
/// status we checked against, so two racing transitions cannot both win.
/// Returns whether a row was updated.
async fn apply_status(
    db: &SqlitePool,
    booking_id: i64,
    from: BookingStatus,
    to: BookingStatus,
    actor_id: i64,
    cancel_reason: Option<&str>,
    now: &str,
) -> Result<bool, sqlx::Error> {
    let result = match to {
        BookingStatus::Cancelled => {
            sqlx::query(
                "UPDATE bookings
                 SET status = ?, cancel_reason = ?, cancelled_at = ?, cancelled_by = ?
                 WHERE id = ? AND status = ?",
            )
            .bind(to)
            .bind(cancel_reason)
            .bind(now)
            .bind(actor_id)
            .bind(booking_id)
            .bind(from)
            .execute(db)
            .await?
        }
        BookingStatus::Completed => {
            sqlx::query(
                "UPDATE bookings SET status = ?, payment_status = 'paid'
                 WHERE id = ? AND status = ?",
            )
            .bind(to)
            .bind(booking_id)
            .bind(from)
            .execute(db)
            .await?
        }
        _ => {
            sqlx::query("UPDATE bookings SET status = ? WHERE id = ? AND status = ?")
                .bind(to)
                .bind(booking_id)
                .bind(from)
                .execute(db)
                .await?
        }
    };
    Ok(result.rows_affected() > 0)
}

/// Apply a status change to a booking, enforcing the transition table.
///
/// Entering `cancelled` records the reason, timestamp and acting user.
/// Entering `completed` forces `payment_status = paid` — completion
/// implies settled, even if the payment subsystem still says otherwise.
pub async fn transition(
    db: &SqlitePool,
    booking_id: i64,
    new_status: BookingStatus,
    actor_id: i64,
    cancel_reason: Option<&str>,
    now: &str,
) -> Result<Booking, ApiError> {
    let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(booking_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))?;

    if !can_transition(booking.status, new_status) {
        return Err(ApiError::InvalidStateTransition {
            from: booking.status,
            to: new_status,
        });
    }

    let applied = apply_status(
        db,
        booking_id,
        booking.status,
        new_status,
        actor_id,
        cancel_reason,
        now,
    )
    .await?;
    if !applied {
        // Someone else moved the booking between our read and our write;
        // report the transition against what the row holds now.
        let current: BookingStatus =
            sqlx::query_scalar("SELECT status FROM bookings WHERE id = ?")
                .bind(booking_id)
                .fetch_one(db)
                .await?;
        return Err(ApiError::InvalidStateTransition {
            from: current,
            to: new_status,
        });
    }

    tracing::info!(
        booking_id,
        from = %booking.status,
        to = %new_status,
        actor_id,
        "booking status changed"
    );

    let updated = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(booking_id)
        .fetch_one(db)
        .await?;
    Ok(updated)
}

// ── Tests ──
