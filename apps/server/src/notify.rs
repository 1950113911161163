//! Post-commit booking events. Delivery (messenger, e-mail, push) is an
//! external collaborator behind a webhook; we only fire the event and log
//! failures.

use serde::Serialize;

use crate::models::{Booking, BookingStatus};

#[derive(Debug, Serialize)]
pub struct BookingEvent {
    pub kind: &'static str,
    pub booking_id: i64,
    pub booking_code: String,
    pub salon_id: i64,
    pub staff_id: Option<i64>,
    pub customer_id: i64,
    pub date: String,
    pub time_slot: String,
    pub status: BookingStatus,
}

impl BookingEvent {
    pub fn new(kind: &'static str, booking: &Booking) -> Self {
        Self {
            kind,
            booking_id: booking.id,
            booking_code: booking.booking_code.clone(),
            salon_id: booking.salon_id,
            staff_id: booking.staff_id,
            customer_id: booking.customer_id,
            date: booking.date.clone(),
            time_slot: booking.time_slot.clone(),
            status: booking.status,
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Fire-and-forget: spawn the POST so handlers never wait on the
    /// collaborator.
    pub fn dispatch(&self, event: BookingEvent) {
        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&event).send().await {
                tracing::error!(
                    booking_id = event.booking_id,
                    kind = event.kind,
                    "failed to dispatch booking event: {}",
                    e
                );
            }
        });
    }
}
