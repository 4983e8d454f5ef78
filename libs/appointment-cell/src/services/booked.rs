// libs/appointment-cell/src/services/booked.rs
use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use shared_database::{DatastoreClient, DatastoreError};

use crate::models::{calendar_day, AppointmentError, AppointmentStatus, BookedSlot, TimeSlot};

/// Minimal projection of an appointment row needed to decide slot occupancy.
#[derive(Debug, Deserialize)]
struct SlotRecord {
    id: String,
    time: TimeSlot,
    #[serde(default)]
    status: Option<AppointmentStatus>,
    #[serde(default)]
    date: Option<String>,
}

/// Finds which slots of a day are held by active appointments.
pub struct BookedSlotService {
    datastore: Arc<DatastoreClient>,
}

impl BookedSlotService {
    pub fn new(datastore: Arc<DatastoreClient>) -> Self {
        Self { datastore }
    }

    /// Slots on `date` occupied by a non-cancelled appointment, ordered by time.
    ///
    /// The filtered query can be refused by the datastore (missing composite
    /// index and similar); the full-scan path then produces the same result.
    pub async fn booked_slots(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedSlot>, AppointmentError> {
        debug!("Looking up booked slots for {}", date);

        match self.query_booked_rows(date, auth_token).await {
            Ok(rows) => {
                let booked = collect_booked(rows, date);
                debug!("Found {} booked slots on {}", booked.len(), date);
                Ok(booked)
            }
            Err(e) if e.is_query_rejected() => {
                warn!("Booked-slot query rejected ({}), falling back to full scan", e);
                let rows = self.scan_all_rows(auth_token).await?;
                let booked = collect_booked(rows, date);
                debug!("Full scan found {} booked slots on {}", booked.len(), date);
                Ok(booked)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn query_booked_rows(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Value>, DatastoreError> {
        let statuses = AppointmentStatus::ACTIVE
            .iter()
            .map(AppointmentStatus::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let path = format!(
            "/rest/v1/appointments?select=id,time,status,date&{}&status=in.({})",
            calendar_day::window_filter(date),
            statuses,
        );

        self.datastore.request(Method::GET, &path, Some(auth_token), None).await
    }

    async fn scan_all_rows(&self, auth_token: &str) -> Result<Vec<Value>, DatastoreError> {
        self.datastore.request(
            Method::GET,
            "/rest/v1/appointments?select=id,time,status,date",
            Some(auth_token),
            None,
        ).await
    }
}

/// Keep rows that are active and fall on `date`, skipping rows that cannot
/// be read. Rows without a status or date are trusted to the server filter.
fn collect_booked(rows: Vec<Value>, date: NaiveDate) -> Vec<BookedSlot> {
    let mut booked: Vec<BookedSlot> = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<SlotRecord>(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping unreadable appointment row: {}", e);
                None
            }
        })
        .filter(|record| record.status.map_or(true, |status| status.occupies_slot()))
        .filter(|record| match record.date.as_deref() {
            Some(raw) => calendar_day::parse(raw) == Some(date),
            None => true,
        })
        .map(|record| BookedSlot {
            appointment_id: record.id,
            time: record.time,
        })
        .collect();

    booked.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.appointment_id.cmp(&b.appointment_id)));
    booked
}
