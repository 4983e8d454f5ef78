// libs/appointment-cell/src/services/availability.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Method;
use tracing::{debug, error};

use shared_database::DatastoreClient;

use crate::models::{Appointment, AppointmentError, BookedSlot, TimeSlot};
use crate::services::booked::BookedSlotService;
use crate::services::slots::SlotGrid;

/// Compute the slots free on `date`.
///
/// `editing` is the appointment being edited, if any: its own booking does
/// not block its slot, and when it sits on `date` its slot is always offered.
pub fn resolve_available(
    grid: &SlotGrid,
    booked: &[BookedSlot],
    date: NaiveDate,
    exclude_appointment_id: Option<&str>,
    editing: Option<&Appointment>,
) -> Vec<TimeSlot> {
    let taken: HashSet<TimeSlot> = booked
        .iter()
        .filter(|slot| Some(slot.appointment_id.as_str()) != exclude_appointment_id)
        .map(|slot| slot.time)
        .collect();

    let mut available: Vec<TimeSlot> = grid
        .slots()
        .iter()
        .filter(|slot| !taken.contains(slot))
        .copied()
        .collect();

    if let Some(current) = editing {
        let is_excluded = Some(current.id.as_str()) == exclude_appointment_id;
        if is_excluded && current.date == date && !available.contains(&current.time) {
            debug!("Restoring slot {} for appointment {} being edited", current.time, current.id);
            available.push(current.time);
            available.sort();
        }
    }

    available
}

pub struct AvailabilityService {
    datastore: Arc<DatastoreClient>,
    booked_slots: BookedSlotService,
    grid: SlotGrid,
}

impl AvailabilityService {
    pub fn new(datastore: Arc<DatastoreClient>) -> Self {
        Self::with_grid(datastore, SlotGrid::standard())
    }

    pub fn with_grid(datastore: Arc<DatastoreClient>, grid: SlotGrid) -> Self {
        Self {
            booked_slots: BookedSlotService::new(Arc::clone(&datastore)),
            datastore,
            grid,
        }
    }

    pub fn grid(&self) -> &SlotGrid {
        &self.grid
    }

    pub async fn booked_slots(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedSlot>, AppointmentError> {
        self.booked_slots.booked_slots(date, auth_token).await
    }

    /// Available slots for booking or editing on `date`.
    ///
    /// Never fails: when the datastore cannot be read the whole grid is
    /// returned and the booking-time re-check catches any conflict.
    pub async fn available_slots(
        &self,
        date: NaiveDate,
        exclude_appointment_id: Option<&str>,
        auth_token: &str,
    ) -> Vec<TimeSlot> {
        match self.try_available_slots(date, exclude_appointment_id, auth_token).await {
            Ok(available) => {
                debug!("{} of {} slots available on {}", available.len(), self.grid.len(), date);
                available
            }
            Err(e) => {
                error!("Failed to compute available slots for {}: {}. Offering the full grid", date, e);
                self.grid.to_vec()
            }
        }
    }

    async fn try_available_slots(
        &self,
        date: NaiveDate,
        exclude_appointment_id: Option<&str>,
        auth_token: &str,
    ) -> Result<Vec<TimeSlot>, AppointmentError> {
        let booked = self.booked_slots.booked_slots(date, auth_token).await?;

        let editing = match exclude_appointment_id {
            Some(id) => self.find_appointment(id, auth_token).await,
            None => None,
        };

        Ok(resolve_available(&self.grid, &booked, date, exclude_appointment_id, editing.as_ref()))
    }

    /// Best-effort fetch of the appointment being edited; a failure only
    /// skips the slot restoration step.
    async fn find_appointment(&self, appointment_id: &str, auth_token: &str) -> Option<Appointment> {
        let path = format!("/rest/v1/appointments?id=eq.{}", urlencoding::encode(appointment_id));
        let result: Result<Vec<Appointment>, _> = self.datastore.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await;

        match result {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                error!("Failed to load appointment {} being edited: {}", appointment_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::Utc;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn slot(label: &str) -> TimeSlot {
        label.parse().unwrap()
    }

    fn booked(id: &str, label: &str) -> BookedSlot {
        BookedSlot { appointment_id: id.to_string(), time: slot(label) }
    }

    fn appointment(id: &str, date: NaiveDate, label: &str) -> Appointment {
        Appointment {
            id: id.to_string(),
            patient_id: "patient-1".to_string(),
            patient_name: None,
            date,
            time: slot(label),
            reason: "Check-up".to_string(),
            notes: None,
            status: AppointmentStatus::Scheduled,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_available_and_booked_partition_the_grid() {
        let grid = SlotGrid::standard();
        let taken = vec![booked("a", "09:00 AM"), booked("b", "02:00 PM")];

        let available = resolve_available(&grid, &taken, day(), None, None);

        assert_eq!(available.len(), grid.len() - 2);
        for slot in grid.slots() {
            let is_taken = taken.iter().any(|b| b.time == *slot);
            assert_ne!(available.contains(slot), is_taken);
        }
    }

    #[test]
    fn test_excluded_appointment_keeps_its_slot() {
        let grid = SlotGrid::standard();
        let taken = vec![booked("self", "10:30 AM"), booked("other", "11:00 AM")];
        let editing = appointment("self", day(), "10:30 AM");

        let available = resolve_available(&grid, &taken, day(), Some("self"), Some(&editing));

        assert!(available.contains(&slot("10:30 AM")));
        assert!(!available.contains(&slot("11:00 AM")));
        assert!(available.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_editing_slot_restored_even_when_missing_from_lookup() {
        let grid = SlotGrid::standard();
        // The lookup reports another appointment in the slot the edited one holds.
        let taken = vec![booked("other", "03:00 PM")];
        let editing = appointment("self", day(), "03:00 PM");

        let available = resolve_available(&grid, &taken, day(), Some("self"), Some(&editing));

        assert!(available.contains(&slot("03:00 PM")));
        assert_eq!(available.len(), grid.len());
        assert!(available.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_editing_slot_not_restored_on_other_day() {
        let grid = SlotGrid::standard();
        let taken = vec![booked("other", "03:00 PM")];
        let other_day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let editing = appointment("self", other_day, "03:00 PM");

        let available = resolve_available(&grid, &taken, day(), Some("self"), Some(&editing));

        assert!(!available.contains(&slot("03:00 PM")));
    }

    #[test]
    fn test_fully_booked_day_is_empty() {
        let grid = SlotGrid::standard();
        let taken: Vec<BookedSlot> = grid
            .slots()
            .iter()
            .enumerate()
            .map(|(i, s)| BookedSlot { appointment_id: format!("apt-{}", i), time: *s })
            .collect();

        assert!(resolve_available(&grid, &taken, day(), None, None).is_empty());
    }
}
