// libs/appointment-cell/src/services/booking.rs
use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DatastoreClient, DatastoreError};

use crate::models::{
    calendar_day, slot_key, Appointment, AppointmentError, AppointmentStats, AppointmentStatus,
    BookAppointmentRequest, TimeSlot, UpdateAppointmentRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::watch::{AppointmentEvent, AppointmentWatchService};

pub struct AppointmentBookingService {
    datastore: Arc<DatastoreClient>,
    availability: AvailabilityService,
    lifecycle_service: AppointmentLifecycleService,
    watcher: Option<AppointmentWatchService>,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let datastore = Arc::new(DatastoreClient::new(config));

        Self {
            availability: AvailabilityService::new(Arc::clone(&datastore)),
            lifecycle_service: AppointmentLifecycleService::new(),
            datastore,
            watcher: None,
        }
    }

    /// Publish successful writes to live subscribers.
    pub fn with_watcher(mut self, watcher: AppointmentWatchService) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn availability(&self) -> &AvailabilityService {
        &self.availability
    }

    /// Book a slot after re-checking that nobody took it since the form loaded.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for patient {} on {} at {}",
              request.patient_id, request.date, request.time);

        self.validate_booking_request(&request)?;

        let booked = self.availability.booked_slots(request.date, auth_token).await?;
        if booked.iter().any(|slot| slot.time == request.time) {
            warn!("Slot {} on {} was taken before confirmation", request.time, request.date);
            return Err(self.slot_taken(request.date, request.time, None, auth_token).await);
        }

        let appointment = self.create_appointment_record(request, auth_token).await?;

        self.publish(AppointmentEvent::created(&appointment));
        info!("Appointment {} booked for {} at {}", appointment.id, appointment.date, appointment.time);
        Ok(appointment)
    }

    /// Get appointment by ID
    pub async fn get_appointment(
        &self,
        appointment_id: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        if appointment_id.trim().is_empty() {
            return Err(AppointmentError::ValidationError("Appointment id is required".to_string()));
        }

        let path = format!("/rest/v1/appointments?id=eq.{}", urlencoding::encode(appointment_id));
        let result: Vec<Value> = self.datastore.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    /// Update an existing appointment. Moving it re-checks the target slot,
    /// ignoring the appointment's own booking.
    pub async fn update_appointment(
        &self,
        appointment_id: &str,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment: {}", appointment_id);

        if request.is_empty() {
            return Err(AppointmentError::ValidationError("No fields to update".to_string()));
        }
        self.validate_update_request(&request)?;

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service.ensure_editable(&current)?;

        let new_status = request.status.unwrap_or(current.status);
        if new_status != current.status {
            self.lifecycle_service.validate_status_transition(&current.status, &new_status)?;
        }

        let new_date = request.date.unwrap_or(current.date);
        let new_time = request.time.unwrap_or(current.time);
        let moved = new_date != current.date || new_time != current.time;

        if moved && new_status.occupies_slot() {
            let booked = self.availability.booked_slots(new_date, auth_token).await?;
            let taken = booked
                .iter()
                .any(|slot| slot.time == new_time && slot.appointment_id != current.id);
            if taken {
                warn!("Cannot move appointment {} to occupied slot {} on {}", current.id, new_time, new_date);
                return Err(self.slot_taken(new_date, new_time, Some(&current.id), auth_token).await);
            }
        }

        let mut update_data = Map::new();
        if let Some(patient_id) = &request.patient_id {
            update_data.insert("patientId".to_string(), json!(patient_id.trim()));
        }
        if let Some(patient_name) = &request.patient_name {
            update_data.insert("patientName".to_string(), json!(patient_name));
        }
        if let Some(reason) = &request.reason {
            update_data.insert("reason".to_string(), json!(reason.trim()));
        }
        if let Some(notes) = &request.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }
        if moved {
            update_data.insert("date".to_string(), json!(new_date.format("%Y-%m-%d").to_string()));
            update_data.insert("time".to_string(), json!(new_time.label()));
        }
        if new_status != current.status {
            update_data.insert("status".to_string(), json!(new_status.as_str()));
        }
        if moved || new_status != current.status {
            update_data.insert("slotKey".to_string(), slot_key_value(new_date, new_time, new_status));
        }

        let updated = self.update_appointment_record(&current, (new_date, new_time), update_data, auth_token).await?;

        self.publish(AppointmentEvent::updated(&updated, current.date));
        info!("Appointment {} updated successfully", appointment_id);
        Ok(updated)
    }

    /// Move an appointment along the status chain.
    pub async fn update_status(
        &self,
        appointment_id: &str,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Changing status of appointment {} to {}", appointment_id, new_status);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service.validate_status_transition(&current.status, &new_status)?;

        let mut update_data = Map::new();
        update_data.insert("status".to_string(), json!(new_status.as_str()));
        update_data.insert("slotKey".to_string(), slot_key_value(current.date, current.time, new_status));

        let target = (current.date, current.time);
        let updated = self.update_appointment_record(&current, target, update_data, auth_token).await?;

        self.publish(AppointmentEvent::status_changed(&updated));
        info!("Appointment {} moved from {} to {}", appointment_id, current.status, new_status);
        Ok(updated)
    }

    pub async fn delete_appointment(
        &self,
        appointment_id: &str,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        debug!("Deleting appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        let path = format!("/rest/v1/appointments?id=eq.{}", urlencoding::encode(&current.id));
        self.datastore.execute(Method::DELETE, &path, Some(auth_token), None).await?;

        self.publish(AppointmentEvent::deleted(&current.id, current.date));
        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    /// All appointments of one calendar day, ordered by time.
    pub async fn appointments_for_date(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments for {}", date);

        let path = format!("/rest/v1/appointments?{}", calendar_day::window_filter(date));

        let rows = match self.datastore.request::<Vec<Value>>(Method::GET, &path, Some(auth_token), None).await {
            Ok(rows) => rows,
            Err(e) if e.is_query_rejected() => {
                warn!("Day query rejected ({}), falling back to full scan", e);
                self.datastore.request(Method::GET, "/rest/v1/appointments", Some(auth_token), None).await?
            }
            Err(e) => return Err(e.into()),
        };

        let mut appointments: Vec<Appointment> = parse_appointments(rows)
            .into_iter()
            .filter(|appointment| appointment.date == date)
            .collect();
        appointments.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.created_at.cmp(&b.created_at)));

        Ok(appointments)
    }

    /// A patient's appointments, newest day first.
    pub async fn appointments_for_patient(
        &self,
        patient_id: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments for patient {}", patient_id);

        let ordered_path = format!("/rest/v1/appointments?patientId=eq.{}&order=date.desc", urlencoding::encode(patient_id));
        let rows = match self.datastore.request::<Vec<Value>>(Method::GET, &ordered_path, Some(auth_token), None).await {
            Ok(rows) => rows,
            Err(e) if e.is_query_rejected() => {
                warn!("Ordered patient query rejected ({}), sorting in memory", e);
                let path = format!("/rest/v1/appointments?patientId=eq.{}", urlencoding::encode(patient_id));
                self.datastore.request(Method::GET, &path, Some(auth_token), None).await?
            }
            Err(e) => return Err(e.into()),
        };

        let mut appointments: Vec<Appointment> = parse_appointments(rows)
            .into_iter()
            .filter(|appointment| appointment.patient_id == patient_id)
            .collect();
        appointments.sort_by(newest_first);

        Ok(appointments)
    }

    pub async fn list_appointments(&self, auth_token: &str) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing all appointments");

        let rows: Vec<Value> = self.datastore.request(
            Method::GET,
            "/rest/v1/appointments?order=date.desc",
            Some(auth_token),
            None,
        ).await?;

        let mut appointments = parse_appointments(rows);
        appointments.sort_by(newest_first);
        Ok(appointments)
    }

    pub async fn appointment_stats(&self, auth_token: &str) -> Result<AppointmentStats, AppointmentError> {
        let appointments = self.list_appointments(auth_token).await?;
        let stats = AppointmentStats::from_appointments(&appointments);
        debug!("Appointment stats: {:?}", stats);
        Ok(stats)
    }

    // Private helper methods

    fn validate_booking_request(&self, request: &BookAppointmentRequest) -> Result<(), AppointmentError> {
        if request.patient_id.trim().is_empty() {
            return Err(AppointmentError::ValidationError("Patient is required".to_string()));
        }
        if request.reason.trim().is_empty() {
            return Err(AppointmentError::ValidationError("Reason for visit is required".to_string()));
        }
        self.validate_slot(&request.time)
    }

    fn validate_update_request(&self, request: &UpdateAppointmentRequest) -> Result<(), AppointmentError> {
        if request.patient_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(AppointmentError::ValidationError("Patient is required".to_string()));
        }
        if request.reason.as_deref().is_some_and(|reason| reason.trim().is_empty()) {
            return Err(AppointmentError::ValidationError("Reason for visit is required".to_string()));
        }
        match &request.time {
            Some(time) => self.validate_slot(time),
            None => Ok(()),
        }
    }

    fn validate_slot(&self, time: &TimeSlot) -> Result<(), AppointmentError> {
        if !self.availability.grid().contains(time) {
            return Err(AppointmentError::ValidationError(format!(
                "{} is not a bookable time slot", time
            )));
        }
        Ok(())
    }

    /// Conflict error carrying a freshly resolved list of open slots.
    async fn slot_taken(
        &self,
        date: NaiveDate,
        time: TimeSlot,
        exclude_appointment_id: Option<&str>,
        auth_token: &str,
    ) -> AppointmentError {
        let available_slots = self.availability
            .available_slots(date, exclude_appointment_id, auth_token)
            .await
            .into_iter()
            .filter(|slot| *slot != time)
            .collect();

        AppointmentError::SlotNoLongerAvailable { date, time, available_slots }
    }

    async fn create_appointment_record(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment_data = json!({
            "id": Uuid::new_v4().to_string(),
            "patientId": request.patient_id.trim(),
            "patientName": request.patient_name,
            "date": request.date.format("%Y-%m-%d").to_string(),
            "time": request.time.label(),
            "reason": request.reason.trim(),
            "notes": request.notes,
            "status": AppointmentStatus::Scheduled.as_str(),
            "createdAt": Utc::now().to_rfc3339(),
            "slotKey": slot_key(request.date, request.time),
        });

        let result: Result<Vec<Value>, DatastoreError> = self.datastore.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(DatastoreClient::representation_headers()),
        ).await;

        let rows = match result {
            Ok(rows) => rows,
            Err(DatastoreError::Conflict(msg)) => {
                warn!("Slot key conflict while booking {} on {}: {}", request.time, request.date, msg);
                return Err(self.slot_taken(request.date, request.time, None, auth_token).await);
            }
            Err(e) => return Err(e.into()),
        };

        let row = rows.into_iter().next()
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse created appointment: {}", e)))
    }

    async fn update_appointment_record(
        &self,
        current: &Appointment,
        (date, time): (NaiveDate, TimeSlot),
        mut update_data: Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        update_data.insert("updatedAt".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/appointments?id=eq.{}", urlencoding::encode(&current.id));
        let result: Result<Vec<Value>, DatastoreError> = self.datastore.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(DatastoreClient::representation_headers()),
        ).await;

        let rows = match result {
            Ok(rows) => rows,
            Err(DatastoreError::Conflict(msg)) => {
                warn!("Slot key conflict while updating appointment {}: {}", current.id, msg);
                return Err(self.slot_taken(date, time, Some(&current.id), auth_token).await);
            }
            Err(e) => return Err(e.into()),
        };

        let row = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse updated appointment: {}", e)))
    }

    fn publish(&self, event: AppointmentEvent) {
        if let Some(watcher) = &self.watcher {
            watcher.publish(event);
        }
    }
}

/// `slotKey` column value: set while the appointment holds its slot.
fn slot_key_value(date: NaiveDate, time: TimeSlot, status: AppointmentStatus) -> Value {
    if status.occupies_slot() {
        json!(slot_key(date, time))
    } else {
        Value::Null
    }
}

fn parse_appointments(rows: Vec<Value>) -> Vec<Appointment> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<Appointment>(row) {
            Ok(appointment) => Some(appointment),
            Err(e) => {
                warn!("Skipping unreadable appointment row: {}", e);
                None
            }
        })
        .collect()
}

fn newest_first(a: &Appointment, b: &Appointment) -> Ordering {
    b.date.cmp(&a.date).then_with(|| a.time.cmp(&b.time))
}
