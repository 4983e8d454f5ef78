// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ==============================================================================
// SLOT LABELS
// ==============================================================================

/// A bookable time of day, written as `HH:MM AM/PM` with a zero-padded hour.
///
/// Parsing is lenient (`8:00 AM`, `08:00 am` and `16:30` are all accepted) so
/// records written by older clients compare equal to canonical labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSlot(NaiveTime);

impl TimeSlot {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(TimeSlot)
    }

    pub fn from_time(time: NaiveTime) -> Self {
        TimeSlot(time)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    pub fn minute_of_day(&self) -> u32 {
        self.0.hour() * 60 + self.0.minute()
    }

    pub fn label(&self) -> String {
        self.0.format("%I:%M %p").to_string()
    }

    /// 24-hour form used inside slot keys.
    pub fn key(&self) -> String {
        self.0.format("%H:%M").to_string()
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for TimeSlot {
    type Err = AppointmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();

        NaiveTime::parse_from_str(trimmed, "%I:%M %p")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .map(TimeSlot)
            .map_err(|_| AppointmentError::ValidationError(format!("Invalid time slot: '{}'", value)))
    }
}

impl Serialize for TimeSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for TimeSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Serde adapter reading a calendar day from either `YYYY-MM-DD` or a full
/// timestamp. Timestamps are reduced to the date in their own offset.
pub mod calendar_day {
    use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| dt.date())
            })
    }

    /// Server-side filter selecting every row that can fall on `date`.
    ///
    /// Legacy timestamp rows are compared by instant on the server, so the
    /// window is widened by a day on each side to cover any UTC offset.
    /// Callers narrow the rows to the calendar day with [`parse`].
    pub fn window_filter(date: NaiveDate) -> String {
        let from = date - Duration::days(1);
        let until = date + Duration::days(2);
        format!("date=gte.{}&date=lt.{}", from.format("%Y-%m-%d"), until.format("%Y-%m-%d"))
    }

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid calendar day '{}'", raw)))
    }
}

/// Key identifying one slot on one day, e.g. `2024-05-01T09:30`.
pub fn slot_key(date: NaiveDate, time: TimeSlot) -> String {
    format!("{}T{}", date.format("%Y-%m-%d"), time.key())
}

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(with = "calendar_day")]
    pub date: NaiveDate,
    pub time: TimeSlot,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn occupies_slot(&self) -> bool {
        self.status.occupies_slot()
    }

    pub fn slot_key(&self) -> String {
        slot_key(self.date, self.time)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Scheduled,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Statuses that hold a slot on the day grid.
    pub const ACTIVE: [AppointmentStatus; 4] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::CheckedIn,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::CheckedIn => "checked-in",
            AppointmentStatus::InProgress => "in-progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn occupies_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    /// Still waiting to be seen (counted as "waiting" in statistics).
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::CheckedIn | AppointmentStatus::InProgress
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A slot taken by an active appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookedSlot {
    pub appointment_id: String,
    pub time: TimeSlot,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub date: NaiveDate,
    pub time: TimeSlot,
    pub reason: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<TimeSlot>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

impl UpdateAppointmentRequest {
    /// True when only fields a doctor may change are present.
    pub fn is_clinical_only(&self) -> bool {
        self.patient_id.is_none()
            && self.patient_name.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.reason.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.is_clinical_only() && self.notes.is_none() && self.status.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    pub exclude_appointment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub date: NaiveDate,
    pub available_slots: Vec<TimeSlot>,
    pub total_slots: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentStats {
    pub total: usize,
    pub completed: usize,
    pub waiting: usize,
    pub cancelled: usize,
}

impl AppointmentStats {
    pub fn from_appointments(appointments: &[Appointment]) -> Self {
        appointments.iter().fold(Self::default(), |mut stats, appointment| {
            stats.total += 1;
            match appointment.status {
                AppointmentStatus::Completed => stats.completed += 1,
                AppointmentStatus::Cancelled => stats.cancelled += 1,
                status if status.is_waiting() => stats.waiting += 1,
                _ => {}
            }
            stats
        })
    }
}

// ==============================================================================
// SLOT GRID CONFIGURATION
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SlotGridConfig {
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub interval_minutes: u32,
    pub include_closing_slot: bool,
}

impl Default for SlotGridConfig {
    fn default() -> Self {
        Self {
            opens_at: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            closes_at: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            interval_minutes: 30,
            include_closing_slot: true, // 05:00 PM is bookable
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("The {time} slot on {date} is no longer available")]
    SlotNoLongerAvailable {
        date: NaiveDate,
        time: TimeSlot,
        available_slots: Vec<TimeSlot>,
    },

    #[error("Cannot change status from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Cancelled appointments cannot be modified")]
    AppointmentLocked,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Datastore unavailable: {0}")]
    DatastoreUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_database::DatastoreError> for AppointmentError {
    fn from(error: shared_database::DatastoreError) -> Self {
        use shared_database::DatastoreError;

        match error {
            DatastoreError::Unavailable(msg) => AppointmentError::DatastoreUnavailable(msg),
            DatastoreError::Unauthorized(msg) => AppointmentError::PermissionDenied(msg),
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_slot_parses_legacy_and_canonical_labels() {
        let canonical: TimeSlot = "08:00 AM".parse().unwrap();
        let legacy: TimeSlot = "8:00 AM".parse().unwrap();
        let lowercase: TimeSlot = "08:00 am".parse().unwrap();
        let clock: TimeSlot = "08:00".parse().unwrap();

        assert_eq!(canonical, legacy);
        assert_eq!(canonical, lowercase);
        assert_eq!(canonical, clock);
        assert_eq!(legacy.label(), "08:00 AM");

        let closing: TimeSlot = "5:00 pm".parse().unwrap();
        let closing_clock: TimeSlot = "17:00".parse().unwrap();
        assert_eq!(closing, closing_clock);
        assert_eq!(closing.label(), "05:00 PM");
    }

    #[test]
    fn test_time_slot_noon_and_midnight() {
        let noon: TimeSlot = "12:30 PM".parse().unwrap();
        assert_eq!(noon.minute_of_day(), 12 * 60 + 30);

        let midnight: TimeSlot = "12:00 AM".parse().unwrap();
        assert_eq!(midnight.minute_of_day(), 0);

        let afternoon: TimeSlot = "01:00 PM".parse().unwrap();
        assert!(noon < afternoon);
    }

    #[test]
    fn test_time_slot_rejects_garbage() {
        assert!("13:00 PM".parse::<TimeSlot>().is_err());
        assert!("0:30 AM".parse::<TimeSlot>().is_err());
        assert!("noon".parse::<TimeSlot>().is_err());
        assert!("10:75 AM".parse::<TimeSlot>().is_err());
        assert!("25:00".parse::<TimeSlot>().is_err());
        assert!("09:00 AM extra".parse::<TimeSlot>().is_err());
    }

    #[test]
    fn test_appointment_reads_timestamp_dates_by_calendar_day() {
        let raw = serde_json::json!({
            "id": "apt-1",
            "patientId": "patient-1",
            "date": "2024-05-01T18:45:00+05:30",
            "time": "9:00 AM",
            "reason": "Fever",
            "status": "checked-in"
        });

        let appointment: Appointment = serde_json::from_value(raw).unwrap();
        assert_eq!(appointment.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(appointment.time.label(), "09:00 AM");
        assert_eq!(appointment.status, AppointmentStatus::CheckedIn);
        assert_eq!(appointment.slot_key(), "2024-05-01T09:00");
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(AppointmentStatus::InProgress).unwrap(),
            serde_json::json!("in-progress")
        );
        assert!(!AppointmentStatus::Cancelled.occupies_slot());
        assert!(AppointmentStatus::Completed.occupies_slot());
        assert!(AppointmentStatus::Completed.is_terminal());
    }

    #[test]
    fn test_stats_from_appointments() {
        let make = |status| Appointment {
            id: "a".into(),
            patient_id: "p".into(),
            patient_name: None,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            time: TimeSlot::from_hm(9, 0).unwrap(),
            reason: "r".into(),
            notes: None,
            status,
            created_at: Utc::now(),
        };
        let appointments = vec![
            make(AppointmentStatus::Scheduled),
            make(AppointmentStatus::InProgress),
            make(AppointmentStatus::Completed),
            make(AppointmentStatus::Cancelled),
        ];

        let stats = AppointmentStats::from_appointments(&appointments);
        assert_eq!(stats, AppointmentStats { total: 4, completed: 1, waiting: 2, cancelled: 1 });
    }
}
