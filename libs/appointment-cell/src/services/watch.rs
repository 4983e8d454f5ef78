// libs/appointment-cell/src/services/watch.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::models::{calendar_day, Appointment};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentEventKind {
    Created,
    Updated,
    StatusChanged,
    Deleted,
}

impl AppointmentEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentEventKind::Created => "created",
            AppointmentEventKind::Updated => "updated",
            AppointmentEventKind::StatusChanged => "status_changed",
            AppointmentEventKind::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentEvent {
    pub kind: AppointmentEventKind,
    pub appointment_id: String,
    #[serde(with = "calendar_day")]
    pub date: NaiveDate,
    /// Date the appointment sat on before a move.
    pub previous_date: Option<NaiveDate>,
    /// Record after the write; `None` for deletions.
    pub appointment: Option<Appointment>,
    pub at: DateTime<Utc>,
}

impl AppointmentEvent {
    pub fn created(appointment: &Appointment) -> Self {
        Self::for_record(AppointmentEventKind::Created, appointment, None)
    }

    pub fn updated(appointment: &Appointment, previous_date: NaiveDate) -> Self {
        let previous = (previous_date != appointment.date).then_some(previous_date);
        Self::for_record(AppointmentEventKind::Updated, appointment, previous)
    }

    pub fn status_changed(appointment: &Appointment) -> Self {
        Self::for_record(AppointmentEventKind::StatusChanged, appointment, None)
    }

    pub fn deleted(appointment_id: &str, date: NaiveDate) -> Self {
        Self {
            kind: AppointmentEventKind::Deleted,
            appointment_id: appointment_id.to_string(),
            date,
            previous_date: None,
            appointment: None,
            at: Utc::now(),
        }
    }

    fn for_record(kind: AppointmentEventKind, appointment: &Appointment, previous_date: Option<NaiveDate>) -> Self {
        Self {
            kind,
            appointment_id: appointment.id.clone(),
            date: appointment.date,
            previous_date,
            appointment: Some(appointment.clone()),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchFilter {
    Appointment(String),
    Date(NaiveDate),
    All,
}

impl WatchFilter {
    pub fn matches(&self, event: &AppointmentEvent) -> bool {
        match self {
            WatchFilter::Appointment(id) => event.appointment_id == *id,
            WatchFilter::Date(date) => event.date == *date || event.previous_date == Some(*date),
            WatchFilter::All => true,
        }
    }
}

/// In-process fan-out of appointment changes.
#[derive(Clone)]
pub struct AppointmentWatchService {
    sender: broadcast::Sender<AppointmentEvent>,
}

impl AppointmentWatchService {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn watch(&self, filter: WatchFilter) -> AppointmentSubscription {
        debug!("New appointment subscription: {:?}", filter);
        AppointmentSubscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Returns how many subscriptions the event was handed to.
    pub fn publish(&self, event: AppointmentEvent) -> usize {
        let kind = event.kind;
        let id = event.appointment_id.clone();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!("Published {} for appointment {} to {} subscribers", kind.as_str(), id, receivers);
                receivers
            }
            Err(_) => {
                debug!("No subscribers for {} on appointment {}", kind.as_str(), id);
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AppointmentWatchService {
    fn default() -> Self {
        Self::new()
    }
}

/// A live view of appointment changes matching one filter.
///
/// The underlying receiver is released when the subscription is dropped or
/// explicitly unsubscribed.
pub struct AppointmentSubscription {
    receiver: broadcast::Receiver<AppointmentEvent>,
    filter: WatchFilter,
}

impl AppointmentSubscription {
    pub fn filter(&self) -> &WatchFilter {
        &self.filter
    }

    /// Next matching event, or `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<AppointmentEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Appointment subscription lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        debug!("Unsubscribing from appointment changes: {:?}", self.filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, TimeSlot};
    use std::time::Duration;
    use tokio::time::timeout;

    fn appointment(id: &str, day: u32) -> Appointment {
        Appointment {
            id: id.to_string(),
            patient_id: "patient-1".to_string(),
            patient_name: Some("Jane Doe".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            time: TimeSlot::from_hm(9, 0).unwrap(),
            reason: "Check-up".to_string(),
            notes: None,
            status: AppointmentStatus::Scheduled,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscription_receives_only_matching_events() {
        let hub = AppointmentWatchService::new();
        let mut subscription = hub.watch(WatchFilter::Appointment("apt-2".to_string()));

        hub.publish(AppointmentEvent::created(&appointment("apt-1", 1)));
        hub.publish(AppointmentEvent::created(&appointment("apt-2", 1)));

        let event = timeout(Duration::from_secs(1), subscription.next()).await.unwrap().unwrap();
        assert_eq!(event.appointment_id, "apt-2");
        assert_eq!(event.kind, AppointmentEventKind::Created);
    }

    #[tokio::test]
    async fn test_date_filter_matches_previous_date_of_moved_appointment() {
        let hub = AppointmentWatchService::new();
        let first = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut subscription = hub.watch(WatchFilter::Date(first));

        hub.publish(AppointmentEvent::updated(&appointment("apt-1", 2), first));

        let event = timeout(Duration::from_secs(1), subscription.next()).await.unwrap().unwrap();
        assert_eq!(event.previous_date, Some(first));
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_receiver() {
        let hub = AppointmentWatchService::new();
        let subscription = hub.watch(WatchFilter::All);
        let dropped = hub.watch(WatchFilter::All);
        assert_eq!(hub.subscriber_count(), 2);

        subscription.unsubscribe();
        drop(dropped);

        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(AppointmentEvent::deleted("apt-1", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())), 0);
    }

    #[tokio::test]
    async fn test_lagged_subscription_keeps_going() {
        let hub = AppointmentWatchService::with_capacity(2);
        let mut subscription = hub.watch(WatchFilter::All);

        for i in 0..5 {
            hub.publish(AppointmentEvent::created(&appointment(&format!("apt-{}", i), 1)));
        }

        let event = timeout(Duration::from_secs(1), subscription.next()).await.unwrap().unwrap();
        assert_eq!(event.appointment_id, "apt-3");
    }

    #[tokio::test]
    async fn test_closed_hub_ends_subscription() {
        let hub = AppointmentWatchService::new();
        let mut subscription = hub.watch(WatchFilter::All);
        drop(hub);

        assert!(subscription.next().await.is_none());
    }
}
