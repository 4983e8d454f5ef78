// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, info, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        let valid_transitions = self.get_valid_transitions(current_status);

        if !valid_transitions.contains(new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: *current_status,
                to: *new_status,
            });
        }

        info!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    /// Get all valid next statuses for a given current status.
    /// Any open appointment may be completed directly.
    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::CheckedIn,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::CheckedIn => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::InProgress => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Cancelled appointments are read-only.
    pub fn ensure_editable(&self, appointment: &Appointment) -> Result<(), AppointmentError> {
        if appointment.status == AppointmentStatus::Cancelled {
            warn!("Rejected edit of cancelled appointment {}", appointment.id);
            return Err(AppointmentError::AppointmentLocked);
        }
        Ok(())
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_forward_chain_is_allowed() {
        let service = AppointmentLifecycleService::new();
        let chain = [
            AppointmentStatus::Scheduled,
            AppointmentStatus::CheckedIn,
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
        ];

        for pair in chain.windows(2) {
            assert!(service.validate_status_transition(&pair[0], &pair[1]).is_ok());
        }
    }

    #[test]
    fn test_cancel_allowed_until_completion() {
        let service = AppointmentLifecycleService::new();
        for status in [AppointmentStatus::Scheduled, AppointmentStatus::CheckedIn, AppointmentStatus::InProgress] {
            assert!(service.validate_status_transition(&status, &AppointmentStatus::Cancelled).is_ok());
        }
        assert_matches!(
            service.validate_status_transition(&AppointmentStatus::Completed, &AppointmentStatus::Cancelled),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn test_open_appointments_complete_in_one_step() {
        let service = AppointmentLifecycleService::new();
        for status in [AppointmentStatus::Scheduled, AppointmentStatus::CheckedIn, AppointmentStatus::InProgress] {
            assert!(service.validate_status_transition(&status, &AppointmentStatus::Completed).is_ok());
        }
    }

    #[test]
    fn test_skips_and_reversals_rejected() {
        let service = AppointmentLifecycleService::new();

        assert_matches!(
            service.validate_status_transition(&AppointmentStatus::Scheduled, &AppointmentStatus::InProgress),
            Err(AppointmentError::InvalidStatusTransition {
                from: AppointmentStatus::Scheduled,
                to: AppointmentStatus::InProgress
            })
        );
        assert!(service
            .validate_status_transition(&AppointmentStatus::InProgress, &AppointmentStatus::CheckedIn)
            .is_err());
        assert!(service
            .validate_status_transition(&AppointmentStatus::Cancelled, &AppointmentStatus::Scheduled)
            .is_err());
        assert!(service
            .validate_status_transition(&AppointmentStatus::Scheduled, &AppointmentStatus::Scheduled)
            .is_err());
    }

    #[test]
    fn test_terminal_states_have_no_transitions() {
        let service = AppointmentLifecycleService::new();
        assert!(service.get_valid_transitions(&AppointmentStatus::Completed).is_empty());
        assert!(service.get_valid_transitions(&AppointmentStatus::Cancelled).is_empty());
    }
}
