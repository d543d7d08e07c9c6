// libs/appointment-cell/src/services/lifecycle.rs
use tracing::warn;

use crate::models::{AppointmentError, AppointmentStatus};

/// Allowed status transitions. Completed and cancelled are terminal.
pub fn can_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    use AppointmentStatus::*;
    match from {
        Requested => matches!(to, Confirmed | Cancelled),
        Pending => matches!(to, Confirmed | Cancelled | Rescheduled),
        Confirmed => matches!(to, InProgress | Completed | Cancelled | Rescheduled),
        InProgress => matches!(to, Completed | Cancelled),
        Rescheduled => matches!(to, Pending | Confirmed | Cancelled),
        Completed | Cancelled => false,
    }
}

pub fn validate_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), AppointmentError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        warn!("Rejected appointment transition {} -> {}", from, to);
        Err(AppointmentError::InvalidTransition { from, to })
    }
}

/// Home-care requests wait for a practitioner to pick them up; clinic
/// bookings start in the practitioner's pending list.
pub fn initial_status(is_home_care: bool) -> AppointmentStatus {
    if is_home_care {
        AppointmentStatus::Requested
    } else {
        AppointmentStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn terminal_states_allow_nothing() {
        for to in [Requested, Pending, Confirmed, InProgress, Completed, Cancelled, Rescheduled] {
            assert!(!can_transition(Completed, to));
            assert!(!can_transition(Cancelled, to));
        }
    }

    #[test]
    fn requested_only_confirms_or_cancels() {
        assert!(can_transition(Requested, Confirmed));
        assert!(can_transition(Requested, Cancelled));
        assert!(!can_transition(Requested, InProgress));
        assert!(!can_transition(Requested, Completed));
        assert!(!can_transition(Requested, Rescheduled));
    }

    #[test]
    fn confirmed_can_start_complete_cancel_or_reschedule() {
        assert!(can_transition(Confirmed, InProgress));
        assert!(can_transition(Confirmed, Completed));
        assert!(can_transition(Confirmed, Cancelled));
        assert!(can_transition(Confirmed, Rescheduled));
        assert!(!can_transition(Confirmed, Pending));
    }

    #[test]
    fn rescheduled_returns_to_the_booking_flow() {
        assert!(can_transition(Rescheduled, Pending));
        assert!(can_transition(Rescheduled, Confirmed));
        assert!(can_transition(Rescheduled, Cancelled));
        assert!(!can_transition(Rescheduled, Completed));
    }

    #[test]
    fn invalid_transition_is_an_error() {
        assert!(validate_transition(InProgress, Completed).is_ok());
        assert!(matches!(
            validate_transition(Completed, Cancelled),
            Err(AppointmentError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn initial_status_depends_on_modality() {
        assert_eq!(initial_status(true), Requested);
        assert_eq!(initial_status(false), Pending);
    }
}
