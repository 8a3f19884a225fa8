// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, warn};

use crate::models::{
    AppointmentError, AppointmentStatus, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
};

/// Owns the appointment state machine and timing rules. Pure logic, no IO.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed.
    pub fn validate_status_transition(
        &self,
        current: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current, next);

        if !self.valid_transitions(current).contains(&next) {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current,
                to: next,
            });
        }

        Ok(())
    }

    /// All valid next statuses for a given current status.
    pub fn valid_transitions(&self, current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InProgress => {
                vec![AppointmentStatus::Completed, AppointmentStatus::Cancelled]
            }
            // Terminal states.
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow
            | AppointmentStatus::Rescheduled => vec![],
        }
    }

    /// Timing invariants checked at booking and reschedule time.
    pub fn validate_timing(
        &self,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if end_time <= start_time {
            return Err(AppointmentError::InvalidTime(
                "end_time must be after start_time".to_string(),
            ));
        }

        let duration = (end_time - start_time).num_minutes();
        if duration < MIN_DURATION_MINUTES {
            return Err(AppointmentError::InvalidTime(format!(
                "Appointments must be at least {} minutes",
                MIN_DURATION_MINUTES
            )));
        }
        if duration > MAX_DURATION_MINUTES {
            return Err(AppointmentError::InvalidTime(format!(
                "Appointments cannot exceed {} minutes",
                MAX_DURATION_MINUTES
            )));
        }

        let start = date.and_time(start_time).and_utc();
        if start <= now {
            return Err(AppointmentError::InvalidTime(
                "Appointments must be scheduled for a future time".to_string(),
            ));
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
    use chrono::Duration;

    fn svc() -> AppointmentLifecycleService {
        AppointmentLifecycleService::new()
    }

    #[test]
    fn scheduled_can_confirm_cancel_or_no_show() {
        let s = svc();
        assert!(s
            .validate_status_transition(AppointmentStatus::Scheduled, AppointmentStatus::Confirmed)
            .is_ok());
        assert!(s
            .validate_status_transition(AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
            .is_ok());
        assert!(s
            .validate_status_transition(AppointmentStatus::Scheduled, AppointmentStatus::NoShow)
            .is_ok());
        assert_matches!(
            s.validate_status_transition(
                AppointmentStatus::Scheduled,
                AppointmentStatus::InProgress
            ),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn confirm_only_from_scheduled() {
        let s = svc();
        for from in [
            AppointmentStatus::Confirmed,
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ] {
            assert_matches!(
                s.validate_status_transition(from, AppointmentStatus::Confirmed),
                Err(AppointmentError::InvalidStatusTransition { .. })
            );
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        let s = svc();
        for terminal in [
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
            AppointmentStatus::Rescheduled,
        ] {
            assert!(s.valid_transitions(terminal).is_empty());
        }
    }

    #[test]
    fn rejects_reversed_interval() {
        let s = svc();
        let now = Utc::now();
        let date = (now + Duration::days(3)).date_naive();
        let err = s.validate_timing(
            date,
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            now,
        );
        assert_matches!(err, Err(AppointmentError::InvalidTime(_)));
    }

    #[test]
    fn enforces_duration_bounds() {
        let s = svc();
        let now = Utc::now();
        let date = (now + Duration::days(3)).date_naive();
        let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();

        // 10 minutes: too short.
        assert_matches!(
            s.validate_timing(date, ten, NaiveTime::from_hms_opt(10, 10, 0).unwrap(), now),
            Err(AppointmentError::InvalidTime(_))
        );
        // 5 hours: too long.
        assert_matches!(
            s.validate_timing(date, ten, NaiveTime::from_hms_opt(15, 0, 0).unwrap(), now),
            Err(AppointmentError::InvalidTime(_))
        );
        // 15 minutes and 4 hours sit exactly on the bounds.
        assert!(s
            .validate_timing(date, ten, NaiveTime::from_hms_opt(10, 15, 0).unwrap(), now)
            .is_ok());
        assert!(s
            .validate_timing(date, ten, NaiveTime::from_hms_opt(14, 0, 0).unwrap(), now)
            .is_ok());
    }

    #[test]
    fn rejects_past_dates() {
        let s = svc();
        let now = Utc::now();
        let yesterday = (now - Duration::days(1)).date_naive();
        assert_matches!(
            s.validate_timing(
                yesterday,
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                now
            ),
            Err(AppointmentError::InvalidTime(_))
        );
    }
}
