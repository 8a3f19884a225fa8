// libs/appointment-cell/src/services/conflict.rs
use chrono::{NaiveDate, NaiveTime};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{Appointment, AppointmentError, ConflictCheckResponse};

/// Detects double-bookings for a physiotherapist on a given date.
///
/// This pre-check gives callers a useful error body; the exclusion constraint
/// on the appointments table remains the authoritative guard under
/// concurrency (see the booking service).
pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn check_conflicts(
        &self,
        physiotherapist_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        debug!(
            "Checking conflicts for physiotherapist {} on {} from {} to {}",
            physiotherapist_id, date, start_time, end_time
        );

        let existing = self
            .active_appointments_on_date(physiotherapist_id, date, exclude_appointment_id, auth_token)
            .await?;

        let conflicting_appointments: Vec<Appointment> = existing
            .into_iter()
            .filter(|apt| intervals_overlap(apt.start_time, apt.end_time, start_time, end_time))
            .collect();

        let has_conflict = !conflicting_appointments.is_empty();
        if has_conflict {
            warn!(
                "Conflict detected for physiotherapist {} - {} overlapping appointments",
                physiotherapist_id,
                conflicting_appointments.len()
            );
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
        })
    }

    /// Appointments that still occupy the calendar slot: scheduled, confirmed
    /// or in progress.
    async fn active_appointments_on_date(
        &self,
        physiotherapist_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = vec![
            format!("physiotherapist_id=eq.{}", physiotherapist_id),
            format!("date=eq.{}", date),
            "status=in.(scheduled,confirmed,in_progress)".to_string(),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=start_time.asc",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })
    }
}

/// Half-open interval overlap: [a_start, a_end) intersects [b_start, b_end).
pub fn intervals_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && b_start < a_end
}
