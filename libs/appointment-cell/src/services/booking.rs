// libs/appointment-cell/src/services/booking.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};
use shared_models::auth::User;
use shared_models::policy::{AccessScope, Role};

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStats, AppointmentStatus,
    BookAppointmentRequest, CancelAppointmentRequest, CompleteAppointmentRequest,
    ConflictCheckResponse, UpdateAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    conflicts: ConflictDetectionService,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            conflicts: ConflictDetectionService::new(supabase.clone()),
            lifecycle: AppointmentLifecycleService::new(),
            supabase,
        }
    }

    /// Book an appointment. Patients always book for themselves; staff must
    /// name the patient. The read-side conflict pre-check produces the
    /// friendly error; the table's exclusion constraint (surfaced as a 409 on
    /// insert) is what actually closes the concurrent-booking race.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = match actor.clinic_role() {
            Role::Patient => actor_uuid(actor)?,
            _ => request.patient_id.ok_or_else(|| {
                AppointmentError::ValidationError(
                    "patient_id is required when booking on behalf of a patient".to_string(),
                )
            })?,
        };

        if request.reason.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "reason must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        self.lifecycle
            .validate_timing(request.date, request.start_time, request.end_time, now)?;

        let conflict_check = self
            .conflicts
            .check_conflicts(
                request.physiotherapist_id,
                request.date,
                request.start_time,
                request.end_time,
                None,
                auth_token,
            )
            .await?;
        if conflict_check.has_conflict {
            return Err(AppointmentError::ConflictDetected);
        }

        let appointment_id = Uuid::new_v4();
        let body = json!({
            "id": appointment_id,
            "patient_id": patient_id,
            "physiotherapist_id": request.physiotherapist_id,
            "date": request.date.to_string(),
            "start_time": request.start_time.to_string(),
            "end_time": request.end_time.to_string(),
            "status": AppointmentStatus::Scheduled,
            "appointment_type": request.appointment_type,
            "reason": request.reason,
            "notes": request.notes,
            "cost": request.cost,
            "payment_status": "pending",
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let inserted: Vec<Appointment> = self
            .supabase
            .insert_returning("appointments", auth_token, body)
            .await
            .map_err(|e| match e {
                // Exclusion constraint fired: another booking won the slot.
                DbError::Conflict(_) => {
                    warn!(
                        "Concurrent booking lost the slot for physiotherapist {}",
                        request.physiotherapist_id
                    );
                    AppointmentError::ConflictDetected
                }
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        let appointment = inserted
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no row".to_string()))?;

        info!(
            "Booked appointment {} for patient {} with physiotherapist {}",
            appointment.id, patient_id, request.physiotherapist_id
        );
        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
        scope: &AccessScope,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut parts = Vec::new();

        if let Some(filter) = scope.query_filter("patient_id", "physiotherapist_id") {
            parts.push(filter);
        }
        if let Some(patient_id) = query.patient_id {
            parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(physio_id) = query.physiotherapist_id {
            parts.push(format!("physiotherapist_id=eq.{}", physio_id));
        }
        if let Some(status) = query.status {
            parts.push(format!("status=eq.{}", status));
        }
        if let Some(appointment_type) = query.appointment_type {
            parts.push(format!("appointment_type=eq.{}", appointment_type));
        }
        if let Some(date) = query.date {
            parts.push(format!("date=eq.{}", date));
        }
        if let Some(from) = query.from_date {
            parts.push(format!("date=gte.{}", from));
        }
        if let Some(to) = query.to_date {
            parts.push(format!("date=lte.{}", to));
        }

        parts.push("order=date.asc,start_time.asc".to_string());
        parts.push(format!("limit={}", query.limit.unwrap_or(50)));
        parts.push(format!("offset={}", query.offset.unwrap_or(0)));

        let path = format!("/rest/v1/appointments?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    pub async fn get_upcoming_appointments(
        &self,
        scope: &AccessScope,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut parts = Vec::new();
        if let Some(filter) = scope.query_filter("patient_id", "physiotherapist_id") {
            parts.push(filter);
        }
        parts.push(format!("date=gte.{}", Utc::now().date_naive()));
        parts.push("status=in.(scheduled,confirmed)".to_string());
        parts.push("order=date.asc,start_time.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    pub async fn get_today_appointments(
        &self,
        scope: &AccessScope,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut parts = Vec::new();
        if let Some(filter) = scope.query_filter("patient_id", "physiotherapist_id") {
            parts.push(filter);
        }
        parts.push(format!("date=eq.{}", Utc::now().date_naive()));
        parts.push("order=start_time.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Role-scoped aggregate counts, computed over the caller's visible rows.
    pub async fn get_appointment_stats(
        &self,
        scope: &AccessScope,
        auth_token: &str,
    ) -> Result<AppointmentStats, AppointmentError> {
        let mut parts = Vec::new();
        if let Some(filter) = scope.query_filter("patient_id", "physiotherapist_id") {
            parts.push(filter);
        }
        parts.push("order=date.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", parts.join("&"));
        let appointments: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let now = Utc::now();
        let completed: Vec<&Appointment> = appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .collect();
        let average_duration_minutes = if completed.is_empty() {
            0.0
        } else {
            completed.iter().map(|a| a.duration_minutes() as f64).sum::<f64>()
                / completed.len() as f64
        };

        Ok(AppointmentStats {
            total: appointments.len(),
            completed: completed.len(),
            cancelled: appointments
                .iter()
                .filter(|a| a.status == AppointmentStatus::Cancelled)
                .count(),
            no_show: appointments
                .iter()
                .filter(|a| a.status == AppointmentStatus::NoShow)
                .count(),
            upcoming: appointments.iter().filter(|a| a.is_upcoming(now)).count(),
            average_duration_minutes,
        })
    }

    pub async fn check_conflicts(
        &self,
        physiotherapist_id: Uuid,
        date: chrono::NaiveDate,
        start_time: chrono::NaiveTime,
        end_time: chrono::NaiveTime,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        self.conflicts
            .check_conflicts(
                physiotherapist_id,
                date,
                start_time,
                end_time,
                exclude_appointment_id,
                auth_token,
            )
            .await
    }

    /// Update mutable fields; moving the slot re-runs the timing and conflict
    /// validation with the appointment itself excluded.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        if appointment.status.is_terminal() {
            return Err(AppointmentError::ValidationError(format!(
                "Cannot modify an appointment in status {}",
                appointment.status
            )));
        }

        let mut update = Map::new();

        if request.reschedules() {
            let date = request.date.unwrap_or(appointment.date);
            let start_time = request.start_time.unwrap_or(appointment.start_time);
            let end_time = request.end_time.unwrap_or(appointment.end_time);

            self.lifecycle
                .validate_timing(date, start_time, end_time, Utc::now())?;

            let conflict_check = self
                .conflicts
                .check_conflicts(
                    appointment.physiotherapist_id,
                    date,
                    start_time,
                    end_time,
                    Some(appointment_id),
                    auth_token,
                )
                .await?;
            if conflict_check.has_conflict {
                return Err(AppointmentError::ConflictDetected);
            }

            update.insert("date".to_string(), json!(date.to_string()));
            update.insert("start_time".to_string(), json!(start_time.to_string()));
            update.insert("end_time".to_string(), json!(end_time.to_string()));
        }

        if let Some(reason) = request.reason {
            update.insert("reason".to_string(), json!(reason));
        }
        if let Some(notes) = request.notes {
            update.insert("notes".to_string(), json!(notes));
        }
        if let Some(payment_status) = request.payment_status {
            update.insert("payment_status".to_string(), json!(payment_status));
        }

        self.apply_update(appointment_id, update, auth_token).await
    }

    /// Confirm a scheduled appointment.
    pub async fn confirm_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Confirmed)?;

        let mut update = Map::new();
        update.insert("status".to_string(), json!(AppointmentStatus::Confirmed));
        self.apply_update(appointment_id, update, auth_token).await
    }

    /// Cancel an appointment. Patients are held to the 24-hour notice window;
    /// physiotherapists and admins are not.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

        if actor.clinic_role() == Role::Patient && !appointment.can_be_cancelled(Utc::now()) {
            return Err(AppointmentError::CancellationWindowExpired);
        }

        let mut update = Map::new();
        update.insert("status".to_string(), json!(AppointmentStatus::Cancelled));
        update.insert("cancelled_by".to_string(), json!(actor.id));
        update.insert(
            "cancellation_reason".to_string(),
            json!(request.reason.unwrap_or_default()),
        );
        self.apply_update(appointment_id, update, auth_token).await
    }

    /// Complete an appointment, attaching the clinician's treatment record.
    /// Only the assigned physiotherapist (or an admin) may do this.
    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        request: CompleteAppointmentRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        let is_assigned_physio = actor.clinic_role() == Role::Physiotherapist
            && actor_uuid(actor)? == appointment.physiotherapist_id;
        if !is_assigned_physio && !actor.is_admin() {
            return Err(AppointmentError::Forbidden(
                "Only the assigned physiotherapist can complete appointments".to_string(),
            ));
        }

        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Completed)?;

        let mut update = Map::new();
        update.insert("status".to_string(), json!(AppointmentStatus::Completed));
        if let Some(treatment_plan) = request.treatment_plan {
            update.insert("treatment_plan".to_string(), json!(treatment_plan));
        }
        if let Some(prescription) = request.prescription {
            update.insert("prescription".to_string(), json!(prescription));
        }
        if let Some(notes) = request.notes {
            update.insert("notes".to_string(), json!(notes));
        }
        self.apply_update(appointment_id, update, auth_token).await
    }

    async fn apply_update(
        &self,
        appointment_id: Uuid,
        mut update: Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        debug!("Updating appointment {}", appointment_id);

        let updated: Vec<Appointment> = self
            .supabase
            .update_returning(
                "appointments",
                &format!("id=eq.{}", appointment_id),
                auth_token,
                Value::Object(update),
            )
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => AppointmentError::ConflictDetected,
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        updated.into_iter().next().ok_or(AppointmentError::NotFound)
    }
}

pub(crate) fn actor_uuid(user: &User) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppointmentError::ValidationError("Invalid user id".to_string()))
}
