// libs/appointment-cell/src/services/feedback.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentFeedback, AppointmentStatus, FeedbackRequest,
};
use crate::services::booking::actor_uuid;

/// Post-session feedback: one submission per completed appointment, written
/// by the patient who attended it.
pub struct FeedbackService {
    supabase: Arc<SupabaseClient>,
}

impl FeedbackService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub async fn submit_feedback(
        &self,
        appointment_id: Uuid,
        request: FeedbackRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<AppointmentFeedback, AppointmentError> {
        if request.ratings().iter().any(|r| !(1..=5).contains(r)) {
            return Err(AppointmentError::ValidationError(
                "Ratings must be between 1 and 5".to_string(),
            ));
        }

        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        if appointment.patient_id != actor_uuid(actor)? {
            return Err(AppointmentError::Forbidden(
                "Only the patient who attended can leave feedback".to_string(),
            ));
        }
        if appointment.status != AppointmentStatus::Completed {
            return Err(AppointmentError::AppointmentNotCompleted);
        }
        if self
            .get_feedback(appointment_id, auth_token)
            .await?
            .is_some()
        {
            return Err(AppointmentError::FeedbackExists);
        }

        let body = json!({
            "id": Uuid::new_v4(),
            "appointment_id": appointment_id,
            "overall_rating": request.overall_rating,
            "professionalism_rating": request.professionalism_rating,
            "communication_rating": request.communication_rating,
            "effectiveness_rating": request.effectiveness_rating,
            "comments": request.comments,
            "created_at": Utc::now().to_rfc3339(),
        });

        let inserted: Vec<AppointmentFeedback> = self
            .supabase
            .insert_returning("appointment_feedback", auth_token, body)
            .await
            .map_err(|e| match e {
                // Unique index on appointment_id: someone beat us to it.
                DbError::Conflict(_) => AppointmentError::FeedbackExists,
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        let feedback = inserted
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no row".to_string()))?;

        info!("Feedback recorded for appointment {}", appointment_id);
        Ok(feedback)
    }

    pub async fn get_feedback(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<AppointmentFeedback>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointment_feedback?appointment_id=eq.{}",
            appointment_id
        );
        let result: Vec<AppointmentFeedback> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(result.into_iter().next())
    }

    async fn get_appointment(
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
}
