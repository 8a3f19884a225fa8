// libs/exercise-cell/src/services/progress.rs
use chrono::{Datelike, Duration, Utc};
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};
use shared_models::auth::User;
use shared_models::policy::AccessScope;

use crate::models::{ExerciseError, ExerciseProgress, LogProgressRequest, ProgressStats};
use crate::services::plans::actor_uuid;

/// Patient progress log over plan items.
pub struct ProgressService {
    supabase: Arc<SupabaseClient>,
}

impl ProgressService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    /// Log one completion. Unique on (patient, item, date): the pre-check
    /// gives the friendly error, the unique index has the final word.
    pub async fn log_progress(
        &self,
        request: LogProgressRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<ExerciseProgress, ExerciseError> {
        if !(1..=5).contains(&request.difficulty_rating) {
            return Err(ExerciseError::ValidationError(
                "difficulty_rating must be between 1 and 5".to_string(),
            ));
        }
        if !(0..=4).contains(&request.pain_level) {
            return Err(ExerciseError::ValidationError(
                "pain_level must be between 0 and 4".to_string(),
            ));
        }
        if request.date_completed > Utc::now().date_naive() {
            return Err(ExerciseError::ValidationError(
                "date_completed cannot be in the future".to_string(),
            ));
        }

        let patient_id = actor_uuid(actor)?;

        // Resolve the prescribing physiotherapist through the plan item. Also
        // confirms the item actually exists.
        let items: Vec<crate::models::ExercisePlanItem> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/exercise_plan_items?id=eq.{}", request.plan_item_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))?;
        let item = items
            .into_iter()
            .next()
            .ok_or(ExerciseError::NotFound("Plan item"))?;
        let plans: Vec<crate::models::ExercisePlan> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/exercise_plans?id=eq.{}", item.plan_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))?;
        let plan = plans.into_iter().next().ok_or(ExerciseError::NotFound("Plan"))?;

        if plan.patient_id != patient_id {
            return Err(ExerciseError::Forbidden(
                "This plan item belongs to another patient".to_string(),
            ));
        }

        let existing: Vec<ExerciseProgress> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/exercise_progress?patient_id=eq.{}&plan_item_id=eq.{}&date_completed=eq.{}",
                    patient_id, request.plan_item_id, request.date_completed
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))?;
        if !existing.is_empty() {
            return Err(ExerciseError::DuplicateProgress);
        }

        let inserted: Vec<ExerciseProgress> = self
            .supabase
            .insert_returning(
                "exercise_progress",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "patient_id": patient_id,
                    "physiotherapist_id": plan.physiotherapist_id,
                    "plan_item_id": request.plan_item_id,
                    "date_completed": request.date_completed.to_string(),
                    "completed_repetitions": request.completed_repetitions,
                    "completed_sets": request.completed_sets,
                    "difficulty_rating": request.difficulty_rating,
                    "pain_level": request.pain_level,
                    "notes": request.notes,
                    "created_at": Utc::now().to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => ExerciseError::DuplicateProgress,
                other => ExerciseError::DatabaseError(other.to_string()),
            })?;

        let progress = inserted
            .into_iter()
            .next()
            .ok_or_else(|| ExerciseError::DatabaseError("Insert returned no row".to_string()))?;

        info!(
            "Progress logged for patient {} on item {}",
            patient_id, request.plan_item_id
        );
        Ok(progress)
    }

    pub async fn list_progress(
        &self,
        scope: &AccessScope,
        auth_token: &str,
    ) -> Result<Vec<ExerciseProgress>, ExerciseError> {
        let mut parts = Vec::new();
        if let Some(filter) = scope.query_filter("patient_id", "physiotherapist_id") {
            parts.push(filter);
        }
        parts.push("order=date_completed.desc".to_string());

        let path = format!("/rest/v1/exercise_progress?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))
    }

    /// Aggregates over the caller's visible progress rows. "This week" starts
    /// on Monday.
    pub async fn get_stats(
        &self,
        scope: &AccessScope,
        auth_token: &str,
    ) -> Result<ProgressStats, ExerciseError> {
        let rows = self.list_progress(scope, auth_token).await?;

        let today = Utc::now().date_naive();
        let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);

        let sessions_this_week = rows
            .iter()
            .filter(|r| r.date_completed >= week_start)
            .count();

        let (average_difficulty, average_pain_level) = if rows.is_empty() {
            (0.0, 0.0)
        } else {
            let n = rows.len() as f64;
            (
                rows.iter().map(|r| r.difficulty_rating as f64).sum::<f64>() / n,
                rows.iter().map(|r| r.pain_level as f64).sum::<f64>() / n,
            )
        };

        Ok(ProgressStats {
            total_sessions: rows.len(),
            sessions_this_week,
            average_difficulty,
            average_pain_level,
        })
    }
}
