// libs/exercise-cell/src/services/plans.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::User;
use shared_models::policy::{AccessScope, Role};

use crate::models::{
    CreatePlanItemRequest, CreatePlanRequest, ExerciseError, ExercisePlan, ExercisePlanItem,
    PlanStatus,
};

/// Exercise plans and their weekly items. Plans belong to the prescribing
/// physiotherapist; patients get read access to their own.
pub struct PlanService {
    supabase: Arc<SupabaseClient>,
}

impl PlanService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub async fn list_plans(
        &self,
        scope: &AccessScope,
        auth_token: &str,
    ) -> Result<Vec<ExercisePlan>, ExerciseError> {
        let mut parts = Vec::new();
        if let Some(filter) = scope.query_filter("patient_id", "physiotherapist_id") {
            parts.push(filter);
        }
        parts.push("order=start_date.desc".to_string());

        let path = format!("/rest/v1/exercise_plans?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))
    }

    pub async fn list_active_plans(
        &self,
        scope: &AccessScope,
        auth_token: &str,
    ) -> Result<Vec<ExercisePlan>, ExerciseError> {
        let mut parts = Vec::new();
        if let Some(filter) = scope.query_filter("patient_id", "physiotherapist_id") {
            parts.push(filter);
        }
        parts.push("status=eq.active".to_string());
        parts.push("order=start_date.desc".to_string());

        let path = format!("/rest/v1/exercise_plans?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))
    }

    pub async fn get_plan(
        &self,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<ExercisePlan, ExerciseError> {
        let path = format!("/rest/v1/exercise_plans?id=eq.{}", plan_id);
        let result: Vec<ExercisePlan> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(ExerciseError::NotFound("Plan"))
    }

    /// New plans start in draft and belong to the creating physiotherapist.
    /// Admins must act through a physiotherapist account here since the plan
    /// needs a prescriber.
    pub async fn create_plan(
        &self,
        request: CreatePlanRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<ExercisePlan, ExerciseError> {
        if actor.clinic_role() != Role::Physiotherapist {
            return Err(ExerciseError::Forbidden(
                "Only physiotherapists can create exercise plans".to_string(),
            ));
        }
        if request.name.trim().is_empty() {
            return Err(ExerciseError::ValidationError(
                "Plan name must not be empty".to_string(),
            ));
        }
        if let Some(end) = request.end_date {
            if end < request.start_date {
                return Err(ExerciseError::ValidationError(
                    "end_date must not be before start_date".to_string(),
                ));
            }
        }

        let physiotherapist_id = actor_uuid(actor)?;
        let now = Utc::now();
        let inserted: Vec<ExercisePlan> = self
            .supabase
            .insert_returning(
                "exercise_plans",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "name": request.name,
                    "description": request.description,
                    "patient_id": request.patient_id,
                    "physiotherapist_id": physiotherapist_id,
                    "start_date": request.start_date.to_string(),
                    "end_date": request.end_date.map(|d| d.to_string()),
                    "status": PlanStatus::Draft,
                    "created_at": now.to_rfc3339(),
                    "updated_at": now.to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))?;

        let plan = inserted
            .into_iter()
            .next()
            .ok_or_else(|| ExerciseError::DatabaseError("Insert returned no row".to_string()))?;

        info!("Created exercise plan {} for patient {}", plan.id, plan.patient_id);
        Ok(plan)
    }

    pub async fn activate_plan(
        &self,
        plan_id: Uuid,
        actor: &User,
        auth_token: &str,
    ) -> Result<ExercisePlan, ExerciseError> {
        self.transition_plan(plan_id, PlanStatus::Active, actor, auth_token)
            .await
    }

    pub async fn complete_plan(
        &self,
        plan_id: Uuid,
        actor: &User,
        auth_token: &str,
    ) -> Result<ExercisePlan, ExerciseError> {
        self.transition_plan(plan_id, PlanStatus::Completed, actor, auth_token)
            .await
    }

    async fn transition_plan(
        &self,
        plan_id: Uuid,
        next: PlanStatus,
        actor: &User,
        auth_token: &str,
    ) -> Result<ExercisePlan, ExerciseError> {
        let plan = self.get_plan(plan_id, auth_token).await?;
        self.ensure_plan_owner(&plan, actor)?;

        let allowed = match plan.status {
            PlanStatus::Draft => matches!(next, PlanStatus::Active | PlanStatus::Cancelled),
            PlanStatus::Active => matches!(next, PlanStatus::Completed | PlanStatus::Cancelled),
            PlanStatus::Completed | PlanStatus::Cancelled => false,
        };
        if !allowed {
            return Err(ExerciseError::InvalidPlanTransition {
                from: plan.status,
                to: next,
            });
        }

        let updated: Vec<ExercisePlan> = self
            .supabase
            .update_returning(
                "exercise_plans",
                &format!("id=eq.{}", plan_id),
                auth_token,
                json!({
                    "status": next,
                    "updated_at": Utc::now().to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(ExerciseError::NotFound("Plan"))
    }

    pub async fn list_plan_items(
        &self,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<ExercisePlanItem>, ExerciseError> {
        let path = format!(
            "/rest/v1/exercise_plan_items?plan_id=eq.{}&order=week_number.asc,day_of_week.asc",
            plan_id
        );
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))
    }

    pub async fn add_plan_item(
        &self,
        plan_id: Uuid,
        request: CreatePlanItemRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<ExercisePlanItem, ExerciseError> {
        if !(0..=6).contains(&request.day_of_week) {
            return Err(ExerciseError::ValidationError(
                "day_of_week must be between 0 and 6".to_string(),
            ));
        }
        if request.week_number < 1 {
            return Err(ExerciseError::ValidationError(
                "week_number must be at least 1".to_string(),
            ));
        }

        let plan = self.get_plan(plan_id, auth_token).await?;
        self.ensure_plan_owner(&plan, actor)?;

        let inserted: Vec<ExercisePlanItem> = self
            .supabase
            .insert_returning(
                "exercise_plan_items",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "plan_id": plan_id,
                    "exercise_id": request.exercise_id,
                    "day_of_week": request.day_of_week,
                    "week_number": request.week_number,
                    "custom_repetitions": request.custom_repetitions,
                    "custom_sets": request.custom_sets,
                    "notes": request.notes,
                }),
            )
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))?;

        inserted
            .into_iter()
            .next()
            .ok_or_else(|| ExerciseError::DatabaseError("Insert returned no row".to_string()))
    }

    fn ensure_plan_owner(&self, plan: &ExercisePlan, actor: &User) -> Result<(), ExerciseError> {
        if actor.is_admin() {
            return Ok(());
        }
        if actor.clinic_role() == Role::Physiotherapist
            && actor_uuid(actor)? == plan.physiotherapist_id
        {
            return Ok(());
        }
        Err(ExerciseError::Forbidden(
            "Only the prescribing physiotherapist can modify this plan".to_string(),
        ))
    }
}

pub(crate) fn actor_uuid(user: &User) -> Result<Uuid, ExerciseError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| ExerciseError::ValidationError("Invalid user id".to_string()))
}
