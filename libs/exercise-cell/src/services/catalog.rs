// libs/exercise-cell/src/services/catalog.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    CreateCategoryRequest, CreateExerciseRequest, Exercise, ExerciseCategory, ExerciseError,
    ExerciseListQuery, UpdateExerciseRequest,
};

/// Exercise catalog: categories and exercise definitions.
pub struct CatalogService {
    supabase: Arc<SupabaseClient>,
}

impl CatalogService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub async fn list_categories(
        &self,
        auth_token: &str,
    ) -> Result<Vec<ExerciseCategory>, ExerciseError> {
        self.supabase
            .request(
                Method::GET,
                "/rest/v1/exercise_categories?order=name.asc",
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))
    }

    pub async fn create_category(
        &self,
        request: CreateCategoryRequest,
        auth_token: &str,
    ) -> Result<ExerciseCategory, ExerciseError> {
        if request.name.trim().is_empty() {
            return Err(ExerciseError::ValidationError(
                "Category name must not be empty".to_string(),
            ));
        }

        let inserted: Vec<ExerciseCategory> = self
            .supabase
            .insert_returning(
                "exercise_categories",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "name": request.name,
                    "description": request.description,
                }),
            )
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))?;

        inserted
            .into_iter()
            .next()
            .ok_or_else(|| ExerciseError::DatabaseError("Insert returned no row".to_string()))
    }

    pub async fn list_exercises(
        &self,
        query: ExerciseListQuery,
        auth_token: &str,
    ) -> Result<Vec<Exercise>, ExerciseError> {
        let mut parts = Vec::new();
        if let Some(category_id) = query.category_id {
            parts.push(format!("category_id=eq.{}", category_id));
        }
        if let Some(difficulty) = query.difficulty {
            parts.push(format!("difficulty=eq.{}", difficulty));
        }
        parts.push("order=name.asc".to_string());
        parts.push(format!("limit={}", query.limit.unwrap_or(100)));
        parts.push(format!("offset={}", query.offset.unwrap_or(0)));

        let path = format!("/rest/v1/exercises?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))
    }

    pub async fn get_exercise(
        &self,
        exercise_id: Uuid,
        auth_token: &str,
    ) -> Result<Exercise, ExerciseError> {
        let path = format!("/rest/v1/exercises?id=eq.{}", exercise_id);
        let result: Vec<Exercise> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or(ExerciseError::NotFound("Exercise"))
    }

    pub async fn create_exercise(
        &self,
        request: CreateExerciseRequest,
        auth_token: &str,
    ) -> Result<Exercise, ExerciseError> {
        if request.name.trim().is_empty() {
            return Err(ExerciseError::ValidationError(
                "Exercise name must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let inserted: Vec<Exercise> = self
            .supabase
            .insert_returning(
                "exercises",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "name": request.name,
                    "description": request.description,
                    "category_id": request.category_id,
                    "difficulty": request.difficulty,
                    "duration_minutes": request.duration_minutes,
                    "repetitions": request.repetitions,
                    "sets": request.sets,
                    "video_url": request.video_url,
                    "image_url": request.image_url,
                    "created_at": now.to_rfc3339(),
                    "updated_at": now.to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))?;

        let exercise = inserted
            .into_iter()
            .next()
            .ok_or_else(|| ExerciseError::DatabaseError("Insert returned no row".to_string()))?;

        info!("Created exercise {} ({})", exercise.name, exercise.id);
        Ok(exercise)
    }

    pub async fn update_exercise(
        &self,
        exercise_id: Uuid,
        request: UpdateExerciseRequest,
        auth_token: &str,
    ) -> Result<Exercise, ExerciseError> {
        let mut update = Map::new();
        if let Some(name) = request.name {
            update.insert("name".to_string(), json!(name));
        }
        if let Some(description) = request.description {
            update.insert("description".to_string(), json!(description));
        }
        if let Some(category_id) = request.category_id {
            update.insert("category_id".to_string(), json!(category_id));
        }
        if let Some(difficulty) = request.difficulty {
            update.insert("difficulty".to_string(), json!(difficulty));
        }
        if let Some(duration) = request.duration_minutes {
            update.insert("duration_minutes".to_string(), json!(duration));
        }
        if let Some(repetitions) = request.repetitions {
            update.insert("repetitions".to_string(), json!(repetitions));
        }
        if let Some(sets) = request.sets {
            update.insert("sets".to_string(), json!(sets));
        }
        if let Some(video_url) = request.video_url {
            update.insert("video_url".to_string(), json!(video_url));
        }
        if let Some(image_url) = request.image_url {
            update.insert("image_url".to_string(), json!(image_url));
        }
        if update.is_empty() {
            return Err(ExerciseError::ValidationError("Nothing to update".to_string()));
        }
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let updated: Vec<Exercise> = self
            .supabase
            .update_returning(
                "exercises",
                &format!("id=eq.{}", exercise_id),
                auth_token,
                Value::Object(update),
            )
            .await
            .map_err(|e| ExerciseError::DatabaseError(e.to_string()))?;

        updated
            .into_iter()
            .next()
            .ok_or(ExerciseError::NotFound("Exercise"))
    }
}
