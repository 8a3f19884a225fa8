// libs/exercise-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CATALOG MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        };
        write!(f, "{}", s)
    }
}

/// Catalog entry. Prescription details (`repetitions`, `sets`) are defaults a
/// plan item may override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category_id: Uuid,
    pub difficulty: Difficulty,
    pub duration_minutes: Option<i32>,
    pub repetitions: Option<i32>,
    pub sets: Option<i32>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// PLAN MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Active => "active",
            PlanStatus::Completed => "completed",
            PlanStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExercisePlan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub patient_id: Uuid,
    pub physiotherapist_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One exercise slot inside a plan week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExercisePlanItem {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub exercise_id: Uuid,
    pub day_of_week: i16,
    pub week_number: i16,
    pub custom_repetitions: Option<i32>,
    pub custom_sets: Option<i32>,
    pub notes: Option<String>,
}

// ==============================================================================
// PROGRESS MODELS
// ==============================================================================

/// Patient-submitted completion record. One per (patient, item, date).
/// Carries the prescribing physiotherapist denormalized from the plan so
/// clinician-scoped queries stay single-table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseProgress {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub physiotherapist_id: Uuid,
    pub plan_item_id: Uuid,
    pub date_completed: NaiveDate,
    pub completed_repetitions: Option<i32>,
    pub completed_sets: Option<i32>,
    pub difficulty_rating: i16,
    pub pain_level: i16,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressStats {
    pub total_sessions: usize,
    pub sessions_this_week: usize,
    pub average_difficulty: f64,
    pub average_pain_level: f64,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateExerciseRequest {
    pub name: String,
    pub description: String,
    pub category_id: Uuid,
    pub difficulty: Difficulty,
    pub duration_minutes: Option<i32>,
    pub repetitions: Option<i32>,
    pub sets: Option<i32>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateExerciseRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub difficulty: Option<Difficulty>,
    pub duration_minutes: Option<i32>,
    pub repetitions: Option<i32>,
    pub sets: Option<i32>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExerciseListQuery {
    pub category_id: Option<Uuid>,
    pub difficulty: Option<Difficulty>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub description: Option<String>,
    pub patient_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlanItemRequest {
    pub exercise_id: Uuid,
    pub day_of_week: i16,
    pub week_number: i16,
    pub custom_repetitions: Option<i32>,
    pub custom_sets: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogProgressRequest {
    pub plan_item_id: Uuid,
    pub date_completed: NaiveDate,
    pub completed_repetitions: Option<i32>,
    pub completed_sets: Option<i32>,
    pub difficulty_rating: i16,
    pub pain_level: i16,
    pub notes: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExerciseError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Progress already logged for this exercise on this date")]
    DuplicateProgress,

    #[error("Cannot move plan from {from} to {to}")]
    InvalidPlanTransition { from: PlanStatus, to: PlanStatus },

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
