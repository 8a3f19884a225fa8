// libs/auth-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_FAILED_LOGINS: i32 = 5;
pub const LOCKOUT_MINUTES: i64 = 30;

/// Clinic-side profile row, one per auth user. Carries the role and the
/// failed-login bookkeeping the lockout policy needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }
}

/// Profile as returned to clients. Never exposes the lockout bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<Profile> for ProfileView {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            email: p.email,
            first_name: p.first_name,
            last_name: p.last_name,
            phone: p.phone,
            role: p.role,
            created_at: p.created_at,
        }
    }
}

/// Patient-side medical details, one row per patient account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub medical_history: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
}

/// Clinician credentials, one row per physiotherapist account. Rows are
/// created empty when staff accounts are provisioned and filled in later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysiotherapistProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub license_number: Option<String>,
    pub specializations: Vec<String>,
    pub years_of_experience: i32,
    pub education: Option<String>,
    pub certifications: Option<String>,
    pub consultation_fee: Option<f64>,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RoleProfile {
    Patient(PatientProfile),
    Physiotherapist(PhysiotherapistProfile),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePatientProfileRequest {
    pub medical_history: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePhysiotherapistProfileRequest {
    pub license_number: Option<String>,
    pub specializations: Option<Vec<String>>,
    pub years_of_experience: Option<i32>,
    pub education: Option<String>,
    pub certifications: Option<String>,
    pub consultation_fee: Option<f64>,
    pub is_available: Option<bool>,
}

/// GoTrue password-grant session.
#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub user: SupabaseAuthUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseAuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub user: ProfileView,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account locked until {0}")]
    AccountLocked(DateTime<Utc>),

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Profile not found")]
    ProfileNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Auth provider error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
