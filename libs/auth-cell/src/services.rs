// libs/auth-cell/src/services.rs
use chrono::{Duration, Utc};
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};

use crate::models::{
    AuthError, LoginRequest, LoginResponse, PatientProfile, PhysiotherapistProfile, Profile,
    ProfileView, RegisterRequest, RoleProfile, SupabaseSession, UpdatePatientProfileRequest,
    UpdatePhysiotherapistProfileRequest, UpdateProfileRequest, LOCKOUT_MINUTES,
    MAX_FAILED_LOGINS,
};

/// Account lifecycle against Supabase GoTrue plus the clinic `profiles` table.
pub struct AccountService {
    supabase: Arc<SupabaseClient>,
    anon_key: String,
}

impl AccountService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    /// Create the auth user, then its profile row. New registrations are
    /// always patients; staff accounts are provisioned by an admin.
    pub async fn register(&self, request: RegisterRequest) -> Result<ProfileView, AuthError> {
        if !request.email.contains('@') {
            return Err(AuthError::ValidationError("Invalid email address".to_string()));
        }
        if request.password.len() < 8 {
            return Err(AuthError::ValidationError(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
            return Err(AuthError::ValidationError("Name must not be empty".to_string()));
        }

        let session: SupabaseSession = self
            .supabase
            .request(
                Method::POST,
                "/auth/v1/signup",
                None,
                Some(json!({
                    "email": request.email,
                    "password": request.password,
                    "data": { "role": "patient" }
                })),
            )
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => AuthError::EmailTaken,
                DbError::Api { status: 422, .. } => AuthError::EmailTaken,
                other => AuthError::Provider(other.to_string()),
            })?;

        let now = Utc::now();
        let inserted: Vec<Profile> = self
            .supabase
            .insert_returning(
                "profiles",
                &session.access_token,
                json!({
                    "id": session.user.id,
                    "email": request.email,
                    "first_name": request.first_name,
                    "last_name": request.last_name,
                    "phone": request.phone,
                    "role": "patient",
                    "failed_login_attempts": 0,
                    "locked_until": null,
                    "created_at": now.to_rfc3339(),
                    "updated_at": now.to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        let profile = inserted
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::DatabaseError("Insert returned no row".to_string()))?;

        self.supabase
            .insert_returning::<PatientProfile>(
                "patient_profiles",
                &session.access_token,
                json!({
                    "id": Uuid::new_v4(),
                    "user_id": profile.id,
                }),
            )
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        info!("Registered new patient account {}", profile.id);
        Ok(profile.into())
    }

    /// Password login with the failed-attempt lockout policy: five failures
    /// lock the account for thirty minutes.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AuthError> {
        let profile = self.find_profile_by_email(&request.email).await?;

        let now = Utc::now();
        if let Some(profile) = &profile {
            if profile.is_locked(now) {
                // locked_until is Some here by is_locked.
                if let Some(until) = profile.locked_until {
                    warn!("Login attempt on locked account {}", profile.id);
                    return Err(AuthError::AccountLocked(until));
                }
            }
        }

        let grant = self
            .supabase
            .request::<SupabaseSession>(
                Method::POST,
                "/auth/v1/token?grant_type=password",
                None,
                Some(json!({
                    "email": request.email,
                    "password": request.password,
                })),
            )
            .await;

        let session = match grant {
            Ok(session) => session,
            Err(DbError::Transport(e)) => return Err(AuthError::Provider(e.to_string())),
            Err(_) => {
                if let Some(profile) = profile {
                    return Err(self.record_failed_login(&profile).await);
                }
                return Err(AuthError::InvalidCredentials);
            }
        };

        let profile = profile.ok_or(AuthError::ProfileNotFound)?;
        self.reset_lockout(&profile, &session.access_token).await?;

        Ok(LoginResponse {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_in: session.expires_in,
            user: profile.into(),
        })
    }

    pub async fn get_profile(
        &self,
        user_id: &str,
        auth_token: &str,
    ) -> Result<ProfileView, AuthError> {
        let path = format!("/rest/v1/profiles?id=eq.{}", user_id);
        let result: Vec<Profile> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .map(ProfileView::from)
            .ok_or(AuthError::ProfileNotFound)
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        request: UpdateProfileRequest,
        auth_token: &str,
    ) -> Result<ProfileView, AuthError> {
        let mut update = serde_json::Map::new();
        if let Some(first_name) = request.first_name {
            if first_name.trim().is_empty() {
                return Err(AuthError::ValidationError("Name must not be empty".to_string()));
            }
            update.insert("first_name".to_string(), json!(first_name));
        }
        if let Some(last_name) = request.last_name {
            if last_name.trim().is_empty() {
                return Err(AuthError::ValidationError("Name must not be empty".to_string()));
            }
            update.insert("last_name".to_string(), json!(last_name));
        }
        if let Some(phone) = request.phone {
            update.insert("phone".to_string(), json!(phone));
        }
        if update.is_empty() {
            return Err(AuthError::ValidationError("Nothing to update".to_string()));
        }
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let updated: Vec<Profile> = self
            .supabase
            .update_returning(
                "profiles",
                &format!("id=eq.{}", user_id),
                auth_token,
                serde_json::Value::Object(update),
            )
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        updated
            .into_iter()
            .next()
            .map(ProfileView::from)
            .ok_or(AuthError::ProfileNotFound)
    }

    /// Role-specific profile row for the user, if one exists. Admins carry
    /// neither kind.
    pub async fn get_role_profile(
        &self,
        user_id: &str,
        role: &str,
        auth_token: &str,
    ) -> Result<Option<RoleProfile>, AuthError> {
        match role {
            "patient" => {
                let rows: Vec<PatientProfile> = self
                    .supabase
                    .request(
                        Method::GET,
                        &format!("/rest/v1/patient_profiles?user_id=eq.{}", user_id),
                        Some(auth_token),
                        None,
                    )
                    .await
                    .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
                Ok(rows.into_iter().next().map(RoleProfile::Patient))
            }
            "physiotherapist" => {
                let rows: Vec<PhysiotherapistProfile> = self
                    .supabase
                    .request(
                        Method::GET,
                        &format!("/rest/v1/physiotherapist_profiles?user_id=eq.{}", user_id),
                        Some(auth_token),
                        None,
                    )
                    .await
                    .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
                Ok(rows.into_iter().next().map(RoleProfile::Physiotherapist))
            }
            _ => Ok(None),
        }
    }

    pub async fn update_patient_profile(
        &self,
        user_id: &str,
        request: UpdatePatientProfileRequest,
        auth_token: &str,
    ) -> Result<PatientProfile, AuthError> {
        let mut update = serde_json::Map::new();
        if let Some(medical_history) = request.medical_history {
            update.insert("medical_history".to_string(), json!(medical_history));
        }
        if let Some(name) = request.emergency_contact_name {
            update.insert("emergency_contact_name".to_string(), json!(name));
        }
        if let Some(phone) = request.emergency_contact_phone {
            update.insert("emergency_contact_phone".to_string(), json!(phone));
        }
        if let Some(provider) = request.insurance_provider {
            update.insert("insurance_provider".to_string(), json!(provider));
        }
        if let Some(number) = request.insurance_number {
            update.insert("insurance_number".to_string(), json!(number));
        }
        if update.is_empty() {
            return Err(AuthError::ValidationError("Nothing to update".to_string()));
        }

        let updated: Vec<PatientProfile> = self
            .supabase
            .update_returning(
                "patient_profiles",
                &format!("user_id=eq.{}", user_id),
                auth_token,
                serde_json::Value::Object(update),
            )
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(AuthError::ProfileNotFound)
    }

    pub async fn update_physiotherapist_profile(
        &self,
        user_id: &str,
        request: UpdatePhysiotherapistProfileRequest,
        auth_token: &str,
    ) -> Result<PhysiotherapistProfile, AuthError> {
        let mut update = serde_json::Map::new();
        if let Some(license_number) = request.license_number {
            update.insert("license_number".to_string(), json!(license_number));
        }
        if let Some(specializations) = request.specializations {
            update.insert("specializations".to_string(), json!(specializations));
        }
        if let Some(years) = request.years_of_experience {
            if years < 0 {
                return Err(AuthError::ValidationError(
                    "Years of experience must not be negative".to_string(),
                ));
            }
            update.insert("years_of_experience".to_string(), json!(years));
        }
        if let Some(education) = request.education {
            update.insert("education".to_string(), json!(education));
        }
        if let Some(certifications) = request.certifications {
            update.insert("certifications".to_string(), json!(certifications));
        }
        if let Some(fee) = request.consultation_fee {
            if fee < 0.0 {
                return Err(AuthError::ValidationError(
                    "Consultation fee must not be negative".to_string(),
                ));
            }
            update.insert("consultation_fee".to_string(), json!(fee));
        }
        if let Some(is_available) = request.is_available {
            update.insert("is_available".to_string(), json!(is_available));
        }
        if update.is_empty() {
            return Err(AuthError::ValidationError("Nothing to update".to_string()));
        }

        let body = serde_json::Value::Object(update);
        let updated: Vec<PhysiotherapistProfile> = self
            .supabase
            .update_returning(
                "physiotherapist_profiles",
                &format!("user_id=eq.{}", user_id),
                auth_token,
                body.clone(),
            )
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        if let Some(profile) = updated.into_iter().next() {
            return Ok(profile);
        }

        // Staff accounts provisioned before the credentials table existed have
        // no row yet; create one, then re-apply the update.
        self.insert_physiotherapist_profile(user_id, auth_token).await?;
        let updated: Vec<PhysiotherapistProfile> = self
            .supabase
            .update_returning(
                "physiotherapist_profiles",
                &format!("user_id=eq.{}", user_id),
                auth_token,
                body,
            )
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(AuthError::ProfileNotFound)
    }

    async fn insert_physiotherapist_profile(
        &self,
        user_id: &str,
        auth_token: &str,
    ) -> Result<PhysiotherapistProfile, AuthError> {
        let inserted: Vec<PhysiotherapistProfile> = self
            .supabase
            .insert_returning(
                "physiotherapist_profiles",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "user_id": user_id,
                    "specializations": [],
                    "years_of_experience": 0,
                    "is_available": true,
                }),
            )
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        inserted
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::DatabaseError("Insert returned no row".to_string()))
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, AuthError> {
        let path = format!("/rest/v1/profiles?email=eq.{}", email);
        let result: Vec<Profile> = self
            .supabase
            .request(Method::GET, &path, Some(&self.anon_key), None)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        Ok(result.into_iter().next())
    }

    /// Bump the failure counter and decide what the caller sees: the lockout
    /// error once the threshold is hit, invalid credentials otherwise.
    async fn record_failed_login(&self, profile: &Profile) -> AuthError {
        let now = Utc::now();
        let lock_expired = profile.locked_until.is_some() && !profile.is_locked(now);

        // An expired lock starts a fresh counting window: the counter still
        // holds the value that triggered the lock, so it restarts at 1.
        let attempts = if lock_expired && profile.failed_login_attempts >= MAX_FAILED_LOGINS {
            1
        } else {
            profile.failed_login_attempts + 1
        };
        let mut update = json!({
            "failed_login_attempts": attempts,
            "updated_at": now.to_rfc3339(),
        });
        if lock_expired {
            // Clear the stale lock so the window counts up normally.
            update["locked_until"] = json!(null);
        }

        let locked_until = if attempts >= MAX_FAILED_LOGINS {
            let until = Utc::now() + Duration::minutes(LOCKOUT_MINUTES);
            update["locked_until"] = json!(until.to_rfc3339());
            warn!(
                "Account {} locked after {} failed login attempts",
                profile.id, attempts
            );
            Some(until)
        } else {
            None
        };

        if let Err(e) = self
            .supabase
            .update_returning::<Profile>(
                "profiles",
                &format!("id=eq.{}", profile.id),
                &self.anon_key,
                update,
            )
            .await
        {
            warn!("Failed to record login failure for {}: {}", profile.id, e);
        }

        match locked_until {
            Some(until) => AuthError::AccountLocked(until),
            None => AuthError::InvalidCredentials,
        }
    }

    async fn reset_lockout(&self, profile: &Profile, auth_token: &str) -> Result<(), AuthError> {
        if profile.failed_login_attempts == 0 && profile.locked_until.is_none() {
            return Ok(());
        }
        self.supabase
            .update_returning::<Profile>(
                "profiles",
                &format!("id=eq.{}", profile.id),
                auth_token,
                json!({
                    "failed_login_attempts": 0,
                    "locked_until": null,
                    "updated_at": Utc::now().to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}
