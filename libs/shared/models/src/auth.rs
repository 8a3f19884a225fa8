use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::Role;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Authenticated caller, extracted from a validated JWT by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Map the raw JWT role claim onto the clinic role model.
    /// Unknown or missing roles are treated as patients, the least
    /// privileged tier.
    pub fn clinic_role(&self) -> Role {
        match self.role.as_deref() {
            Some("admin") => Role::Admin,
            Some("physiotherapist") => Role::Physiotherapist,
            _ => Role::Patient,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.clinic_role() == Role::Admin
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub valid: bool,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}
