use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Errors surfaced by the PostgREST layer. `Conflict` is reported separately
/// so callers can turn exclusion/unique-constraint violations into domain
/// errors instead of opaque 500s.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(key) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", key);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, bearer);
            }
        }

        headers
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None)
            .await
    }

    /// Like `request`, but with extra headers (`Prefer: return=representation`
    /// for writes that need the stored row back).
    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut headers = self.get_headers(auth_token);
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DbError::Auth(error_text),
                StatusCode::NOT_FOUND => DbError::NotFound(error_text),
                StatusCode::CONFLICT => DbError::Conflict(error_text),
                _ => DbError::Api {
                    status: status.as_u16(),
                    message: error_text,
                },
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Insert a row and return the stored representation.
    pub async fn insert_returning<T>(
        &self,
        table: &str,
        auth_token: &str,
        body: Value,
    ) -> Result<Vec<T>, DbError>
    where
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(
            Method::POST,
            &format!("/rest/v1/{}", table),
            Some(auth_token),
            Some(body),
            Some(headers),
        )
        .await
    }

    /// Patch rows matching `filter` and return the stored representations.
    pub async fn update_returning<T>(
        &self,
        table: &str,
        filter: &str,
        auth_token: &str,
        body: Value,
    ) -> Result<Vec<T>, DbError>
    where
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(
            Method::PATCH,
            &format!("/rest/v1/{}?{}", table, filter),
            Some(auth_token),
            Some(body),
            Some(headers),
        )
        .await
    }

    /// Delete rows matching `filter` and return what was removed.
    pub async fn delete_returning<T>(
        &self,
        table: &str,
        filter: &str,
        auth_token: &str,
    ) -> Result<Vec<T>, DbError>
    where
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(
            Method::DELETE,
            &format!("/rest/v1/{}?{}", table, filter),
            Some(auth_token),
            None,
            Some(headers),
        )
        .await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
