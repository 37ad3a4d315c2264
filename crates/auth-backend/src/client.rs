//! HTTP client for the Knugget authentication API.
//!
//! Every endpoint answers with the uniform `{success, data?, error?}`
//! envelope; this module turns transport and envelope outcomes into
//! [`AuthApiError`] values and nothing else.

use serde::de::DeserializeOwned;
use session_model::{SessionRecord, UserProfile};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::dto::{
    ApiEnvelope, ForgotPasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
    ResetPasswordRequest, UpdateProfileRequest,
};
use crate::error::{AuthApiError, AuthApiResult};

/// Upper bound on any single request to the authentication API.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Client for the `/auth/*` endpoints of the Knugget backend.
#[derive(Clone, Debug)]
pub struct BackendClient {
    http_client: reqwest::Client,
    api_url: String,
}

impl BackendClient {
    /// Create a client for the given API base URL (e.g.
    /// `https://api.knugget.app`).
    pub fn new(api_url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http_client,
            api_url: api_url.into(),
        }
    }

    /// Build the URL for an `/auth/*` endpoint.
    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/{}", self.api_url.trim_end_matches('/'), path)
    }

    /// `POST /auth/login` with email and password.
    pub async fn login(&self, email: &str, password: &str) -> AuthApiResult<SessionRecord> {
        tracing::debug!("Sending login request");
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .http_client
            .post(self.auth_url("login"))
            .json(&body)
            .send()
            .await?;
        parse_envelope(response).await
    }

    /// `POST /auth/register` with email, password, and optional display name.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> AuthApiResult<SessionRecord> {
        tracing::debug!("Sending registration request");
        let body = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.map(|n| n.to_string()),
        };
        let response = self
            .http_client
            .post(self.auth_url("register"))
            .json(&body)
            .send()
            .await?;
        parse_envelope(response).await
    }

    /// `POST /auth/refresh`, exchanging a refresh token for a new session.
    pub async fn refresh(&self, refresh_token: &str) -> AuthApiResult<SessionRecord> {
        tracing::debug!("Sending token refresh request");
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self
            .http_client
            .post(self.auth_url("refresh"))
            .json(&body)
            .send()
            .await?;
        parse_envelope(response).await
    }

    /// `POST /auth/logout` with bearer auth.
    pub async fn logout(&self, access_token: &str) -> AuthApiResult<()> {
        let response = self
            .http_client
            .post(self.auth_url("logout"))
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await?;
        parse_ack(response).await
    }

    /// `GET /auth/me` with bearer auth.
    pub async fn get_current_user(&self, access_token: &str) -> AuthApiResult<UserProfile> {
        let response = self
            .http_client
            .get(self.auth_url("me"))
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await?;
        parse_envelope(response).await
    }

    /// `PUT /auth/profile` with bearer auth, updating the display name.
    pub async fn update_profile(
        &self,
        access_token: &str,
        name: &str,
    ) -> AuthApiResult<UserProfile> {
        let body = UpdateProfileRequest {
            name: name.to_string(),
        };
        let response = self
            .http_client
            .put(self.auth_url("profile"))
            .header("Authorization", format!("Bearer {access_token}"))
            .json(&body)
            .send()
            .await?;
        parse_envelope(response).await
    }

    /// `POST /auth/forgot-password`, starting an email-based reset.
    pub async fn forgot_password(&self, email: &str) -> AuthApiResult<()> {
        let body = ForgotPasswordRequest {
            email: email.to_string(),
        };
        let response = self
            .http_client
            .post(self.auth_url("forgot-password"))
            .json(&body)
            .send()
            .await?;
        parse_ack(response).await
    }

    /// `POST /auth/reset-password`, completing a reset with the emailed token.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthApiResult<()> {
        let body = ResetPasswordRequest {
            token: token.to_string(),
            new_password: new_password.to_string(),
        };
        let response = self
            .http_client
            .post(self.auth_url("reset-password"))
            .json(&body)
            .send()
            .await?;
        parse_ack(response).await
    }
}

/// Classify the HTTP status and return the body for envelope parsing.
async fn checked_body(response: reqwest::Response) -> AuthApiResult<String> {
    let status = response.status();
    let body = response.text().await?;
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(AuthApiError::Unauthorized(server_error_message(
            &body,
            status.as_u16(),
        )));
    }
    if !status.is_success() {
        let body_summary = summarize_response_body(&body);
        tracing::debug!(
            status = status.as_u16(),
            body_summary = %body_summary,
            "Auth endpoint returned an error status"
        );
        return Err(AuthApiError::Api(server_error_message(
            &body,
            status.as_u16(),
        )));
    }
    Ok(body)
}

async fn parse_envelope<T: DeserializeOwned>(response: reqwest::Response) -> AuthApiResult<T> {
    let body = checked_body(response).await?;
    let envelope: ApiEnvelope<T> = serde_json::from_str(&body)
        .map_err(|err| AuthApiError::Protocol(format!("malformed response envelope: {err}")))?;
    envelope.into_result()
}

// Ack endpoints answer with the envelope but no data payload.
async fn parse_ack(response: reqwest::Response) -> AuthApiResult<()> {
    let body = checked_body(response).await?;
    let envelope: ApiEnvelope<serde_json::Value> = serde_json::from_str(&body)
        .map_err(|err| AuthApiError::Protocol(format!("malformed response envelope: {err}")))?;
    if envelope.success {
        Ok(())
    } else {
        Err(AuthApiError::Api(
            envelope
                .error
                .unwrap_or_else(|| "unspecified server error".to_string()),
        ))
    }
}

/// Pull the server's error message out of an error body, falling back to
/// the bare status when the body is not envelope-shaped.
fn server_error_message(body: &str, status: u16) -> String {
    serde_json::from_str::<ApiEnvelope<serde_json::Value>>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .unwrap_or_else(|| format!("HTTP {status}"))
}
