//! Session-aware authentication service.
//!
//! Wraps an [`AuthApi`] and a [`SessionStore`] so that the store always
//! reflects the last successful network result: login/register/refresh
//! persist their record before returning, logout clears the store before
//! the server is even contacted, and bearer-authenticated calls get one
//! automatic refresh-and-retry on rejection.

use session_model::{SessionRecord, UserProfile};
use session_store::SessionStore;
use std::sync::Arc;

use crate::api::{ApiFuture, AuthApi};
use crate::error::{AuthApiError, AuthApiResult};

/// Authentication operations bound to a session store.
#[derive(Clone)]
pub struct AuthService {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn SessionStore>,
}

impl AuthService {
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn SessionStore>) -> Self {
        Self { api, store }
    }

    /// Log in with email and password. The resulting session is persisted
    /// before control returns.
    pub async fn login(&self, email: &str, password: &str) -> AuthApiResult<SessionRecord> {
        let record = match self.api.login(email, password).await {
            Ok(record) => record,
            // Rejected credentials on the public endpoints are a plain API
            // failure, not a session-expiry signal.
            Err(AuthApiError::Unauthorized(msg)) => return Err(AuthApiError::Api(msg)),
            Err(err) => return Err(err),
        };
        record.validate()?;
        self.persist(&record);
        tracing::info!(user_id = %record.user.user_id, "Logged in");
        Ok(record)
    }

    /// Create an account. On success the new session is persisted before
    /// control returns.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> AuthApiResult<SessionRecord> {
        let record = match self.api.register(email, password, name).await {
            Ok(record) => record,
            Err(AuthApiError::Unauthorized(msg)) => return Err(AuthApiError::Api(msg)),
            Err(err) => return Err(err),
        };
        record.validate()?;
        self.persist(&record);
        tracing::info!(user_id = %record.user.user_id, "Registered account");
        Ok(record)
    }

    /// Exchange the stored refresh token for a new session.
    ///
    /// A rejected refresh token means the session is gone for good and
    /// surfaces as [`AuthApiError::SessionExpired`]; the caller owns the
    /// forced-logout choreography. Network failures leave the stored
    /// session untouched.
    pub async fn refresh(&self) -> AuthApiResult<SessionRecord> {
        let current = self
            .store
            .get()?
            .ok_or(AuthApiError::NotAuthenticated)?;
        let record = match self.api.refresh(&current.refresh_token).await {
            Ok(record) => record,
            Err(AuthApiError::Unauthorized(_)) | Err(AuthApiError::Api(_)) => {
                return Err(AuthApiError::SessionExpired)
            }
            Err(err) => return Err(err),
        };
        record.validate()?;
        self.persist(&record);
        tracing::debug!("Session refreshed");
        Ok(record)
    }

    /// Log out: clear the store first, then tell the server best-effort.
    /// A failed server call never resurrects the local session.
    pub async fn logout(&self) -> AuthApiResult<()> {
        let token = self
            .store
            .get()
            .ok()
            .flatten()
            .map(|record| record.access_token);
        self.store.clear()?;
        if let Some(token) = token {
            if let Err(err) = self.api.logout(&token).await {
                tracing::debug!(error = %err, "Server logout failed; local session already cleared");
            }
        }
        tracing::info!("Logged out");
        Ok(())
    }

    /// Fetch the authenticated user's profile (`GET /auth/me`).
    pub async fn get_current_user(&self) -> AuthApiResult<UserProfile> {
        self.authorized(|api, token| Box::pin(async move { api.get_current_user(&token).await }))
            .await
    }

    /// Update the display name, optimistically: the store reflects the new
    /// name immediately and is rolled back to the previous profile if the
    /// server rejects the change. Tokens are never rolled back.
    pub async fn update_profile(&self, name: &str) -> AuthApiResult<UserProfile> {
        let prev = self
            .store
            .get()?
            .ok_or(AuthApiError::NotAuthenticated)?;

        let mut optimistic = prev.clone();
        optimistic.user.display_name = Some(name.to_string());
        self.persist(&optimistic);

        let owned_name = name.to_string();
        let result = self
            .authorized(move |api, token| {
                let name = owned_name.clone();
                Box::pin(async move { api.update_profile(&token, &name).await })
            })
            .await;

        match result {
            Ok(profile) => {
                // The retry path may have rotated tokens; graft the server's
                // profile onto whatever token material is current.
                if let Ok(Some(current)) = self.store.get() {
                    self.persist(&SessionRecord {
                        user: profile.clone(),
                        ..current
                    });
                }
                Ok(profile)
            }
            Err(err) => {
                if let Ok(Some(current)) = self.store.get() {
                    self.persist(&SessionRecord {
                        user: prev.user.clone(),
                        ..current
                    });
                }
                Err(err)
            }
        }
    }

    /// Start an email-based password reset.
    pub async fn forgot_password(&self, email: &str) -> AuthApiResult<()> {
        self.api.forgot_password(email).await
    }

    /// Complete a password reset with the emailed token.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthApiResult<()> {
        self.api.reset_password(token, new_password).await
    }

    /// Run a bearer-authenticated call with exactly one refresh-and-retry.
    ///
    /// First rejection triggers a refresh with the stored refresh token and
    /// one retry under the new access token; a second rejection, or a
    /// rejected refresh, surfaces as [`AuthApiError::SessionExpired`].
    /// Network failures during refresh stay network failures so a flaky
    /// link never force-logs-out a valid session.
    async fn authorized<T>(
        &self,
        call: impl Fn(Arc<dyn AuthApi>, String) -> ApiFuture<'static, T>,
    ) -> AuthApiResult<T> {
        let current = self
            .store
            .get()?
            .ok_or(AuthApiError::NotAuthenticated)?;

        match call(Arc::clone(&self.api), current.access_token.clone()).await {
            Ok(value) => Ok(value),
            Err(AuthApiError::Unauthorized(_)) => {
                tracing::debug!("Bearer call rejected; refreshing and retrying once");
                let refreshed = match self.api.refresh(&current.refresh_token).await {
                    Ok(record) => record,
                    Err(AuthApiError::Unauthorized(_)) | Err(AuthApiError::Api(_)) => {
                        return Err(AuthApiError::SessionExpired)
                    }
                    Err(err) => return Err(err),
                };
                refreshed.validate()?;
                self.persist(&refreshed);
                match call(Arc::clone(&self.api), refreshed.access_token.clone()).await {
                    Ok(value) => Ok(value),
                    Err(AuthApiError::Unauthorized(_)) => Err(AuthApiError::SessionExpired),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    // Store writes ride behind successful network results; a persistence
    // hiccup must not turn a successful authentication into an error.
    fn persist(&self, record: &SessionRecord) {
        if let Err(err) = self.store.put(record) {
            tracing::warn!(error = %err, "Failed to persist session; continuing with in-memory result");
        }
    }
}
