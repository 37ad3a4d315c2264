use session_model::{SessionRecord, UserProfile};
use std::future::Future;
use std::pin::Pin;

use crate::client::BackendClient;
use crate::error::AuthApiResult;

/// Boxed future returned by [`AuthApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = AuthApiResult<T>> + Send + 'a>>;

/// The authentication endpoints the rest of the client programs against.
///
/// Object-safe so callers hold `Arc<dyn AuthApi>` and tests can substitute
/// scripted fakes for the HTTP client.
pub trait AuthApi: Send + Sync {
    fn login(&self, email: &str, password: &str) -> ApiFuture<'_, SessionRecord>;
    fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> ApiFuture<'_, SessionRecord>;
    fn refresh(&self, refresh_token: &str) -> ApiFuture<'_, SessionRecord>;
    fn logout(&self, access_token: &str) -> ApiFuture<'_, ()>;
    fn get_current_user(&self, access_token: &str) -> ApiFuture<'_, UserProfile>;
    fn update_profile(&self, access_token: &str, name: &str) -> ApiFuture<'_, UserProfile>;
    fn forgot_password(&self, email: &str) -> ApiFuture<'_, ()>;
    fn reset_password(&self, token: &str, new_password: &str) -> ApiFuture<'_, ()>;
}

impl AuthApi for BackendClient {
    fn login(&self, email: &str, password: &str) -> ApiFuture<'_, SessionRecord> {
        let email = email.to_string();
        let password = password.to_string();
        Box::pin(async move { BackendClient::login(self, &email, &password).await })
    }

    fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> ApiFuture<'_, SessionRecord> {
        let email = email.to_string();
        let password = password.to_string();
        let name = name.map(|n| n.to_string());
        Box::pin(async move { BackendClient::register(self, &email, &password, name.as_deref()).await })
    }

    fn refresh(&self, refresh_token: &str) -> ApiFuture<'_, SessionRecord> {
        let refresh_token = refresh_token.to_string();
        Box::pin(async move { BackendClient::refresh(self, &refresh_token).await })
    }

    fn logout(&self, access_token: &str) -> ApiFuture<'_, ()> {
        let access_token = access_token.to_string();
        Box::pin(async move { BackendClient::logout(self, &access_token).await })
    }

    fn get_current_user(&self, access_token: &str) -> ApiFuture<'_, UserProfile> {
        let access_token = access_token.to_string();
        Box::pin(async move { BackendClient::get_current_user(self, &access_token).await })
    }

    fn update_profile(&self, access_token: &str, name: &str) -> ApiFuture<'_, UserProfile> {
        let access_token = access_token.to_string();
        let name = name.to_string();
        Box::pin(async move { BackendClient::update_profile(self, &access_token, &name).await })
    }

    fn forgot_password(&self, email: &str) -> ApiFuture<'_, ()> {
        let email = email.to_string();
        Box::pin(async move { BackendClient::forgot_password(self, &email).await })
    }

    fn reset_password(&self, token: &str, new_password: &str) -> ApiFuture<'_, ()> {
        let token = token.to_string();
        let new_password = new_password.to_string();
        Box::pin(async move { BackendClient::reset_password(self, &token, &new_password).await })
    }
}
