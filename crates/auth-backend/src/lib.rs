//! Backend session client for the Knugget authentication API.
//!
//! Two layers:
//! - [`BackendClient`] speaks HTTP to the `/auth/*` endpoints and normalizes
//!   every outcome into the uniform `{success, data?, error?}` envelope.
//! - [`AuthService`] binds the client to a session store: successful
//!   login/register/refresh results are persisted before control returns,
//!   and bearer-authenticated calls get exactly one automatic
//!   refresh-and-retry on a 401 before the session is declared expired.

mod api;
mod client;
mod dto;
mod error;
mod service;

pub use api::{ApiFuture, AuthApi};
pub use client::{BackendClient, DEFAULT_REQUEST_TIMEOUT};
pub use dto::ApiEnvelope;
pub use error::{AuthApiError, AuthApiResult};
pub use service::AuthService;
