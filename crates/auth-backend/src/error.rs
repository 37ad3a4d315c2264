use thiserror::Error;

/// Errors surfaced by backend session operations.
#[derive(Error, Debug)]
pub enum AuthApiError {
    /// Transport-level failure: DNS, connect, TLS, timeout. The session on
    /// disk stays untouched; callers may retry later.
    #[error("Network error: {0}")]
    Network(String),

    /// The server rejected the credentials on this request (HTTP 401).
    /// Internal to the retry path; callers never see this once the
    /// single refresh-and-retry has run.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Refresh was attempted and the server rejected it too. The stored
    /// session is no longer usable and has been cleared.
    #[error("Session expired")]
    SessionExpired,

    /// The server answered but the body did not match the expected
    /// envelope shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server returned a well-formed envelope with `success: false`.
    #[error("API error: {0}")]
    Api(String),

    /// No stored session to authenticate with.
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session store error: {0}")]
    Store(#[from] session_store::StoreError),

    #[error("Invalid session record: {0}")]
    InvalidRecord(#[from] session_model::ValidationError),
}

impl AuthApiError {
    /// Whether the failure is transient from the caller's point of view.
    /// Protocol errors count: a malformed body on one request says nothing
    /// about the stored session.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthApiError::Network(_) | AuthApiError::Protocol(_))
    }
}

impl From<reqwest::Error> for AuthApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AuthApiError::Protocol(err.to_string())
        } else {
            AuthApiError::Network(err.to_string())
        }
    }
}

pub type AuthApiResult<T> = Result<T, AuthApiError>;
