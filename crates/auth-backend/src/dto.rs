use serde::{Deserialize, Serialize};

use crate::error::{AuthApiError, AuthApiResult};

/// Uniform response envelope returned by every `/auth/*` endpoint:
/// `{success, data?, error?}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Collapse the envelope into a result. A `success: true` envelope
    /// without data is a protocol violation, not an API error.
    pub fn into_result(self) -> AuthApiResult<T> {
        if !self.success {
            return Err(AuthApiError::Api(
                self.error
                    .unwrap_or_else(|| "unspecified server error".to_string()),
            ));
        }
        self.data.ok_or_else(|| {
            AuthApiError::Protocol("success response carried no data".to_string())
        })
    }
}

/// Request body for email/password login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for account registration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Request body for exchanging a refresh token for a new session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for updating the display name.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateProfileRequest {
    pub name: String,
}

/// Request body for starting a password reset.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ForgotPasswordRequest {
    pub email: String,
}

/// Request body for completing a password reset.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_model::SessionRecord;

    #[test]
    fn success_envelope_yields_data() {
        let json = r#"{
            "success": true,
            "data": {
                "user": {
                    "userId": "user-1",
                    "email": "a@b.com",
                    "displayName": "Ada",
                    "planTier": "FREE",
                    "creditBalance": 3
                },
                "accessToken": "t1",
                "refreshToken": "r1",
                "expiresAtEpochMs": 1700003600000
            }
        }"#;
        let envelope: ApiEnvelope<SessionRecord> = serde_json::from_str(json).unwrap();
        let record = envelope.into_result().unwrap();
        assert_eq!(record.access_token, "t1");
        assert_eq!(record.user.email, "a@b.com");
    }

    #[test]
    fn failure_envelope_yields_api_error() {
        let json = r#"{"success": false, "error": "Invalid credentials"}"#;
        let envelope: ApiEnvelope<SessionRecord> = serde_json::from_str(json).unwrap();
        match envelope.into_result() {
            Err(AuthApiError::Api(msg)) => assert_eq!(msg, "Invalid credentials"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn success_without_data_is_protocol_error() {
        let json = r#"{"success": true}"#;
        let envelope: ApiEnvelope<SessionRecord> = serde_json::from_str(json).unwrap();
        assert!(matches!(
            envelope.into_result(),
            Err(AuthApiError::Protocol(_))
        ));
    }

    #[test]
    fn register_request_omits_absent_name() {
        let without = RegisterRequest {
            email: "a@b.com".to_string(),
            password: "longenough1".to_string(),
            name: None,
        };
        let json = serde_json::to_string(&without).unwrap();
        assert!(!json.contains("name"));

        let with = RegisterRequest {
            name: Some("Ada".to_string()),
            ..without
        };
        let json = serde_json::to_string(&with).unwrap();
        assert!(json.contains("\"name\":\"Ada\""));
    }

    #[test]
    fn refresh_and_reset_requests_are_camel_case() {
        let refresh = RefreshRequest {
            refresh_token: "r1".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&refresh).unwrap(),
            r#"{"refreshToken":"r1"}"#
        );

        let reset = ResetPasswordRequest {
            token: "reset-token".to_string(),
            new_password: "longenough2".to_string(),
        };
        let json = serde_json::to_string(&reset).unwrap();
        assert!(json.contains("\"newPassword\""));
    }
}
