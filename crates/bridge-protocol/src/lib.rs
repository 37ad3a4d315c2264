//! Wire contract for the extension bridge.
//!
//! The client and the extension-helper peer exchange newline-delimited JSON
//! envelopes over a local socket. Four message types cover the whole
//! protocol; fire-and-forget messages get no reply, request messages get a
//! [`BridgeResponse`] correlated by envelope id.
//!
//! Field names follow the extension's JavaScript conventions (camelCase,
//! SCREAMING_SNAKE message types), so either side can be reimplemented
//! without a translation layer.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use session_model::{SessionRecord, UserProfile};

/// RFC 3339 timestamp with millisecond precision, UTC.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A session-sync message, tagged by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncMessage {
    /// A login happened on the sending side; receiver adopts the record.
    #[serde(rename = "AUTH_SUCCESS")]
    AuthSuccess(AuthSuccessPayload),
    /// A logout happened on the sending side; receiver clears its session.
    #[serde(rename = "LOGOUT")]
    Logout(LogoutPayload),
    /// Ask the receiver for its current authentication state.
    #[serde(rename = "CHECK_AUTH")]
    CheckAuth(CheckAuthPayload),
    /// Ask the receiver to re-push its current session state.
    #[serde(rename = "SYNC_REQUEST")]
    SyncRequest(SyncRequestPayload),
}

impl SyncMessage {
    /// Wire name of the message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::AuthSuccess(_) => "AUTH_SUCCESS",
            SyncMessage::Logout(_) => "LOGOUT",
            SyncMessage::CheckAuth(_) => "CHECK_AUTH",
            SyncMessage::SyncRequest(_) => "SYNC_REQUEST",
        }
    }

    /// True for message types that expect a [`BridgeResponse`].
    pub fn expects_response(&self) -> bool {
        matches!(
            self,
            SyncMessage::CheckAuth(_) | SyncMessage::SyncRequest(_)
        )
    }

    pub fn check_auth() -> Self {
        SyncMessage::CheckAuth(CheckAuthPayload {})
    }

    pub fn sync_request() -> Self {
        SyncMessage::SyncRequest(SyncRequestPayload {})
    }
}

/// Full session carried by an AUTH_SUCCESS message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccessPayload {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
    pub expires_at_epoch_ms: i64,
}

impl AuthSuccessPayload {
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            access_token: record.access_token.clone(),
            refresh_token: record.refresh_token.clone(),
            user: record.user.clone(),
            expires_at_epoch_ms: record.expires_at_epoch_ms,
        }
    }

    pub fn into_record(self) -> SessionRecord {
        SessionRecord {
            user: self.user,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at_epoch_ms: self.expires_at_epoch_ms,
        }
    }
}

/// Why a LOGOUT was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The user chose to sign out.
    UserLogout,
    /// The session could not be refreshed and was forcibly ended.
    SessionExpired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutPayload {
    pub reason: LogoutReason,
    pub timestamp_iso: String,
}

impl LogoutPayload {
    pub fn new(reason: LogoutReason) -> Self {
        Self {
            reason,
            timestamp_iso: now_iso(),
        }
    }
}

/// CHECK_AUTH carries no data; the empty struct keeps the wire form `{}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckAuthPayload {}

/// SYNC_REQUEST carries no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequestPayload {}

/// Reply to CHECK_AUTH.
///
/// `user` answers "who is signed in here"; `session` carries the full record
/// (tokens included) so the asking side can adopt it during startup
/// reconciliation. `is_authenticated` applies the validity margin, but the
/// record is included even when stale and the asker re-checks before adopting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAuthResult {
    pub is_authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionRecord>,
    pub timestamp_iso: String,
}

impl CheckAuthResult {
    pub fn for_session(record: &SessionRecord) -> Self {
        Self {
            is_authenticated: record.is_valid(),
            user: Some(record.user.clone()),
            session: Some(record.clone()),
            timestamp_iso: now_iso(),
        }
    }

    pub fn logged_out() -> Self {
        Self {
            is_authenticated: false,
            user: None,
            session: None,
            timestamp_iso: now_iso(),
        }
    }
}

/// Reply to SYNC_REQUEST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAck {
    pub success: bool,
}

/// Outgoing frame: a message plus correlation id and send timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Correlation id for request/response pairs.
    pub id: String,
    #[serde(flatten)]
    pub message: SyncMessage,
    pub timestamp_iso: String,
}

impl Envelope {
    /// Wrap a message with a fresh UUID and the current timestamp.
    pub fn new(message: SyncMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message,
            timestamp_iso: now_iso(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Reply frame for request messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    /// Envelope id this responds to.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: i32,
    pub message: String,
}

impl BridgeResponse {
    pub fn success(id: &str, result: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: &str, code: i32, message: &str) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
            }),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Deserialize the result payload into a typed reply.
    pub fn result_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let value = self.result.clone().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value)
    }
}

// Standard error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const UNSUPPORTED_MESSAGE: i32 = -32601;
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_model::PlanTier;

    fn record() -> SessionRecord {
        SessionRecord {
            user: UserProfile {
                user_id: "user-1".to_string(),
                email: "a@b.com".to_string(),
                display_name: None,
                plan_tier: PlanTier::Free,
                credit_balance: 0,
            },
            access_token: "t1".to_string(),
            refresh_token: "r1".to_string(),
            expires_at_epoch_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_auth_success_wire_form() {
        let envelope = Envelope::new(SyncMessage::AuthSuccess(AuthSuccessPayload::from_record(
            &record(),
        )));
        let json = envelope.to_json().unwrap();

        assert!(json.contains("\"type\":\"AUTH_SUCCESS\""));
        assert!(json.contains("\"accessToken\":\"t1\""));
        assert!(json.contains("\"expiresAtEpochMs\":1700000000000"));
        assert!(json.contains("\"timestampIso\""));
        assert!(json.contains("\"id\""));
    }

    #[test]
    fn test_logout_wire_form() {
        let envelope = Envelope::new(SyncMessage::Logout(LogoutPayload::new(
            LogoutReason::SessionExpired,
        )));
        let json = envelope.to_json().unwrap();

        assert!(json.contains("\"type\":\"LOGOUT\""));
        assert!(json.contains("\"reason\":\"session_expired\""));
    }

    #[test]
    fn test_logout_reason_user_logout() {
        let json =
            serde_json::to_string(&LogoutPayload::new(LogoutReason::UserLogout)).unwrap();
        assert!(json.contains("\"reason\":\"user_logout\""));
    }

    #[test]
    fn test_check_auth_payload_is_empty_object() {
        let envelope = Envelope::new(SyncMessage::check_auth());
        let json = envelope.to_json().unwrap();

        assert!(json.contains("\"type\":\"CHECK_AUTH\""));
        assert!(json.contains("\"payload\":{}"));
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = Envelope::new(SyncMessage::sync_request());
        let json = envelope.to_json().unwrap();
        let back = Envelope::from_json(&json).unwrap();

        assert_eq!(back, envelope);
        assert!(back.message.expects_response());
    }

    #[test]
    fn test_envelope_ids_are_unique() {
        let a = Envelope::new(SyncMessage::check_auth());
        let b = Envelope::new(SyncMessage::check_auth());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"id":"1","type":"NUKE_AUTH","payload":{},"timestampIso":"2025-01-01T00:00:00Z"}"#;
        assert!(Envelope::from_json(json).is_err());
    }

    #[test]
    fn test_auth_payload_record_round_trip() {
        let payload = AuthSuccessPayload::from_record(&record());
        assert_eq!(payload.into_record(), record());
    }

    #[test]
    fn test_check_auth_result_carries_full_session() {
        let mut fresh = record();
        fresh.expires_at_epoch_ms = Utc::now().timestamp_millis() + 3_600_000;

        let result = CheckAuthResult::for_session(&fresh);
        let json = serde_json::to_string(&result).unwrap();

        assert!(result.is_authenticated);
        assert!(json.contains("\"userId\":\"user-1\""));
        assert!(json.contains("\"accessToken\":\"t1\""));
    }

    #[test]
    fn test_check_auth_result_stale_session_still_included() {
        // record() expires in the past; the asker decides whether to adopt.
        let result = CheckAuthResult::for_session(&record());

        assert!(!result.is_authenticated);
        assert!(result.session.is_some());
    }

    #[test]
    fn test_check_auth_result_logged_out_omits_user() {
        let json = serde_json::to_string(&CheckAuthResult::logged_out()).unwrap();
        assert!(json.contains("\"isAuthenticated\":false"));
        assert!(!json.contains("\"user\""));
        assert!(!json.contains("\"session\""));
    }

    #[test]
    fn test_response_success() {
        let response =
            BridgeResponse::success("abc", serde_json::json!({ "success": true }));
        let json = response.to_json().unwrap();

        assert!(json.contains("\"id\":\"abc\""));
        assert!(!json.contains("\"error\""));
        assert!(response.is_success());

        let ack: SyncAck = response.result_as().unwrap();
        assert!(ack.success);
    }

    #[test]
    fn test_response_error() {
        let response =
            BridgeResponse::error("abc", error_codes::UNSUPPORTED_MESSAGE, "nope");
        let json = response.to_json().unwrap();

        assert!(json.contains("\"code\":-32601"));
        assert!(!json.contains("\"result\""));
        assert!(!response.is_success());
    }

    #[test]
    fn test_typed_check_auth_reply_through_response() {
        let reply = CheckAuthResult::for_session(&record());
        let response =
            BridgeResponse::success("1", serde_json::to_value(&reply).unwrap());

        let back: CheckAuthResult = response.result_as().unwrap();
        assert_eq!(back, reply);
    }

    #[test]
    fn test_error_codes_values() {
        assert_eq!(error_codes::PARSE_ERROR, -32700);
        assert_eq!(error_codes::INVALID_REQUEST, -32600);
        assert_eq!(error_codes::UNSUPPORTED_MESSAGE, -32601);
        assert_eq!(error_codes::INTERNAL_ERROR, -32603);
    }

    #[test]
    fn test_now_iso_shape() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }
}
