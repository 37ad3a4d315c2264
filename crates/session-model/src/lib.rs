//! Session domain types for the Knugget client.
//!
//! A [`SessionRecord`] is the unit of truth for "is this user logged in":
//! identity, tokens, and expiry, present as a whole or absent as a whole.
//! Everything that stores, transmits, or reasons about authentication state
//! goes through these types.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Safety margin subtracted from the token expiry before a session is
/// allowed to be treated as valid. A session expiring within this window
/// counts as invalid and must be refreshed first.
pub const VALIDITY_MARGIN_MS: i64 = 5 * 60 * 1000;

/// Subscription tier of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanTier {
    Free,
    Premium,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "FREE",
            PlanTier::Premium => "PREMIUM",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated user's profile as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub plan_tier: PlanTier,
    pub credit_balance: i64,
}

/// A complete authentication session: user identity plus token material.
///
/// Either fully present (logged in) or fully absent (logged out); partial
/// records are rejected at the serialization boundary.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at_epoch_ms: i64,
}

impl SessionRecord {
    /// True iff the session expires strictly later than `now_ms` plus the
    /// safety margin. A session exactly at the margin boundary is invalid.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.expires_at_epoch_ms > now_ms + VALIDITY_MARGIN_MS
    }

    /// True iff the session is valid against the wall clock.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now().timestamp_millis())
    }

    /// Structural validation of a record received from storage or a peer.
    ///
    /// Tokens are opaque and not inspected; this checks the user shape only.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user.user_id.is_empty() {
            return Err(ValidationError::MissingUserId);
        }
        if !self.user.email.contains('@') {
            return Err(ValidationError::InvalidEmail(self.user.email.clone()));
        }
        if self.user.credit_balance < 0 {
            return Err(ValidationError::NegativeCreditBalance(
                self.user.credit_balance,
            ));
        }
        if self.access_token.is_empty() || self.refresh_token.is_empty() {
            return Err(ValidationError::MissingTokens);
        }
        Ok(())
    }
}

// Tokens never appear in logs or debug output.
impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("user", &self.user)
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expires_at_epoch_ms", &self.expires_at_epoch_ms)
            .finish()
    }
}

fn redact(token: &str) -> String {
    format!("<redacted:{}b>", token.len())
}

/// Rejection reasons for a structurally invalid session record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("session record has an empty user id")]
    MissingUserId,
    #[error("session record has an implausible email: {0}")]
    InvalidEmail(String),
    #[error("session record has a negative credit balance: {0}")]
    NegativeCreditBalance(i64),
    #[error("session record is missing token material")]
    MissingTokens,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_at_epoch_ms: i64) -> SessionRecord {
        SessionRecord {
            user: UserProfile {
                user_id: "user-1".to_string(),
                email: "a@b.com".to_string(),
                display_name: Some("Ada".to_string()),
                plan_tier: PlanTier::Free,
                credit_balance: 10,
            },
            access_token: "access-token".to_string(),
            refresh_token: "refresh-token".to_string(),
            expires_at_epoch_ms,
        }
    }

    #[test]
    fn validity_requires_expiry_beyond_margin() {
        let now = 1_700_000_000_000;

        // Strictly beyond the margin: valid.
        assert!(record(now + VALIDITY_MARGIN_MS + 1).is_valid_at(now));
        // Exactly at the margin boundary: invalid.
        assert!(!record(now + VALIDITY_MARGIN_MS).is_valid_at(now));
        // Inside the margin: invalid.
        assert!(!record(now + VALIDITY_MARGIN_MS - 1).is_valid_at(now));
        // Already expired: invalid.
        assert!(!record(now - 1).is_valid_at(now));
    }

    #[test]
    fn validate_accepts_well_formed_record() {
        assert!(record(1).validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_id() {
        let mut r = record(1);
        r.user.user_id.clear();
        assert_eq!(r.validate(), Err(ValidationError::MissingUserId));
    }

    #[test]
    fn validate_rejects_email_without_at() {
        let mut r = record(1);
        r.user.email = "not-an-email".to_string();
        assert!(matches!(
            r.validate(),
            Err(ValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn validate_rejects_negative_credits() {
        let mut r = record(1);
        r.user.credit_balance = -5;
        assert_eq!(
            r.validate(),
            Err(ValidationError::NegativeCreditBalance(-5))
        );
    }

    #[test]
    fn validate_rejects_missing_tokens() {
        let mut r = record(1);
        r.access_token.clear();
        assert_eq!(r.validate(), Err(ValidationError::MissingTokens));
    }

    #[test]
    fn wire_form_is_camel_case_with_uppercase_tiers() {
        let json = serde_json::to_string(&record(42)).unwrap();
        assert!(json.contains("\"accessToken\""));
        assert!(json.contains("\"refreshToken\""));
        assert!(json.contains("\"expiresAtEpochMs\":42"));
        assert!(json.contains("\"planTier\":\"FREE\""));
        assert!(json.contains("\"creditBalance\":10"));

        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record(42));
    }

    #[test]
    fn premium_tier_round_trips() {
        let mut r = record(1);
        r.user.plan_tier = PlanTier::Premium;
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"PREMIUM\""));
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.user.plan_tier, PlanTier::Premium);
    }

    #[test]
    fn unknown_plan_tier_is_rejected() {
        let json = r#"{
            "user": {"userId": "u", "email": "a@b.com", "planTier": "GOLD", "creditBalance": 0},
            "accessToken": "t",
            "refreshToken": "r",
            "expiresAtEpochMs": 1
        }"#;
        assert!(serde_json::from_str::<SessionRecord>(json).is_err());
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let rendered = format!("{:?}", record(1));
        assert!(!rendered.contains("access-token"));
        assert!(!rendered.contains("refresh-token"));
        assert!(rendered.contains("<redacted:12b>"));
    }
}
