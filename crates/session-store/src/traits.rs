//! Store trait definition.

use crate::StoreResult;
use chrono::Utc;
use session_model::SessionRecord;

/// Trait for session persistence backends.
///
/// Implementations hold at most one record. `put` and `clear` are
/// all-or-nothing: a reader never observes a partially written session.
pub trait SessionStore: Send + Sync {
    /// Persist the record, replacing any existing one.
    fn put(&self, record: &SessionRecord) -> StoreResult<()>;

    /// Retrieve the current record, or `None` when logged out.
    ///
    /// A document that exists but cannot be deserialized or fails
    /// structural validation is an error, not absence.
    fn get(&self) -> StoreResult<Option<SessionRecord>>;

    /// Remove the record. Succeeds when already absent.
    fn clear(&self) -> StoreResult<()>;

    /// Check whether any record is present.
    fn has(&self) -> StoreResult<bool> {
        Ok(self.get()?.is_some())
    }

    /// True iff a record is present and still valid at `now_ms`
    /// (expiry beyond the safety margin).
    fn is_valid_at(&self, now_ms: i64) -> StoreResult<bool> {
        Ok(self
            .get()?
            .map(|record| record.is_valid_at(now_ms))
            .unwrap_or(false))
    }

    /// True iff a record is present and valid against the wall clock.
    fn is_valid(&self) -> StoreResult<bool> {
        self.is_valid_at(Utc::now().timestamp_millis())
    }
}
