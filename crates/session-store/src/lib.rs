//! Session persistence for the Knugget client.
//!
//! One record, whole or absent: the store holds at most a single
//! [`SessionRecord`](session_model::SessionRecord) and every write or clear
//! replaces it as a unit. Two backends:
//! - **Memory**: ephemeral, for tests and bridge-less embedding.
//! - **File**: one JSON document replaced via temp-file-then-rename, so the
//!   record on disk is never partially written.
//!
//! The store never initiates network calls; freshness policy lives in the
//! sync coordinator.

mod file;
mod memory;
mod traits;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;
pub use traits::SessionStore;

use thiserror::Error;

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error from the persistence medium
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted document exists but cannot be trusted
    /// (deserialization or validation failure). Distinct from absence.
    #[error("Stored session is corrupted: {0}")]
    Corrupted(String),

    /// Encoding error while serializing a record for persistence
    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use session_model::{PlanTier, SessionRecord, UserProfile, VALIDITY_MARGIN_MS};
    use tempfile::tempdir;

    fn record(expires_at_epoch_ms: i64) -> SessionRecord {
        SessionRecord {
            user: UserProfile {
                user_id: "user-1".to_string(),
                email: "a@b.com".to_string(),
                display_name: Some("Ada".to_string()),
                plan_tier: PlanTier::Premium,
                credit_balance: 3,
            },
            access_token: "t1".to_string(),
            refresh_token: "r1".to_string(),
            expires_at_epoch_ms,
        }
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemorySessionStore::new();

        assert!(store.get().unwrap().is_none());
        assert!(!store.has().unwrap());

        store.put(&record(42)).unwrap();
        assert_eq!(store.get().unwrap(), Some(record(42)));
        assert!(store.has().unwrap());

        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let store = MemorySessionStore::new();
        store.put(&record(42)).unwrap();

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn put_is_idempotent() {
        let store = MemorySessionStore::new();

        store.put(&record(42)).unwrap();
        store.put(&record(42)).unwrap();
        assert_eq!(store.get().unwrap(), Some(record(42)));
    }

    #[test]
    fn put_replaces_whole_record() {
        let store = MemorySessionStore::new();
        store.put(&record(1)).unwrap();

        let mut newer = record(2);
        newer.access_token = "t2".to_string();
        store.put(&newer).unwrap();

        let got = store.get().unwrap().unwrap();
        assert_eq!(got.access_token, "t2");
        assert_eq!(got.expires_at_epoch_ms, 2);
    }

    #[test]
    fn validity_follows_margin() {
        let store = MemorySessionStore::new();
        let now = 1_700_000_000_000;

        assert!(!store.is_valid_at(now).unwrap());

        store.put(&record(now + VALIDITY_MARGIN_MS + 1)).unwrap();
        assert!(store.is_valid_at(now).unwrap());

        store.put(&record(now + VALIDITY_MARGIN_MS)).unwrap();
        assert!(!store.is_valid_at(now).unwrap());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.json"));

        assert!(store.get().unwrap().is_none());

        store.put(&record(42)).unwrap();
        assert_eq!(store.get().unwrap(), Some(record(42)));

        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        FileSessionStore::new(path.clone()).put(&record(42)).unwrap();

        let reopened = FileSessionStore::new(path);
        assert_eq!(reopened.get().unwrap(), Some(record(42)));
    }

    #[test]
    fn file_store_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep").join("nested").join("session.json");

        let store = FileSessionStore::new(path.clone());
        store.put(&record(1)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn file_store_reports_garbage_as_corrupted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileSessionStore::new(path);
        assert!(matches!(store.get(), Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn file_store_reports_invalid_record_as_corrupted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        // Parses fine, fails structural validation (negative credits).
        let doc = r#"{
            "user": {"userId": "u", "email": "a@b.com", "planTier": "FREE", "creditBalance": -1},
            "accessToken": "t",
            "refreshToken": "r",
            "expiresAtEpochMs": 1
        }"#;
        std::fs::write(&path, doc).unwrap();

        let store = FileSessionStore::new(path);
        assert!(matches!(store.get(), Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn file_store_put_overwrites_corrupted_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = FileSessionStore::new(path);
        store.put(&record(7)).unwrap();
        assert_eq!(store.get().unwrap(), Some(record(7)));
    }

    #[test]
    fn stores_are_object_safe() {
        let stores: Vec<Box<dyn SessionStore>> = vec![
            Box::new(MemorySessionStore::new()),
            Box::new(FileSessionStore::new(
                tempdir().unwrap().path().join("s.json"),
            )),
        ];
        for store in &stores {
            assert!(store.get().unwrap().is_none());
        }
    }
}
