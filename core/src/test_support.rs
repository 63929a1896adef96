//! In-process stand-ins for the remote backend, shared by unit tests.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, bail};

use crate::db::Database;
use crate::models::{ProgramState, StoredState, UserProfile};
use crate::remote::{RemoteStore, can_list_clients, can_read_state, can_write_state};

pub(crate) fn local_db() -> Arc<Mutex<Database>> {
    Arc::new(Mutex::new(Database::open_in_memory().unwrap()))
}

/// Remote that fails every call.
pub(crate) struct Unreachable;

impl RemoteStore for Unreachable {
    async fn load_user_state(&self, _user_id: &str) -> Result<Option<StoredState>> {
        bail!("connection refused")
    }
    async fn save_user_state(&self, _user_id: &str, _state: &ProgramState) -> Result<StoredState> {
        bail!("connection refused")
    }
    async fn list_clients(&self) -> Result<Vec<UserProfile>> {
        bail!("connection refused")
    }
    async fn fetch_profile(&self) -> Result<UserProfile> {
        bail!("connection refused")
    }
}

/// A [`RemoteStore`] over a backend database, acting as `caller` under the row-level policy.
pub(crate) struct LocalBackend {
    db: Arc<Mutex<Database>>,
    caller: UserProfile,
}

impl LocalBackend {
    pub(crate) fn new(db: Arc<Mutex<Database>>, caller: UserProfile) -> Self {
        Self { db, caller }
    }
}

impl RemoteStore for LocalBackend {
    async fn load_user_state(&self, user_id: &str) -> Result<Option<StoredState>> {
        if !can_read_state(&self.caller, user_id) {
            bail!("Permission denied for state of user {user_id}");
        }
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.get_user_state(user_id)
    }

    async fn save_user_state(&self, user_id: &str, state: &ProgramState) -> Result<StoredState> {
        if !can_write_state(&self.caller, user_id) {
            bail!("Permission denied for state of user {user_id}");
        }
        state.validate()?;
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.upsert_user_state(user_id, state)
    }

    async fn list_clients(&self) -> Result<Vec<UserProfile>> {
        if !can_list_clients(&self.caller) {
            bail!("Coach access required");
        }
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.list_clients()
    }

    async fn fetch_profile(&self) -> Result<UserProfile> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.get_profile(&self.caller.id)?
            .context("Profile not found")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn backend() -> (Arc<Mutex<Database>>, UserProfile, UserProfile, UserProfile) {
        let db = Database::open_in_memory().unwrap();
        let coach = db
            .create_user("coach@example.com", "secret1", Role::Admin)
            .unwrap();
        let alice = db
            .create_user("alice@example.com", "secret1", Role::Client)
            .unwrap();
        let bob = db
            .create_user("bob@example.com", "secret1", Role::Client)
            .unwrap();
        (Arc::new(Mutex::new(db)), coach, alice, bob)
    }

    #[tokio::test]
    async fn test_client_reads_and_writes_own_row_only() {
        let (db, _, alice, bob) = backend();
        let remote = LocalBackend::new(db, alice.clone());

        assert!(remote.load_user_state(&alice.id).await.unwrap().is_none());
        let saved = remote
            .save_user_state(&alice.id, &ProgramState::empty())
            .await
            .unwrap();
        assert_eq!(saved.user_id, alice.id);
        assert!(remote.load_user_state(&alice.id).await.unwrap().is_some());

        assert!(remote.load_user_state(&bob.id).await.is_err());
        assert!(
            remote
                .save_user_state(&bob.id, &ProgramState::empty())
                .await
                .is_err()
        );
        assert!(remote.list_clients().await.is_err());
    }

    #[tokio::test]
    async fn test_coach_reads_any_row_but_cannot_write() {
        let (db, coach, alice, _) = backend();
        LocalBackend::new(db.clone(), alice.clone())
            .save_user_state(&alice.id, &ProgramState::empty())
            .await
            .unwrap();

        let remote = LocalBackend::new(db, coach);
        assert!(remote.load_user_state(&alice.id).await.unwrap().is_some());
        assert!(
            remote
                .save_user_state(&alice.id, &ProgramState::empty())
                .await
                .is_err()
        );
        assert_eq!(remote.list_clients().await.unwrap().len(), 2);
        assert_eq!(remote.fetch_profile().await.unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_document() {
        let (db, _, alice, _) = backend();
        let remote = LocalBackend::new(db, alice.clone());
        let mut state = ProgramState::empty();
        state.weeks.truncate(3);
        assert!(remote.save_user_state(&alice.id, &state).await.is_err());
    }
}
