use std::future::Future;

use anyhow::Result;

use crate::models::{ProgramState, StoredState, UserProfile};

/// Remote per-user document store.
///
/// Implemented by the HTTP client in the CLI. Implementations act on behalf of one signed-in caller and enforce the row-level policy
/// described by [`can_read_state`], [`can_write_state`] and [`can_list_clients`].
pub trait RemoteStore: Send + Sync {
    /// Point read of one user's document. `None` when the user has never saved.
    fn load_user_state(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<StoredState>>> + Send;

    /// Whole-document overwrite, stamped with the server's time.
    fn save_user_state(
        &self,
        user_id: &str,
        state: &ProgramState,
    ) -> impl Future<Output = Result<StoredState>> + Send;

    /// Non-admin profiles, newest first. Coach only.
    fn list_clients(&self) -> impl Future<Output = Result<Vec<UserProfile>>> + Send;

    /// The caller's own profile.
    fn fetch_profile(&self) -> impl Future<Output = Result<UserProfile>> + Send;
}

// --- Row-level policy ---

#[must_use]
pub fn can_read_state(caller: &UserProfile, owner_id: &str) -> bool {
    caller.id == owner_id || caller.role.is_coach()
}

#[must_use]
pub fn can_write_state(caller: &UserProfile, owner_id: &str) -> bool {
    caller.id == owner_id
}

#[must_use]
pub fn can_list_clients(caller: &UserProfile) -> bool {
    caller.role.is_coach()
}
