//! Login-time reconciliation between the remote row and a prior local document.
//!
//! When both a remote and a local document exist the remote one wins and the local one
//! is left in place untouched.

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::models::{ProgramState, StoredState};
use crate::persistence::{LocalDocument, PersistenceAdapter};
use crate::remote::RemoteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The user's remote document was adopted.
    RemoteAdopted,
    /// No remote document; the user chose to bring the local one along.
    LocalImported,
    /// No remote document; the user declined the local one and starts fresh.
    LocalDeclined,
    /// Nothing saved anywhere.
    Fresh,
    /// The remote load failed; started fresh without touching anything.
    RemoteUnavailable,
}

impl SyncOutcome {
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::RemoteAdopted => "loaded your saved diary",
            Self::LocalImported => "imported the diary stored on this device",
            Self::LocalDeclined => "started a fresh diary (device copy kept)",
            Self::Fresh => "started a fresh diary",
            Self::RemoteUnavailable => "could not reach the server, started a fresh diary",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub outcome: SyncOutcome,
    pub state: ProgramState,
}

impl Reconciliation {
    /// Whether the adopted state exists only locally and must be written remotely.
    #[must_use]
    pub fn needs_initial_save(&self) -> bool {
        self.outcome == SyncOutcome::LocalImported
    }
}

/// Asked once when a signed-in user has no remote document but the device holds one.
pub trait ImportPrompt {
    fn confirm_import(&mut self) -> bool;
}

impl<F: FnMut() -> bool> ImportPrompt for F {
    fn confirm_import(&mut self) -> bool {
        self()
    }
}

/// Decide the session's starting state from the remote load result and the local document.
pub fn decide(
    remote: Result<Option<StoredState>>,
    local: LocalDocument,
    prompt: &mut impl ImportPrompt,
) -> Reconciliation {
    let remote = match remote {
        Ok(remote) => remote,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Remote load failed, starting fresh");
            return Reconciliation {
                outcome: SyncOutcome::RemoteUnavailable,
                state: ProgramState::empty(),
            };
        }
    };

    if let Some(stored) = remote {
        return Reconciliation {
            outcome: SyncOutcome::RemoteAdopted,
            state: stored.data,
        };
    }

    match local {
        LocalDocument::Found(state) => {
            if prompt.confirm_import() {
                Reconciliation {
                    outcome: SyncOutcome::LocalImported,
                    state,
                }
            } else {
                Reconciliation {
                    outcome: SyncOutcome::LocalDeclined,
                    state: ProgramState::empty(),
                }
            }
        }
        LocalDocument::Missing | LocalDocument::Malformed(_) => Reconciliation {
            outcome: SyncOutcome::Fresh,
            state: ProgramState::empty(),
        },
    }
}

/// Run reconciliation for a signed-in adapter. Call once per login.
pub async fn reconcile_on_login<R: RemoteStore>(
    adapter: &PersistenceAdapter<R>,
    prompt: &mut impl ImportPrompt,
) -> Reconciliation {
    let remote = adapter.load_remote().await;
    let local = match adapter.load_local() {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Local store unreadable");
            LocalDocument::Missing
        }
    };
    let result = decide(remote, local, prompt);
    info!(
        user = adapter.user_id().unwrap_or("-"),
        outcome = ?result.outcome,
        "Reconciled session state"
    );
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{APP_STORAGE_KEY, DayId, DayPatch, Role};
    use crate::test_support::{LocalBackend, Unreachable, local_db};

    fn stored(state: ProgramState) -> StoredState {
        StoredState {
            user_id: "u1".to_string(),
            data: state,
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn local_state() -> ProgramState {
        ProgramState::empty().with_day_update(
            1,
            DayId::new(1, 1),
            &DayPatch {
                sleep: Some(8.0),
                ..DayPatch::default()
            },
        )
    }

    fn never_asked() -> impl FnMut() -> bool {
        || panic!("prompt should not be shown")
    }

    #[test]
    fn test_remote_wins_without_prompt() {
        let remote = ProgramState::empty().with_day_update(
            2,
            DayId::new(2, 2),
            &DayPatch {
                workout: Some(true),
                ..DayPatch::default()
            },
        );
        let result = decide(
            Ok(Some(stored(remote.clone()))),
            LocalDocument::Found(local_state()),
            &mut never_asked(),
        );
        assert_eq!(result.outcome, SyncOutcome::RemoteAdopted);
        assert_eq!(result.state, remote);
        assert!(!result.needs_initial_save());
    }

    #[test]
    fn test_accept_local_import() {
        let result = decide(Ok(None), LocalDocument::Found(local_state()), &mut || true);
        assert_eq!(result.outcome, SyncOutcome::LocalImported);
        assert_eq!(result.state, local_state());
        assert!(result.needs_initial_save());
    }

    #[test]
    fn test_decline_local_import() {
        let result = decide(Ok(None), LocalDocument::Found(local_state()), &mut || false);
        assert_eq!(result.outcome, SyncOutcome::LocalDeclined);
        assert_eq!(result.state, ProgramState::empty());
        assert!(!result.needs_initial_save());
    }

    #[test]
    fn test_nothing_saved_is_fresh() {
        let result = decide(Ok(None), LocalDocument::Missing, &mut never_asked());
        assert_eq!(result.outcome, SyncOutcome::Fresh);
        let result = decide(
            Ok(None),
            LocalDocument::Malformed("bad".to_string()),
            &mut never_asked(),
        );
        assert_eq!(result.outcome, SyncOutcome::Fresh);
    }

    #[test]
    fn test_remote_error_starts_fresh() {
        let result = decide(
            Err(anyhow::anyhow!("timeout")),
            LocalDocument::Found(local_state()),
            &mut never_asked(),
        );
        assert_eq!(result.outcome, SyncOutcome::RemoteUnavailable);
        assert_eq!(result.state, ProgramState::empty());
    }

    #[tokio::test]
    async fn test_decline_leaves_local_document_untouched() {
        let backend_db = local_db();
        let user = backend_db
            .lock()
            .unwrap()
            .create_user("a@example.com", "secret1", Role::Client)
            .unwrap();
        let local = local_db();
        let local_json = serde_json::to_string(&local_state()).unwrap();
        local
            .lock()
            .unwrap()
            .put_local_document(APP_STORAGE_KEY, &local_json)
            .unwrap();

        let client = Arc::new(LocalBackend::new(backend_db.clone(), user.clone()));
        let adapter = PersistenceAdapter::remote(local.clone(), client, user.id.clone());
        let result = reconcile_on_login(&adapter, &mut || false).await;

        assert_eq!(result.outcome, SyncOutcome::LocalDeclined);
        assert_eq!(result.state, ProgramState::empty());
        assert_eq!(
            local
                .lock()
                .unwrap()
                .get_local_document(APP_STORAGE_KEY)
                .unwrap(),
            Some(local_json)
        );
        assert!(
            backend_db
                .lock()
                .unwrap()
                .get_user_state(&user.id)
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_unreachable_remote_reconciles_fresh() {
        let adapter = PersistenceAdapter::remote(local_db(), Arc::new(Unreachable), "u1");
        let result = reconcile_on_login(&adapter, &mut never_asked()).await;
        assert_eq!(result.outcome, SyncOutcome::RemoteUnavailable);
    }
}
