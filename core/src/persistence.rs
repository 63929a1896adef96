use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::db::Database;
use crate::models::{APP_STORAGE_KEY, ProgramState, StoredState, UserProfile};
use crate::remote::RemoteStore;
use crate::transfer::parse_program_state;

/// What the device-local store holds under the application key.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalDocument {
    Missing,
    /// Present but unreadable; carries the parse error for logging.
    Malformed(String),
    Found(ProgramState),
}

impl LocalDocument {
    #[must_use]
    pub fn into_state(self) -> Option<ProgramState> {
        match self {
            Self::Found(state) => Some(state),
            Self::Missing | Self::Malformed(_) => None,
        }
    }
}

struct RemoteBinding<R> {
    client: Arc<R>,
    user_id: String,
}

/// Reads and writes the whole program document, locally or remotely depending on
/// whether a user is signed in.
pub struct PersistenceAdapter<R> {
    local: Arc<Mutex<Database>>,
    remote: Option<RemoteBinding<R>>,
    last_saved: Mutex<Option<DateTime<Local>>>,
}

impl<R: RemoteStore> PersistenceAdapter<R> {
    /// Anonymous session: everything goes to the local store.
    #[must_use]
    pub fn local(db: Arc<Mutex<Database>>) -> Self {
        Self {
            local: db,
            remote: None,
            last_saved: Mutex::new(None),
        }
    }

    /// Signed-in session: documents go to the remote row of `user_id`.
    #[must_use]
    pub fn remote(db: Arc<Mutex<Database>>, client: Arc<R>, user_id: impl Into<String>) -> Self {
        Self {
            local: db,
            remote: Some(RemoteBinding {
                client,
                user_id: user_id.into(),
            }),
            last_saved: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.remote.as_ref().map(|r| r.user_id.as_str())
    }

    /// Write the whole document. Failures are logged and returned; in-memory state is
    /// never rolled back.
    pub async fn save(&self, state: &ProgramState) -> Result<()> {
        let result = match &self.remote {
            Some(binding) => binding
                .client
                .save_user_state(&binding.user_id, state)
                .await
                .map(|_| ()),
            None => self.save_local(state),
        };
        match result {
            Ok(()) => {
                *self.last_saved.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(Local::now());
                debug!(remote = self.is_remote(), "Saved program state");
                Ok(())
            }
            Err(e) => {
                warn!(remote = self.is_remote(), error = %format!("{e:#}"), "Save failed");
                Err(e)
            }
        }
    }

    fn save_local(&self, state: &ProgramState) -> Result<()> {
        let json = serde_json::to_string(state).context("Failed to serialize program state")?;
        let db = self.local.lock().unwrap_or_else(PoisonError::into_inner);
        db.put_local_document(APP_STORAGE_KEY, &json)?;
        Ok(())
    }

    /// The saved document, or the empty program when nothing usable is stored.
    pub async fn load(&self) -> Result<ProgramState> {
        match &self.remote {
            Some(_) => Ok(self
                .load_remote()
                .await?
                .map(|stored| stored.data)
                .unwrap_or_default()),
            None => Ok(self.load_local()?.into_state().unwrap_or_default()),
        }
    }

    /// The signed-in user's remote row. `None` for anonymous sessions.
    pub async fn load_remote(&self) -> Result<Option<StoredState>> {
        match &self.remote {
            Some(binding) => self.load_remote_for(&binding.user_id).await,
            None => Ok(None),
        }
    }

    /// Read-only point read of any user's remote row, subject to the backend's policy.
    pub async fn load_remote_for(&self, user_id: &str) -> Result<Option<StoredState>> {
        let binding = self.remote.as_ref().context("Not signed in")?;
        let stored = binding.client.load_user_state(user_id).await?;
        Ok(stored.map(|mut s| {
            s.data.normalize();
            s
        }))
    }

    /// Client profiles visible to the signed-in caller.
    pub async fn list_clients(&self) -> Result<Vec<UserProfile>> {
        let binding = self.remote.as_ref().context("Not signed in")?;
        binding.client.list_clients().await
    }

    pub fn load_local(&self) -> Result<LocalDocument> {
        let raw = {
            let db = self.local.lock().unwrap_or_else(PoisonError::into_inner);
            db.get_local_document(APP_STORAGE_KEY)?
        };
        let Some(raw) = raw else {
            return Ok(LocalDocument::Missing);
        };
        match parse_program_state(&raw) {
            Ok(state) => Ok(LocalDocument::Found(state)),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Ignoring malformed local document");
                Ok(LocalDocument::Malformed(format!("{e:#}")))
            }
        }
    }

    #[must_use]
    pub fn last_saved(&self) -> Option<DateTime<Local>> {
        *self.last_saved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last successful save as local `HH:MM`.
    #[must_use]
    pub fn last_saved_label(&self) -> Option<String> {
        self.last_saved().map(|t| t.format("%H:%M").to_string())
    }
}
