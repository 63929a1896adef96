use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use tracing::info;

use crate::autosave::Autosaver;
use crate::dashboard::{ProgressSummary, summarize};
use crate::db::Database;
use crate::models::{DayId, DayPatch, ProgramState, UserProfile};
use crate::persistence::PersistenceAdapter;
use crate::remote::RemoteStore;
use crate::store::StateStore;
use crate::sync::{ImportPrompt, Reconciliation, reconcile_on_login};
use crate::transfer::{export_file_name, export_json, parse_program_state};

#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Anonymous,
    SignedIn(UserProfile),
}

/// One diary session: the in-memory document, where it persists, and its autosave loop.
pub struct Session<R: RemoteStore + 'static> {
    identity: Identity,
    store: StateStore,
    adapter: Arc<PersistenceAdapter<R>>,
    reconciliation: Option<Reconciliation>,
    autosaver: Autosaver,
}

impl<R: RemoteStore + 'static> Session<R> {
    /// Anonymous session backed by the device-local store.
    pub async fn open_local(db: Arc<Mutex<Database>>, quiet: Duration) -> Result<Self> {
        let adapter = Arc::new(PersistenceAdapter::local(db));
        let state = adapter.load().await?;
        let store = StateStore::new(state);
        let autosaver = Autosaver::start(adapter.clone(), store.subscribe(), quiet);
        info!("Opened local session");
        Ok(Self {
            identity: Identity::Anonymous,
            store,
            adapter,
            reconciliation: None,
            autosaver,
        })
    }

    /// Signed-in session. Reconciliation runs here, once; autosave starts only afterwards.
    pub async fn open_remote(
        db: Arc<Mutex<Database>>,
        client: Arc<R>,
        profile: UserProfile,
        prompt: &mut impl ImportPrompt,
        quiet: Duration,
    ) -> Self {
        let adapter = Arc::new(PersistenceAdapter::remote(db, client, profile.id.clone()));
        let reconciliation = reconcile_on_login(&adapter, prompt).await;
        let store = StateStore::new(reconciliation.state.clone());
        let autosaver = Autosaver::start(adapter.clone(), store.subscribe(), quiet);
        if reconciliation.needs_initial_save() {
            store.touch();
        }
        info!(user = %profile.email, "Opened remote session");
        Self {
            identity: Identity::SignedIn(profile),
            store,
            adapter,
            reconciliation: Some(reconciliation),
            autosaver,
        }
    }

    /// Continue an already reconciled sign-in. A failed remote load is an error here, so
    /// an unreachable server never leads to an empty document overwriting the saved one.
    pub async fn resume_remote(
        db: Arc<Mutex<Database>>,
        client: Arc<R>,
        profile: UserProfile,
        quiet: Duration,
    ) -> Result<Self> {
        let adapter = Arc::new(PersistenceAdapter::remote(db, client, profile.id.clone()));
        let state = adapter.load().await?;
        let store = StateStore::new(state);
        let autosaver = Autosaver::start(adapter.clone(), store.subscribe(), quiet);
        info!(user = %profile.email, "Resumed remote session");
        Ok(Self {
            identity: Identity::SignedIn(profile),
            store,
            adapter,
            reconciliation: None,
            autosaver,
        })
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.adapter.is_remote()
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn reconciliation(&self) -> Option<&Reconciliation> {
        self.reconciliation.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> ProgramState {
        self.store.current()
    }

    pub fn update_day(&self, week_number: u8, day_id: DayId, patch: &DayPatch) -> Result<ProgramState> {
        self.store.update_day(week_number, day_id, patch)
    }

    /// Replace the document with an imported one. Invalid input leaves state untouched.
    pub fn import_json(&self, text: &str) -> Result<ProgramState> {
        let state = parse_program_state(text)?;
        self.store.replace(state.clone());
        Ok(state)
    }

    pub fn reset(&self) {
        self.store.replace(ProgramState::empty());
    }

    /// Suggested file name and pretty JSON body for an export dated today.
    pub fn export(&self) -> Result<(String, String)> {
        let name = export_file_name(Local::now().date_naive());
        let body = export_json(&self.store.current())?;
        Ok((name, body))
    }

    #[must_use]
    pub fn progress(&self) -> ProgressSummary {
        summarize(&self.store.current())
    }

    #[must_use]
    pub fn last_saved_label(&self) -> Option<String> {
        self.adapter.last_saved_label()
    }

    /// Write any pending edit now.
    pub async fn flush(&self) {
        self.autosaver.flush().await;
    }

    /// End the session, dropping any save still waiting for its quiet period.
    pub fn sign_out(self) {
        self.autosaver.shutdown();
        info!("Session closed");
    }
}
