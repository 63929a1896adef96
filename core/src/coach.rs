//! Read-only browsing of client diaries for coach accounts.

use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::info;

use crate::dashboard::{ProgressSummary, summarize};
use crate::db::Database;
use crate::models::{DayId, DayRecord, ProgramState, UserProfile, WeekRecord};
use crate::persistence::PersistenceAdapter;
use crate::remote::RemoteStore;

/// One client's diary as seen by a coach. `state` is `None` when the client has never saved.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    pub profile: UserProfile,
    pub state: Option<ProgramState>,
    pub updated_at: Option<String>,
    pub summary: Option<ProgressSummary>,
}

impl ClientSnapshot {
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.state.is_some()
    }

    #[must_use]
    pub fn week(&self, week_number: u8) -> Option<&WeekRecord> {
        self.state.as_ref()?.week(week_number)
    }

    #[must_use]
    pub fn day(&self, id: DayId) -> Option<&DayRecord> {
        self.state.as_ref()?.day(id)
    }
}

pub struct CoachView<R> {
    adapter: PersistenceAdapter<R>,
    caller: UserProfile,
}

impl<R: RemoteStore> CoachView<R> {
    /// Only callers with the coach capability get a view. Reads go through a remote
    /// persistence adapter bound to the coach, which never saves.
    pub fn new(db: Arc<Mutex<Database>>, remote: Arc<R>, caller: UserProfile) -> Result<Self> {
        if !caller.role.is_coach() {
            bail!("Coach access required");
        }
        let adapter = PersistenceAdapter::remote(db, remote, caller.id.clone());
        Ok(Self { adapter, caller })
    }

    #[must_use]
    pub fn caller(&self) -> &UserProfile {
        &self.caller
    }

    pub async fn list_clients(&self) -> Result<Vec<UserProfile>> {
        self.adapter.list_clients().await
    }

    pub async fn open_client(&self, client: &UserProfile) -> Result<ClientSnapshot> {
        let stored = self.adapter.load_remote_for(&client.id).await?;
        info!(coach = %self.caller.email, client = %client.email, "Opened client diary");
        Ok(match stored {
            Some(stored) => {
                let summary = summarize(&stored.data);
                ClientSnapshot {
                    profile: client.clone(),
                    state: Some(stored.data),
                    updated_at: Some(stored.updated_at),
                    summary: Some(summary),
                }
            }
            None => ClientSnapshot {
                profile: client.clone(),
                state: None,
                updated_at: None,
                summary: None,
            },
        })
    }
}

/// Find a client by exact email (case-insensitive), exact id, or unique id prefix.
#[must_use]
pub fn find_client<'a>(clients: &'a [UserProfile], needle: &str) -> Option<&'a UserProfile> {
    let needle = needle.trim();
    if let Some(c) = clients
        .iter()
        .find(|c| c.email.eq_ignore_ascii_case(needle) || c.id == needle)
    {
        return Some(c);
    }
    let mut prefixed = clients.iter().filter(|c| c.id.starts_with(needle));
    match (prefixed.next(), prefixed.next()) {
        (Some(c), None) if !needle.is_empty() => Some(c),
        _ => None,
    }
}
