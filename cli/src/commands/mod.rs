mod account;
mod coach;
mod diary;
pub(crate) mod helpers;
mod transfer;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::remote::HttpRemote;
use diary_core::autosave::DEFAULT_QUIET_PERIOD;
use diary_core::db::Database;
use diary_core::service::Session;

pub(crate) use account::{cmd_login, cmd_logout, cmd_promote, cmd_signup, cmd_whoami};
pub(crate) use coach::{cmd_coach_clients, cmd_coach_show};
pub(crate) use diary::{LogFields, cmd_day, cmd_log, cmd_progress, cmd_week};
pub(crate) use transfer::{cmd_export, cmd_import, cmd_reset};

pub(super) type DiarySession = Session<HttpRemote>;

pub(super) fn open_local_db(config: &Config) -> Result<Arc<Mutex<Database>>> {
    let db = Database::open(&config.db_path)?;
    Ok(Arc::new(Mutex::new(db)))
}

/// Open the diary for the remembered account, or the device-local one when signed out.
pub(super) async fn open_session(config: &Config) -> Result<DiarySession> {
    let db = open_local_db(config)?;
    match config.load_session()? {
        Some(saved) => {
            let client = Arc::new(HttpRemote::new(&saved.server, &saved.token)?);
            Session::resume_remote(db, client, saved.profile(), DEFAULT_QUIET_PERIOD)
                .await
                .with_context(|| format!("Could not load your diary from {}", saved.server))
        }
        None => Session::open_local(db, DEFAULT_QUIET_PERIOD).await,
    }
}

/// Write pending edits before the process exits. Returns the save time as `HH:MM`.
pub(super) async fn save_now(session: &DiarySession) -> Result<String> {
    session.flush().await;
    session.last_saved_label().with_context(|| {
        if session.is_remote() {
            "Changes could not be saved to the server"
        } else {
            "Changes could not be saved on this device"
        }
    })
}
