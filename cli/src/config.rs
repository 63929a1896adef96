use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use diary_core::models::{AuthSession, Role, UserProfile};

/// Overrides the platform data directory when set.
const DATA_DIR_ENV: &str = "DIARY_DATA_DIR";

pub struct Config {
    pub data_dir: PathBuf,
    /// Device-local diary document.
    pub db_path: PathBuf,
    /// Backend database used by `serve` and `promote`.
    pub server_db_path: PathBuf,
    pub session_path: PathBuf,
}

/// The signed-in account remembered between invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub server: String,
    pub token: String,
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl SavedSession {
    #[must_use]
    pub fn from_auth(server: &str, auth: AuthSession) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
            token: auth.token,
            user_id: auth.user_id,
            email: auth.email,
            role: auth.role,
        }
    }

    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.user_id.clone(),
            email: self.email.clone(),
            role: self.role,
            created_at: String::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "fighter-reset-diary")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        Self::in_dir(&data_dir)
    }

    pub fn in_dir(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("diary.db"),
            server_db_path: data_dir.join("server.db"),
            session_path: data_dir.join("session.json"),
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn load_session(&self) -> Result<Option<SavedSession>> {
        if !self.session_path.exists() {
            return Ok(None);
        }
        let text =
            std::fs::read_to_string(&self.session_path).context("Failed to read session file")?;
        match serde_json::from_str(&text) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    pub fn save_session(&self, session: &SavedSession) -> Result<()> {
        let text = serde_json::to_string_pretty(session).context("Failed to serialize session")?;
        std::fs::write(&self.session_path, text).context("Failed to write session file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.session_path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set session file permissions")?;
        }
        Ok(())
    }

    /// Forget the signed-in account. Returns whether one was stored.
    pub fn clear_session(&self) -> Result<bool> {
        if !self.session_path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.session_path).context("Failed to remove session file")?;
        Ok(true)
    }
}
