use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use serde::Serialize;

use crate::config::{Config, SavedSession};
use crate::remote::{self, HttpRemote};
use diary_core::autosave::DEFAULT_QUIET_PERIOD;
use diary_core::db::Database;
use diary_core::models::{AuthSession, Credentials, Role, validate_email};
use diary_core::remote::RemoteStore;
use diary_core::service::Session;
use diary_core::sync::{ImportPrompt, SyncOutcome};

use super::helpers::prompt_yes_no;
use super::{open_local_db, save_now};

#[derive(Serialize)]
struct AccountInfo<'a> {
    user_id: &'a str,
    email: &'a str,
    role: Role,
    server: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync: Option<SyncOutcome>,
}

fn credentials(email: &str, password: &str) -> Credentials {
    Credentials {
        email: email.trim().to_string(),
        password: password.to_string(),
    }
}

/// Reconcile the account's diary with what this device holds, then remember the account.
async fn begin_session(
    config: &Config,
    server: &str,
    auth: AuthSession,
    import_local: Option<bool>,
    json: bool,
) -> Result<()> {
    let mut prompt = || match import_local {
        Some(answer) => answer,
        None if json => false,
        None => prompt_yes_no(
            "This device already has a diary and your account has none. Import it into your account?",
        )
        .unwrap_or(false),
    };
    let (saved, outcome) = reconcile_and_remember(config, server, auth, &mut prompt).await?;
    print_signed_in(&saved, outcome, json)
}

/// The session file is written only once reconciliation has finished, so an interrupted
/// import prompt is offered again on the next sign-in.
async fn reconcile_and_remember(
    config: &Config,
    server: &str,
    auth: AuthSession,
    prompt: &mut impl ImportPrompt,
) -> Result<(SavedSession, SyncOutcome)> {
    let saved = SavedSession::from_auth(server, auth);
    let db = open_local_db(config)?;
    let client = Arc::new(HttpRemote::new(&saved.server, &saved.token)?);
    let session =
        Session::open_remote(db, client, saved.profile(), prompt, DEFAULT_QUIET_PERIOD).await;
    let outcome = session
        .reconciliation()
        .map_or(SyncOutcome::Fresh, |r| r.outcome);
    if session.reconciliation().is_some_and(|r| r.needs_initial_save()) {
        if let Err(e) = save_now(&session).await {
            eprintln!("Warning: {e:#}");
        }
    }
    session.sign_out();
    config.save_session(&saved)?;
    Ok((saved, outcome))
}

fn print_signed_in(saved: &SavedSession, outcome: SyncOutcome, json: bool) -> Result<()> {
    if json {
        let info = AccountInfo {
            user_id: &saved.user_id,
            email: &saved.email,
            role: saved.role,
            server: &saved.server,
            sync: Some(outcome),
        };
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("Signed in as {} ({})", saved.email, saved.role.as_str());
        println!("Diary: {}", outcome.describe());
    }
    Ok(())
}

pub(crate) async fn cmd_signup(
    config: &Config,
    server: &str,
    email: &str,
    password: &str,
    import_local: Option<bool>,
    json: bool,
) -> Result<()> {
    let auth = remote::signup(server, &credentials(email, password)).await?;
    begin_session(config, server, auth, import_local, json).await
}

pub(crate) async fn cmd_login(
    config: &Config,
    server: &str,
    email: &str,
    password: &str,
    import_local: Option<bool>,
    json: bool,
) -> Result<()> {
    let auth = remote::login(server, &credentials(email, password)).await?;
    begin_session(config, server, auth, import_local, json).await
}

pub(crate) async fn cmd_logout(config: &Config, json: bool) -> Result<()> {
    let Some(saved) = config.load_session()? else {
        if json {
            println!("{}", serde_json::json!({ "signed_out": false }));
        } else {
            println!("Not signed in");
        }
        return Ok(());
    };

    let client = HttpRemote::new(&saved.server, &saved.token)?;
    if let Err(e) = client.logout().await {
        tracing::warn!(error = %format!("{e:#}"), "Server sign-out failed");
    }
    config.clear_session()?;

    if json {
        println!("{}", serde_json::json!({ "signed_out": true }));
    } else {
        println!("Signed out of {}", saved.email);
    }
    Ok(())
}

pub(crate) async fn cmd_whoami(config: &Config, json: bool) -> Result<()> {
    let Some(mut saved) = config.load_session()? else {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "signed_in": false,
                    "data_dir": config.data_dir.display().to_string(),
                })
            );
        } else {
            println!(
                "Not signed in. The diary is stored on this device in {}",
                config.data_dir.display()
            );
        }
        return Ok(());
    };

    let client = HttpRemote::new(&saved.server, &saved.token)?;
    match client.fetch_profile().await {
        Ok(profile) if profile.role != saved.role => {
            saved.role = profile.role;
            config.save_session(&saved)?;
        }
        Ok(_) => {}
        Err(e) => eprintln!("Warning: could not refresh profile: {e:#}"),
    }

    if json {
        let info = AccountInfo {
            user_id: &saved.user_id,
            email: &saved.email,
            role: saved.role,
            server: &saved.server,
            sync: None,
        };
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("Signed in as {} ({})", saved.email, saved.role.as_str());
        println!("Server: {}", saved.server);
    }
    Ok(())
}

/// Change an account's role directly in the backend database.
pub(crate) fn cmd_promote(db_path: &Path, email: &str, role: Role, json: bool) -> Result<()> {
    let email = validate_email(email)?;
    let db = Database::open(db_path)?;
    if !db.set_role(&email, role)? {
        bail!("No account with email '{email}'");
    }

    if json {
        println!(
            "{}",
            serde_json::json!({ "email": email, "role": role.as_str() })
        );
    } else {
        println!("{email} is now {}", role.as_str());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promote_changes_role() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_user("coach@example.com", "secret1", Role::Client)
                .unwrap();
        }
        cmd_promote(&path, "Coach@Example.com", Role::Admin, false).unwrap();
        let db = Database::open(&path).unwrap();
        assert_eq!(
            db.get_profile_by_email("coach@example.com")
                .unwrap()
                .unwrap()
                .role,
            Role::Admin
        );
    }

    #[test]
    fn test_promote_unknown_email_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.db");
        let err = cmd_promote(&path, "ghost@example.com", Role::Admin, false).unwrap_err();
        assert!(err.to_string().contains("No account"));
    }

    #[tokio::test]
    async fn test_signup_imports_local_diary_then_logout_returns_to_device() {
        use crate::commands::open_session;
        use crate::server::spawn_for_tests;
        use diary_core::models::{DayId, DayPatch};

        let (server, db) = spawn_for_tests().await;
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        let device = open_session(&config).await.unwrap();
        let patch = DayPatch {
            water: Some(2.0),
            ..DayPatch::default()
        };
        device.update_day(1, DayId::new(1, 0), &patch).unwrap();
        save_now(&device).await.unwrap();
        device.sign_out();

        cmd_signup(&config, &server, "fighter@example.com", "secret1", Some(true), true)
            .await
            .unwrap();
        let saved = config.load_session().unwrap().unwrap();
        let stored = db
            .lock()
            .unwrap()
            .get_user_state(&saved.user_id)
            .unwrap()
            .unwrap();
        assert!(stored.data.day(DayId::new(1, 0)).unwrap().is_filled());

        let remote = open_session(&config).await.unwrap();
        assert!(remote.is_remote());
        remote.sign_out();

        cmd_logout(&config, true).await.unwrap();
        assert!(config.load_session().unwrap().is_none());
        let local = open_session(&config).await.unwrap();
        assert!(!local.is_remote());
    }

    #[tokio::test]
    async fn test_account_is_remembered_only_after_import_question() {
        use crate::commands::open_session;
        use crate::server::spawn_for_tests;
        use diary_core::models::{DayId, DayPatch};

        let (server, _db) = spawn_for_tests().await;
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        let device = open_session(&config).await.unwrap();
        let patch = DayPatch {
            workout: Some(true),
            ..DayPatch::default()
        };
        device.update_day(2, DayId::new(2, 0), &patch).unwrap();
        save_now(&device).await.unwrap();
        device.sign_out();

        let auth = remote::signup(&server, &credentials("late@example.com", "secret1"))
            .await
            .unwrap();
        let mut asked = false;
        let mut prompt = || {
            asked = true;
            assert!(config.load_session().unwrap().is_none());
            true
        };
        let (saved, outcome) = reconcile_and_remember(&config, &server, auth, &mut prompt)
            .await
            .unwrap();
        assert!(asked);
        assert_eq!(outcome, SyncOutcome::LocalImported);
        assert_eq!(config.load_session().unwrap().unwrap().user_id, saved.user_id);
    }

    #[tokio::test]
    async fn test_login_with_wrong_password_keeps_device_session() {
        use crate::server::spawn_for_tests;

        let (server, _db) = spawn_for_tests().await;
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        cmd_signup(&config, &server, "fighter@example.com", "secret1", Some(false), true)
            .await
            .unwrap();
        cmd_logout(&config, true).await.unwrap();

        let err = cmd_login(&config, &server, "fighter@example.com", "wrong-pass", None, true)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Invalid login credentials"));
        assert!(config.load_session().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_signed_out_commands_are_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        cmd_logout(&config, false).await.unwrap();
        cmd_whoami(&config, true).await.unwrap();
    }
}
