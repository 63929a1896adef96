use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use tabled::{Table, Tabled, settings::Style};

use crate::config::Config;
use crate::remote::HttpRemote;
use diary_core::coach::{CoachView, find_client};
use diary_core::dashboard::week_summary;
use diary_core::models::DayId;
use diary_core::remote::RemoteStore;

use super::diary::{print_day_detail, print_progress, print_week_footer, print_week_table};
use super::helpers::truncate;
use super::open_local_db;

fn joined_date(created_at: &str) -> String {
    DateTime::parse_from_rfc3339(created_at).map_or_else(
        |_| created_at.to_string(),
        |t| t.with_timezone(&Local).format("%Y-%m-%d").to_string(),
    )
}

async fn coach_view(config: &Config) -> Result<CoachView<HttpRemote>> {
    let saved = config
        .load_session()?
        .context("Not signed in. Use `diary login` first")?;
    let client = Arc::new(HttpRemote::new(&saved.server, &saved.token)?);
    let profile = match client.fetch_profile().await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "Using cached profile");
            saved.profile()
        }
    };
    CoachView::new(open_local_db(config)?, client, profile)
}

pub(crate) async fn cmd_coach_clients(config: &Config, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct ClientRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Email")]
        email: String,
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Joined")]
        joined: String,
    }

    let view = coach_view(config).await?;
    let clients = view.list_clients().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&clients)?);
        return Ok(());
    }

    if clients.is_empty() {
        println!("No clients yet");
        return Ok(());
    }

    println!("Clients of {}\n", view.caller().email);
    let rows: Vec<ClientRow> = clients
        .iter()
        .enumerate()
        .map(|(i, c)| ClientRow {
            idx: i + 1,
            email: truncate(&c.email, 40),
            id: c.id.chars().take(8).collect(),
            joined: joined_date(&c.created_at),
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) async fn cmd_coach_show(
    config: &Config,
    client: &str,
    week: Option<u8>,
    day: Option<u8>,
    json: bool,
) -> Result<()> {
    if day.is_some() && week.is_none() {
        bail!("--day requires --week");
    }

    let view = coach_view(config).await?;
    let clients = view.list_clients().await?;
    let profile = find_client(&clients, client)
        .with_context(|| format!("No client matching '{client}'"))?;
    let snapshot = view.open_client(profile).await?;

    if json {
        match (week, day) {
            (Some(w), Some(d)) => {
                println!("{}", serde_json::to_string_pretty(&snapshot.day(DayId::new(w, d)))?);
            }
            (Some(w), None) => println!("{}", serde_json::to_string_pretty(&snapshot.week(w))?),
            _ => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        }
        return Ok(());
    }

    let Some(summary) = snapshot.summary.as_ref() else {
        println!("No saved data yet for {}", snapshot.profile.email);
        return Ok(());
    };

    match (week, day) {
        (Some(w), Some(d)) => {
            let record = snapshot
                .day(DayId::new(w, d))
                .with_context(|| format!("Day {} not found", DayId::new(w, d)))?;
            println!("{}\n", snapshot.profile.email);
            print_day_detail(record);
        }
        (Some(w), None) => {
            let record = snapshot
                .week(w)
                .with_context(|| format!("Week {w} not found"))?;
            println!("{} | {w}. hét\n", snapshot.profile.email);
            print_week_table(record);
            print_week_footer(&week_summary(record));
        }
        _ => {
            println!(
                "{} | last saved {}\n",
                snapshot.profile.email,
                snapshot.updated_at.as_deref().unwrap_or("-")
            );
            print_progress(summary);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cmd_signup;
    use crate::server::spawn_for_tests;
    use diary_core::models::{ProgramState, Role};

    #[test]
    fn test_joined_date_falls_back_to_raw_text() {
        assert_eq!(joined_date("not a date"), "not a date");
        assert_eq!(joined_date("2024-03-05T12:00:00Z").len(), 10);
    }

    #[tokio::test]
    async fn test_coach_commands_require_coach_role() {
        let (server, _db) = spawn_for_tests().await;
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        cmd_signup(&config, &server, "client@example.com", "secret1", Some(false), true)
            .await
            .unwrap();

        let err = cmd_coach_clients(&config, true).await.unwrap_err();
        assert!(err.to_string().contains("Coach access required"));
    }

    #[tokio::test]
    async fn test_coach_browses_client_diary() {
        let (server, db) = spawn_for_tests().await;
        let client_dir = tempfile::tempdir().unwrap();
        let client_config = Config::in_dir(client_dir.path()).unwrap();
        cmd_signup(&client_config, &server, "alice@example.com", "secret1", Some(false), true)
            .await
            .unwrap();
        let coach_dir = tempfile::tempdir().unwrap();
        let coach_config = Config::in_dir(coach_dir.path()).unwrap();
        cmd_signup(&coach_config, &server, "coach@example.com", "secret1", Some(false), true)
            .await
            .unwrap();

        {
            let db = db.lock().unwrap();
            db.set_role("coach@example.com", Role::Admin).unwrap();
            let alice = db.get_profile_by_email("alice@example.com").unwrap().unwrap();
            db.upsert_user_state(&alice.id, &ProgramState::empty()).unwrap();
        }

        cmd_coach_clients(&coach_config, false).await.unwrap();
        cmd_coach_show(&coach_config, "alice@example.com", None, None, false)
            .await
            .unwrap();
        cmd_coach_show(&coach_config, "alice@example.com", Some(1), Some(0), true)
            .await
            .unwrap();
        assert!(
            cmd_coach_show(&coach_config, "nobody@example.com", None, None, false)
                .await
                .is_err()
        );
        assert!(
            cmd_coach_show(&coach_config, "alice@example.com", None, Some(1), false)
                .await
                .is_err()
        );
    }
}
