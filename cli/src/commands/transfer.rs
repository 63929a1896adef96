use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::Config;

use super::helpers::prompt_yes_no;
use super::{open_session, save_now};

#[derive(Serialize)]
struct TransferResult {
    path: Option<String>,
    saved_at: Option<String>,
}

/// Export the diary as JSON. `out` of `-` writes to stdout; no `out` uses the dated file name.
pub(crate) async fn cmd_export(config: &Config, out: Option<PathBuf>, json: bool) -> Result<()> {
    let session = open_session(config).await?;
    let (file_name, body) = session.export()?;

    if out.as_deref() == Some(Path::new("-")) {
        println!("{body}");
        return Ok(());
    }

    let path = out.unwrap_or_else(|| PathBuf::from(file_name));
    std::fs::write(&path, &body)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if json {
        let result = TransferResult {
            path: Some(path.display().to_string()),
            saved_at: None,
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Exported diary to {}", path.display());
    }
    Ok(())
}

pub(crate) async fn cmd_import(config: &Config, file: &Path, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let session = open_session(config).await?;
    session
        .import_json(&text)
        .with_context(|| format!("Import failed, diary left unchanged: {}", file.display()))?;
    let saved_at = save_now(&session).await?;

    if json {
        let result = TransferResult {
            path: Some(file.display().to_string()),
            saved_at: Some(saved_at),
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Imported {} (saved at {saved_at})", file.display());
    }
    Ok(())
}

pub(crate) async fn cmd_reset(config: &Config, yes: bool, json: bool) -> Result<()> {
    if !yes {
        if json {
            bail!("Refusing to reset without --yes in JSON mode");
        }
        if !prompt_yes_no("Erase all 8 weeks of the diary?")? {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let session = open_session(config).await?;
    session.reset();
    let saved_at = save_now(&session).await?;

    if json {
        let result = TransferResult {
            path: None,
            saved_at: Some(saved_at),
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Diary reset (saved at {saved_at})");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use diary_core::models::{DayId, DayPatch};

    async fn seed(config: &Config) {
        let session = open_session(config).await.unwrap();
        session
            .update_day(
                2,
                DayId::new(2, 1),
                &DayPatch {
                    water: Some(1.5),
                    ..DayPatch::default()
                },
            )
            .unwrap();
        save_now(&session).await.unwrap();
    }

    #[tokio::test]
    async fn test_export_then_import_restores_diary() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        seed(&config).await;
        let exported = open_session(&config).await.unwrap().state();

        let out = dir.path().join("backup.json");
        cmd_export(&config, Some(out.clone()), false).await.unwrap();
        cmd_reset(&config, true, false).await.unwrap();
        assert!(
            !open_session(&config)
                .await
                .unwrap()
                .state()
                .day(DayId::new(2, 1))
                .unwrap()
                .is_filled()
        );

        cmd_import(&config, &out, false).await.unwrap();
        assert_eq!(open_session(&config).await.unwrap().state(), exported);
    }

    #[tokio::test]
    async fn test_invalid_import_leaves_diary_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        seed(&config).await;
        let before = open_session(&config).await.unwrap().state();

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"weeks":[{"weekNumber":1,"days":[]}]}"#).unwrap();
        let err = cmd_import(&config, &bad, false).await.unwrap_err();
        assert!(format!("{err:#}").contains("diary left unchanged"));

        assert_eq!(open_session(&config).await.unwrap().state(), before);
    }

    #[tokio::test]
    async fn test_reset_in_json_mode_requires_yes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        assert!(cmd_reset(&config, false, true).await.is_err());
    }
}
