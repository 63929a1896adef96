//! JSON export and validated import of the whole program document.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;

use crate::models::ProgramState;

#[must_use]
pub fn export_file_name(date: NaiveDate) -> String {
    format!("fighter-reset-naplo-{}.json", date.format("%Y-%m-%d"))
}

pub fn export_json(state: &ProgramState) -> Result<String> {
    serde_json::to_string_pretty(state).context("Failed to serialize program state")
}

/// Parse and validate a program document.
///
/// The document must be a JSON object with a `weeks` collection of the full program
/// shape. Missing per-day value fields fall back to their empty values.
pub fn parse_program_state(text: &str) -> Result<ProgramState> {
    let value: serde_json::Value =
        serde_json::from_str(text).context("File is not valid JSON")?;
    match value.get("weeks") {
        Some(serde_json::Value::Array(_)) => {}
        Some(_) => bail!("Invalid diary file: 'weeks' must be a list"),
        None => bail!("Invalid diary file: missing 'weeks'"),
    }
    let mut state: ProgramState =
        serde_json::from_value(value).context("Invalid diary file structure")?;
    state.normalize();
    state.validate().context("Invalid diary file")?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayId, DayPatch};

    fn sample() -> ProgramState {
        ProgramState::empty()
            .with_day_update(
                1,
                DayId::new(1, 0),
                &DayPatch {
                    workout: Some(true),
                    nutrition: Some(4),
                    notes: Some("Első edzés".to_string()),
                    ..DayPatch::default()
                },
            )
            .with_day_update(
                8,
                DayId::new(8, 6),
                &DayPatch {
                    sleep: Some(7.25),
                    water: Some(2.5),
                    ..DayPatch::default()
                },
            )
    }

    #[test]
    fn test_export_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_file_name(date), "fighter-reset-naplo-2024-03-09.json");
    }

    #[test]
    fn test_export_then_import_is_identity() {
        let state = sample();
        let json = export_json(&state).unwrap();
        assert_eq!(parse_program_state(&json).unwrap(), state);
    }

    #[test]
    fn test_import_rejects_non_json() {
        let err = parse_program_state("not json").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_import_rejects_missing_weeks() {
        assert!(parse_program_state(r#"{"days":[]}"#).is_err());
        assert!(parse_program_state(r#"{"weeks":3}"#).is_err());
        assert!(parse_program_state("[]").is_err());
    }

    #[test]
    fn test_import_rejects_wrong_shape() {
        let mut state = ProgramState::empty();
        state.weeks.pop();
        let json = serde_json::to_string(&state).unwrap();
        assert!(parse_program_state(&json).is_err());
    }

    #[test]
    fn test_import_rejects_out_of_range_value() {
        let mut value = serde_json::to_value(ProgramState::empty()).unwrap();
        value["weeks"][0]["days"][0]["nutrition"] = serde_json::json!(9);
        assert!(parse_program_state(&value.to_string()).is_err());
    }

    #[test]
    fn test_import_fills_missing_fields() {
        let mut value = serde_json::to_value(ProgramState::empty()).unwrap();
        value["weeks"][2]["days"][3] = serde_json::json!({ "id": "w3-d3", "water": 1.0 });
        let state = parse_program_state(&value.to_string()).unwrap();
        let day = state.day(DayId::new(3, 3)).unwrap();
        assert_eq!(day.day_name, "Csütörtök");
        assert!((day.water - 1.0).abs() < f64::EPSILON);
        assert!(!day.workout);
    }
}
