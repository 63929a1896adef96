use anyhow::{Context, Result, bail};
use clap::Args;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crate::config::Config;
use diary_core::dashboard::{ProgressSummary, WeekSummary, week_summary};
use diary_core::models::{ChecklistPatch, DayId, DayPatch, DayRecord, WeekRecord};

use super::helpers::{amount, average, check, json_error, parse_flag, rating, truncate};
use super::{DiarySession, open_session, save_now};
use diary_core::service::Identity;

/// Fields accepted by `diary log`. Only the given ones are changed.
#[derive(Args, Debug, Default)]
pub(crate) struct LogFields {
    /// Trained today (yes/no)
    #[arg(long, value_parser = parse_flag)]
    workout: Option<bool>,
    /// Nutrition rating 1-5 (0 clears)
    #[arg(long)]
    nutrition: Option<u8>,
    /// Took supplements (yes/no)
    #[arg(long, value_parser = parse_flag)]
    supplements: Option<bool>,
    /// Water in liters
    #[arg(long)]
    water: Option<f64>,
    /// Sleep in hours
    #[arg(long)]
    sleep: Option<f64>,
    /// No caffeine 10 hours before bed (yes/no)
    #[arg(long, value_parser = parse_flag)]
    caffeine: Option<bool>,
    /// No big meal 3 hours before bed (yes/no)
    #[arg(long, value_parser = parse_flag)]
    meal: Option<bool>,
    /// No fluids 2 hours before bed (yes/no)
    #[arg(long, value_parser = parse_flag)]
    fluids: Option<bool>,
    /// No screens 1 hour before bed (yes/no)
    #[arg(long, value_parser = parse_flag)]
    screens: Option<bool>,
    /// Zero snooze presses (yes/no)
    #[arg(long, value_parser = parse_flag)]
    snooze: Option<bool>,
    /// Evening hunger 0-5
    #[arg(long)]
    hunger: Option<u8>,
    /// Wellbeing rating 1-5 (0 clears)
    #[arg(long)]
    wellbeing: Option<u8>,
    /// Free-text notes (replaces existing notes)
    #[arg(long)]
    notes: Option<String>,
}

impl LogFields {
    fn into_patch(self) -> DayPatch {
        DayPatch {
            workout: self.workout,
            nutrition: self.nutrition,
            supplements: self.supplements,
            water: self.water,
            sleep: self.sleep,
            bedtime: ChecklistPatch {
                caffeine: self.caffeine,
                meal: self.meal,
                fluids: self.fluids,
                screens: self.screens,
                snooze: self.snooze,
            },
            evening_hunger: self.hunger,
            wellbeing: self.wellbeing,
            notes: self.notes,
        }
    }
}

// --- Shared renderers ---

/// Where the open diary lives: the account email or this device.
fn owner_label(session: &DiarySession) -> String {
    match session.identity() {
        Identity::SignedIn(profile) => profile.email.clone(),
        Identity::Anonymous => "this device".to_string(),
    }
}

pub(super) fn print_week_table(week: &WeekRecord) {
    #[derive(Tabled)]
    struct DayRow {
        #[tabled(rename = "Day")]
        day: String,
        #[tabled(rename = "Workout")]
        workout: &'static str,
        #[tabled(rename = "Nutrition")]
        nutrition: String,
        #[tabled(rename = "Suppl.")]
        supplements: &'static str,
        #[tabled(rename = "Water")]
        water: String,
        #[tabled(rename = "Sleep")]
        sleep: String,
        #[tabled(rename = "10-3-2-1-0")]
        bedtime: String,
        #[tabled(rename = "Hunger")]
        hunger: String,
        #[tabled(rename = "Wellbeing")]
        wellbeing: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let rows: Vec<DayRow> = week
        .days
        .iter()
        .map(|d| DayRow {
            day: d.day_name.clone(),
            workout: check(d.workout),
            nutrition: rating(d.nutrition),
            supplements: check(d.supplements),
            water: amount(d.water, "l"),
            sleep: amount(d.sleep, "h"),
            bedtime: format!("{}/5", d.bedtime.count()),
            hunger: d.evening_hunger.to_string(),
            wellbeing: rating(d.wellbeing),
            notes: truncate(d.notes.trim(), 30),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(super) fn print_week_footer(summary: &WeekSummary) {
    println!(
        "  {}/{} days filled | {} workouts | sleep avg {} | water avg {}",
        summary.filled_days,
        summary.total_days,
        summary.workouts,
        average(summary.avg_sleep, "h"),
        average(summary.avg_water, "l"),
    );
}

pub(super) fn print_day_detail(day: &DayRecord) {
    #[derive(Tabled)]
    struct FieldRow {
        #[tabled(rename = "Field")]
        field: &'static str,
        #[tabled(rename = "Value")]
        value: String,
    }

    let b = &day.bedtime;
    let rows = vec![
        FieldRow {
            field: "Workout",
            value: check(day.workout).to_string(),
        },
        FieldRow {
            field: "Nutrition",
            value: rating(day.nutrition),
        },
        FieldRow {
            field: "Supplements",
            value: check(day.supplements).to_string(),
        },
        FieldRow {
            field: "Water",
            value: amount(day.water, "l"),
        },
        FieldRow {
            field: "Sleep",
            value: amount(day.sleep, "h"),
        },
        FieldRow {
            field: "No caffeine (10h)",
            value: check(b.caffeine).to_string(),
        },
        FieldRow {
            field: "No big meal (3h)",
            value: check(b.meal).to_string(),
        },
        FieldRow {
            field: "No fluids (2h)",
            value: check(b.fluids).to_string(),
        },
        FieldRow {
            field: "No screens (1h)",
            value: check(b.screens).to_string(),
        },
        FieldRow {
            field: "No snooze",
            value: check(b.snooze).to_string(),
        },
        FieldRow {
            field: "Evening hunger",
            value: format!("{}/5", day.evening_hunger),
        },
        FieldRow {
            field: "Wellbeing",
            value: rating(day.wellbeing),
        },
        FieldRow {
            field: "Notes",
            value: day.notes.clone(),
        },
    ];

    println!("=== {} ({}. hét) ===\n", day.day_name, day.id.week);
    println!("{}", Table::new(&rows).with(Style::rounded()));
}

pub(super) fn print_progress(summary: &ProgressSummary) {
    #[derive(Tabled)]
    struct WeekRow {
        #[tabled(rename = "Week")]
        week: u8,
        #[tabled(rename = "Filled")]
        filled: String,
        #[tabled(rename = "Workouts")]
        workouts: usize,
        #[tabled(rename = "Sleep")]
        sleep: String,
        #[tabled(rename = "Water")]
        water: String,
        #[tabled(rename = "Nutrition")]
        nutrition: String,
        #[tabled(rename = "Wellbeing")]
        wellbeing: String,
    }

    println!("  Workouts:      {} days", summary.workout_days);
    println!("  Average sleep: {}", average(summary.avg_sleep, "h"));
    println!("  Average water: {}", average(summary.avg_water, "l"));
    println!(
        "  Filled days:   {}/{}\n",
        summary.filled_days, summary.total_days
    );

    let rows: Vec<WeekRow> = summary
        .weeks
        .iter()
        .map(|w| WeekRow {
            week: w.week_number,
            filled: format!("{}/{}", w.filled_days, w.total_days),
            workouts: w.workouts,
            sleep: average(w.avg_sleep, "h"),
            water: average(w.avg_water, "l"),
            nutrition: average(w.avg_nutrition, ""),
            wellbeing: average(w.avg_wellbeing, ""),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    if !summary.recent_ratings.is_empty() {
        println!("\n  Recent days (nutrition / wellbeing):");
        for point in &summary.recent_ratings {
            println!(
                "    {:<14} {:>4} {:>4}",
                point.label,
                rating(point.nutrition),
                rating(point.wellbeing)
            );
        }
    }
}

// --- Commands ---

pub(crate) async fn cmd_week(config: &Config, week_number: u8, json: bool) -> Result<()> {
    let session = open_session(config).await?;
    let state = session.state();
    let week = state
        .week(week_number)
        .with_context(|| format!("Week {week_number} not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(week)?);
        return Ok(());
    }

    println!("=== {week_number}. hét ===\n");
    print_week_table(week);
    print_week_footer(&week_summary(week));
    Ok(())
}

pub(crate) async fn cmd_day(config: &Config, week_number: u8, day: u8, json: bool) -> Result<()> {
    let session = open_session(config).await?;
    let id = DayId::new(week_number, day);
    let state = session.state();
    let Some(record) = state.day(id) else {
        if json {
            println!("{}", json_error(&format!("Day {id} not found")));
            return Ok(());
        }
        bail!("Day {id} not found");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        print_day_detail(record);
    }
    Ok(())
}

pub(crate) async fn cmd_log(
    config: &Config,
    week_number: u8,
    day: u8,
    fields: LogFields,
    json: bool,
) -> Result<()> {
    let patch = fields.into_patch();
    if patch.is_empty() {
        bail!("Nothing to log. Pass at least one field, e.g. --workout yes or --water 2");
    }
    patch.validate()?;

    let session = open_session(config).await?;
    let id = DayId::new(week_number, day);
    let before = session.state();
    let after = session.update_day(week_number, id, &patch)?;
    let record = after
        .day(id)
        .with_context(|| format!("Day {id} not found"))?;

    if after == before {
        if json {
            println!("{}", serde_json::to_string_pretty(record)?);
        } else {
            println!("No changes for {} ({}. hét)", record.day_name, week_number);
        }
        return Ok(());
    }

    let saved_at = save_now(&session).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        println!(
            "Logged {} ({}. hét), saved to {} at {saved_at}",
            record.day_name,
            week_number,
            owner_label(&session)
        );
    }
    Ok(())
}

pub(crate) async fn cmd_progress(config: &Config, json: bool) -> Result<()> {
    let session = open_session(config).await?;
    let summary = session.progress();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if !summary.has_data() {
        println!("Start filling in the diary to see statistics.");
        return Ok(());
    }
    println!("Diary of {}\n", owner_label(&session));
    print_progress(&summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_fields_map_to_patch() {
        let fields = LogFields {
            workout: Some(true),
            hunger: Some(2),
            snooze: Some(false),
            notes: Some("ok".to_string()),
            ..LogFields::default()
        };
        let patch = fields.into_patch();
        assert_eq!(patch.workout, Some(true));
        assert_eq!(patch.evening_hunger, Some(2));
        assert_eq!(patch.bedtime.snooze, Some(false));
        assert_eq!(patch.bedtime.caffeine, None);
        assert_eq!(patch.notes.as_deref(), Some("ok"));
        assert!(patch.water.is_none());
    }

    #[tokio::test]
    async fn test_signed_out_diary_is_labelled_as_device() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        let session = open_session(&config).await.unwrap();
        assert_eq!(owner_label(&session), "this device");
        session.sign_out();

        let fields = LogFields {
            sleep: Some(7.0),
            ..LogFields::default()
        };
        cmd_log(&config, 1, 2, fields, false).await.unwrap();
        let reopened = open_session(&config).await.unwrap();
        assert!(reopened.state().day(DayId::new(1, 2)).unwrap().is_filled());
    }

    #[test]
    fn test_empty_log_fields_are_empty_patch() {
        assert!(LogFields::default().into_patch().is_empty());
    }
}
