use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::io::{self, BufRead, Write};

use diary_core::models::{PROGRAM_WEEKS, parse_weekday};

/// Parse a yes/no flag value. Accepts English and Hungarian words.
pub(crate) fn parse_flag(s: &str) -> Result<bool, String> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" | "igen" | "i" => Ok(true),
        "false" | "no" | "n" | "0" | "off" | "nem" => Ok(false),
        _ => Err(format!("invalid value '{s}', use yes or no")),
    }
}

pub(crate) fn parse_week(s: &str) -> Result<u8, String> {
    let week: u8 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid week '{s}'"))?;
    if !(1..=PROGRAM_WEEKS).contains(&week) {
        return Err(format!("week must be between 1 and {PROGRAM_WEEKS}"));
    }
    Ok(week)
}

pub(crate) fn parse_day(s: &str) -> Result<u8, String> {
    parse_weekday(s).map_err(|e| e.to_string())
}

pub(crate) fn prompt_yes_no(question: &str) -> Result<bool> {
    eprint!("{question} [y/N]: ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let Some(line) = stdin.lock().lines().next() else {
        bail!("No input");
    };
    let line = line.context("Failed to read answer")?;
    Ok(parse_flag(&line).unwrap_or(false))
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn check(value: bool) -> &'static str {
    if value { "✓" } else { "-" }
}

/// Render a 0-5 rating, with 0 shown as not entered.
pub(crate) fn rating(value: u8) -> String {
    if value == 0 {
        "-".to_string()
    } else {
        format!("{value}/5")
    }
}

pub(crate) fn amount(value: f64, unit: &str) -> String {
    if value == 0.0 {
        "-".to_string()
    } else {
        format!("{value:.1} {unit}")
    }
}

pub(crate) fn average(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1} {unit}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
