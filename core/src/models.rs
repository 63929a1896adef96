use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of weeks in the program.
pub const PROGRAM_WEEKS: u8 = 8;
/// Days per week, Monday first.
pub const DAYS_PER_WEEK: u8 = 7;
/// Key of the device-local document.
pub const APP_STORAGE_KEY: &str = "fighter-reset-diary-v1";

/// Upper bound shared by the 1-5 rating fields.
pub const MAX_RATING: u8 = 5;

pub const DAY_NAMES: [&str; 7] = [
    "Hétfő",
    "Kedd",
    "Szerda",
    "Csütörtök",
    "Péntek",
    "Szombat",
    "Vasárnap",
];

const DAY_ABBREVIATIONS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

// --- Day identity ---

/// Composite identity of a day: program week (1-8) and weekday index (0 = Monday).
///
/// Serialized as `w{week}-d{index}`, e.g. `w3-d0` for Monday of week 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayId {
    pub week: u8,
    pub day: u8,
}

impl DayId {
    #[must_use]
    pub const fn new(week: u8, day: u8) -> Self {
        Self { week, day }
    }

    #[must_use]
    pub fn day_name(self) -> &'static str {
        DAY_NAMES.get(usize::from(self.day)).copied().unwrap_or("?")
    }

    #[must_use]
    pub fn is_in_program(self) -> bool {
        (1..=PROGRAM_WEEKS).contains(&self.week) && self.day < DAYS_PER_WEEK
    }
}

impl fmt::Display for DayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}-d{}", self.week, self.day)
    }
}

impl FromStr for DayId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (week, day) = s
            .strip_prefix('w')
            .and_then(|rest| rest.split_once("-d"))
            .with_context(|| format!("Invalid day id '{s}'. Expected 'w<week>-d<day>'"))?;
        let week: u8 = week
            .parse()
            .with_context(|| format!("Invalid week in day id '{s}'"))?;
        let day: u8 = day
            .parse()
            .with_context(|| format!("Invalid weekday in day id '{s}'"))?;
        let id = Self { week, day };
        if !id.is_in_program() {
            bail!("Day id '{s}' is outside the {PROGRAM_WEEKS}-week program");
        }
        Ok(id)
    }
}

impl Serialize for DayId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a weekday given as an index (0-6), an English abbreviation or name, or the
/// program's own day name.
pub fn parse_weekday(s: &str) -> Result<u8> {
    let lower = s.trim().to_lowercase();
    if let Ok(idx) = lower.parse::<u8>() {
        if idx < DAYS_PER_WEEK {
            return Ok(idx);
        }
        bail!("Weekday index must be between 0 (Monday) and 6 (Sunday)");
    }
    let position = DAY_ABBREVIATIONS
        .iter()
        .position(|abbr| lower.starts_with(abbr))
        .or_else(|| DAY_NAMES.iter().position(|n| n.to_lowercase() == lower));
    match position {
        Some(idx) => Ok(idx as u8),
        None => bail!("Invalid weekday '{s}'. Use mon-sun or 0-6"),
    }
}

// --- Records ---

/// The five-part bedtime checklist (10-3-2-1-0 rule).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BedtimeChecklist {
    /// No caffeine in the last 10 hours before bed.
    pub caffeine: bool,
    /// No large meal in the last 3 hours.
    pub meal: bool,
    /// No fluids in the last 2 hours.
    pub fluids: bool,
    /// No screens in the last hour.
    pub screens: bool,
    /// Zero snooze presses in the morning.
    pub snooze: bool,
}

impl BedtimeChecklist {
    #[must_use]
    pub fn any(&self) -> bool {
        self.caffeine || self.meal || self.fluids || self.screens || self.snooze
    }

    #[must_use]
    pub fn count(&self) -> usize {
        [
            self.caffeine,
            self.meal,
            self.fluids,
            self.screens,
            self.snooze,
        ]
        .into_iter()
        .filter(|v| *v)
        .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
    pub id: DayId,
    #[serde(default)]
    pub day_name: String,
    #[serde(default)]
    pub workout: bool,
    /// 0 = not entered, else 1-5.
    #[serde(default)]
    pub nutrition: u8,
    #[serde(default)]
    pub supplements: bool,
    /// Liters.
    #[serde(default)]
    pub water: f64,
    /// Hours.
    #[serde(default)]
    pub sleep: f64,
    #[serde(default, rename = "rule103210")]
    pub bedtime: BedtimeChecklist,
    /// 0-5.
    #[serde(default)]
    pub evening_hunger: u8,
    /// 0 = not entered, else 1-5.
    #[serde(default)]
    pub wellbeing: u8,
    #[serde(default)]
    pub notes: String,
}

impl DayRecord {
    #[must_use]
    pub fn empty(id: DayId) -> Self {
        Self {
            id,
            day_name: id.day_name().to_string(),
            workout: false,
            nutrition: 0,
            supplements: false,
            water: 0.0,
            sleep: 0.0,
            bedtime: BedtimeChecklist::default(),
            evening_hunger: 0,
            wellbeing: 0,
            notes: String::new(),
        }
    }

    /// Whether anything has been entered for this day.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        !self.notes.trim().is_empty()
            || self.sleep != 0.0
            || self.water != 0.0
            || self.nutrition != 0
            || self.wellbeing != 0
            || self.evening_hunger != 0
            || self.workout
            || self.supplements
            || self.bedtime.any()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekRecord {
    pub week_number: u8,
    pub days: Vec<DayRecord>,
}

impl WeekRecord {
    #[must_use]
    pub fn empty(week_number: u8) -> Self {
        Self {
            week_number,
            days: (0..DAYS_PER_WEEK)
                .map(|d| DayRecord::empty(DayId::new(week_number, d)))
                .collect(),
        }
    }
}

/// The whole persisted document: eight weeks of seven days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramState {
    pub weeks: Vec<WeekRecord>,
}

impl Default for ProgramState {
    fn default() -> Self {
        Self::empty()
    }
}

impl ProgramState {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            weeks: (1..=PROGRAM_WEEKS).map(WeekRecord::empty).collect(),
        }
    }

    #[must_use]
    pub fn week(&self, week_number: u8) -> Option<&WeekRecord> {
        self.weeks.iter().find(|w| w.week_number == week_number)
    }

    #[must_use]
    pub fn day(&self, id: DayId) -> Option<&DayRecord> {
        self.week(id.week)?.days.iter().find(|d| d.id == id)
    }

    pub fn days(&self) -> impl Iterator<Item = &DayRecord> {
        self.weeks.iter().flat_map(|w| w.days.iter())
    }

    /// Return a copy with the supplied fields of one day replaced.
    ///
    /// Unknown week numbers or day ids leave the state unchanged.
    #[must_use]
    pub fn with_day_update(&self, week_number: u8, day_id: DayId, patch: &DayPatch) -> Self {
        let mut next = self.clone();
        if let Some(day) = next
            .weeks
            .iter_mut()
            .filter(|w| w.week_number == week_number)
            .flat_map(|w| w.days.iter_mut())
            .find(|d| d.id == day_id)
        {
            patch.apply(day);
        }
        next
    }

    /// Fill in presentation fields a hand-edited or older document may lack.
    pub fn normalize(&mut self) {
        for day in self.weeks.iter_mut().flat_map(|w| w.days.iter_mut()) {
            if day.day_name.is_empty() {
                day.day_name = day.id.day_name().to_string();
            }
        }
    }

    /// Check the fixed program shape and per-field ranges.
    pub fn validate(&self) -> Result<()> {
        if self.weeks.len() != usize::from(PROGRAM_WEEKS) {
            bail!(
                "Expected {PROGRAM_WEEKS} weeks, found {}",
                self.weeks.len()
            );
        }
        for (expected_week, week) in (1..=PROGRAM_WEEKS).zip(&self.weeks) {
            if week.week_number != expected_week {
                bail!(
                    "Week {} is out of order (expected week {expected_week})",
                    week.week_number
                );
            }
            if week.days.len() != usize::from(DAYS_PER_WEEK) {
                bail!(
                    "Week {expected_week} must have {DAYS_PER_WEEK} days, found {}",
                    week.days.len()
                );
            }
            for (idx, day) in (0..DAYS_PER_WEEK).zip(&week.days) {
                let expected = DayId::new(expected_week, idx);
                if day.id != expected {
                    bail!("Day '{}' is out of place (expected '{expected}')", day.id);
                }
                validate_day(day)?;
            }
        }
        Ok(())
    }
}

pub fn validate_day(day: &DayRecord) -> Result<()> {
    let id = day.id;
    validate_rating("nutrition", day.nutrition).with_context(|| format!("day {id}"))?;
    validate_rating("wellbeing", day.wellbeing).with_context(|| format!("day {id}"))?;
    validate_rating("eveningHunger", day.evening_hunger).with_context(|| format!("day {id}"))?;
    validate_amount("water", day.water).with_context(|| format!("day {id}"))?;
    validate_amount("sleep", day.sleep).with_context(|| format!("day {id}"))?;
    Ok(())
}

fn validate_rating(field: &str, value: u8) -> Result<()> {
    if value > MAX_RATING {
        bail!("{field} must be between 0 and {MAX_RATING} (got {value})");
    }
    Ok(())
}

fn validate_amount(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        bail!("{field} must be a non-negative number (got {value})");
    }
    Ok(())
}

// --- Partial updates ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChecklistPatch {
    pub caffeine: Option<bool>,
    pub meal: Option<bool>,
    pub fluids: Option<bool>,
    pub screens: Option<bool>,
    pub snooze: Option<bool>,
}

impl ChecklistPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caffeine.is_none()
            && self.meal.is_none()
            && self.fluids.is_none()
            && self.screens.is_none()
            && self.snooze.is_none()
    }
}

/// A partial day update: only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DayPatch {
    pub workout: Option<bool>,
    pub nutrition: Option<u8>,
    pub supplements: Option<bool>,
    pub water: Option<f64>,
    pub sleep: Option<f64>,
    #[serde(rename = "rule103210")]
    pub bedtime: ChecklistPatch,
    pub evening_hunger: Option<u8>,
    pub wellbeing: Option<u8>,
    pub notes: Option<String>,
}

impl DayPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workout.is_none()
            && self.nutrition.is_none()
            && self.supplements.is_none()
            && self.water.is_none()
            && self.sleep.is_none()
            && self.bedtime.is_empty()
            && self.evening_hunger.is_none()
            && self.wellbeing.is_none()
            && self.notes.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(v) = self.nutrition {
            validate_rating("nutrition", v)?;
        }
        if let Some(v) = self.wellbeing {
            validate_rating("wellbeing", v)?;
        }
        if let Some(v) = self.evening_hunger {
            validate_rating("eveningHunger", v)?;
        }
        if let Some(v) = self.water {
            validate_amount("water", v)?;
        }
        if let Some(v) = self.sleep {
            validate_amount("sleep", v)?;
        }
        Ok(())
    }

    pub fn apply(&self, day: &mut DayRecord) {
        if let Some(v) = self.workout {
            day.workout = v;
        }
        if let Some(v) = self.nutrition {
            day.nutrition = v;
        }
        if let Some(v) = self.supplements {
            day.supplements = v;
        }
        if let Some(v) = self.water {
            day.water = v;
        }
        if let Some(v) = self.sleep {
            day.sleep = v;
        }
        if let Some(v) = self.bedtime.caffeine {
            day.bedtime.caffeine = v;
        }
        if let Some(v) = self.bedtime.meal {
            day.bedtime.meal = v;
        }
        if let Some(v) = self.bedtime.fluids {
            day.bedtime.fluids = v;
        }
        if let Some(v) = self.bedtime.screens {
            day.bedtime.screens = v;
        }
        if let Some(v) = self.bedtime.snooze {
            day.bedtime.snooze = v;
        }
        if let Some(v) = self.evening_hunger {
            day.evening_hunger = v;
        }
        if let Some(v) = self.wellbeing {
            day.wellbeing = v;
        }
        if let Some(ref v) = self.notes {
            day.notes.clone_from(v);
        }
    }
}

// --- Accounts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Admin,
}

impl Role {
    /// Admins act as coaches and may read every client's diary.
    #[must_use]
    pub fn is_coach(self) -> bool {
        matches!(self, Self::Admin)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "admin" | "coach" => Ok(Self::Admin),
            _ => bail!("Invalid role '{s}'. Use 'client' or 'admin'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub created_at: String,
}

/// One remote row: a user's whole program document plus its write stamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredState {
    pub user_id: String,
    pub data: ProgramState,
    pub updated_at: String,
}

/// Credentials accepted by sign-in and sign-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Result of a successful sign-in or sign-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub token: String,
}

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn validate_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        bail!("Invalid email address '{email}'");
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("Password should be at least {MIN_PASSWORD_LEN} characters");
    }
    Ok(())
}
