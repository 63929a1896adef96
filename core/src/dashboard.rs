use serde::Serialize;

use crate::models::{DayId, DayRecord, ProgramState, WeekRecord};

/// Number of trailing series points shown in the ratings chart.
pub const RECENT_POINTS: usize = 14;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub id: DayId,
    pub label: String,
    pub water: f64,
    pub sleep: f64,
    pub nutrition: u8,
    pub wellbeing: u8,
    pub workout: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekSummary {
    pub week_number: u8,
    pub filled_days: usize,
    pub total_days: usize,
    pub workouts: usize,
    pub avg_sleep: Option<f64>,
    pub avg_water: Option<f64>,
    pub avg_nutrition: Option<f64>,
    pub avg_wellbeing: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub workout_days: usize,
    /// Mean over days with sleep logged; `None` when no day has any.
    pub avg_sleep: Option<f64>,
    pub avg_water: Option<f64>,
    pub filled_days: usize,
    pub total_days: usize,
    /// Days with water logged or a workout, in program order.
    pub series: Vec<TrendPoint>,
    pub recent_ratings: Vec<TrendPoint>,
    pub weeks: Vec<WeekSummary>,
}

impl ProgressSummary {
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.filled_days > 0
    }
}

/// Mean of the non-zero values, `None` when there are none.
fn mean_nonzero(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| *v != 0.0)
        .fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / f64::from(count))
    }
}

fn trend_label(day: &DayRecord) -> String {
    let initial = day.day_name.chars().next().unwrap_or('?');
    format!("{}. hét {initial}.", day.id.week)
}

#[must_use]
pub fn week_summary(week: &WeekRecord) -> WeekSummary {
    let days = &week.days;
    WeekSummary {
        week_number: week.week_number,
        filled_days: days.iter().filter(|d| d.is_filled()).count(),
        total_days: days.len(),
        workouts: days.iter().filter(|d| d.workout).count(),
        avg_sleep: mean_nonzero(days.iter().map(|d| d.sleep)),
        avg_water: mean_nonzero(days.iter().map(|d| d.water)),
        avg_nutrition: mean_nonzero(days.iter().map(|d| f64::from(d.nutrition))),
        avg_wellbeing: mean_nonzero(days.iter().map(|d| f64::from(d.wellbeing))),
    }
}

#[must_use]
pub fn summarize(state: &ProgramState) -> ProgressSummary {
    let series: Vec<TrendPoint> = state
        .days()
        .filter(|d| d.water > 0.0 || d.workout)
        .map(|d| TrendPoint {
            id: d.id,
            label: trend_label(d),
            water: d.water,
            sleep: d.sleep,
            nutrition: d.nutrition,
            wellbeing: d.wellbeing,
            workout: d.workout,
        })
        .collect();
    let recent_ratings = series[series.len().saturating_sub(RECENT_POINTS)..].to_vec();

    ProgressSummary {
        workout_days: state.days().filter(|d| d.workout).count(),
        avg_sleep: mean_nonzero(state.days().map(|d| d.sleep)),
        avg_water: mean_nonzero(state.days().map(|d| d.water)),
        filled_days: state.days().filter(|d| d.is_filled()).count(),
        total_days: state.days().count(),
        series,
        recent_ratings,
        weeks: state.weeks.iter().map(week_summary).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DayPatch;

    fn with_week_one(f: impl Fn(u8) -> DayPatch) -> ProgramState {
        (0..7).fold(ProgramState::empty(), |state, d| {
            state.with_day_update(1, DayId::new(1, d), &f(d))
        })
    }

    #[test]
    fn test_empty_program_has_no_averages() {
        let summary = summarize(&ProgramState::empty());
        assert_eq!(summary.workout_days, 0);
        assert_eq!(summary.avg_sleep, None);
        assert_eq!(summary.avg_water, None);
        assert!(summary.series.is_empty());
        assert_eq!(summary.total_days, 56);
        assert!(!summary.has_data());
        assert_eq!(summary.weeks.len(), 8);
    }

    #[test]
    fn test_water_mean_ignores_zero_days() {
        let water = [0.0, 2.0, 2.0, 0.0, 0.0, 0.0, 0.0];
        let state = with_week_one(|d| DayPatch {
            water: Some(water[usize::from(d)]),
            ..DayPatch::default()
        });
        let summary = summarize(&state);
        assert_eq!(summary.avg_water, Some(2.0));
        assert_eq!(summary.avg_sleep, None);
        assert_eq!(summary.series.len(), 2);
        assert_eq!(summary.weeks[0].avg_water, Some(2.0));
        assert_eq!(summary.weeks[0].filled_days, 2);
    }

    #[test]
    fn test_workouts_and_series() {
        let state = with_week_one(|d| DayPatch {
            workout: Some(d % 2 == 0),
            sleep: Some(7.0),
            ..DayPatch::default()
        });
        let summary = summarize(&state);
        assert_eq!(summary.workout_days, 4);
        assert_eq!(summary.series.len(), 4);
        assert_eq!(summary.series[0].label, "1. hét H.");
        assert_eq!(summary.avg_sleep, Some(7.0));
        assert_eq!(summary.filled_days, 7);
        assert_eq!(summary.weeks[0].workouts, 4);
        assert_eq!(summary.weeks[1].workouts, 0);
    }

    #[test]
    fn test_recent_ratings_keeps_last_points() {
        let state = (1..=3).fold(ProgramState::empty(), |state, w| {
            (0..7).fold(state, |state, d| {
                state.with_day_update(
                    w,
                    DayId::new(w, d),
                    &DayPatch {
                        water: Some(1.0),
                        ..DayPatch::default()
                    },
                )
            })
        });
        let summary = summarize(&state);
        assert_eq!(summary.series.len(), 21);
        assert_eq!(summary.recent_ratings.len(), RECENT_POINTS);
        assert_eq!(summary.recent_ratings[0].id, DayId::new(2, 0));
        assert_eq!(summary.recent_ratings[13].id, DayId::new(3, 6));
    }

    #[test]
    fn test_week_rating_means() {
        let state = with_week_one(|d| DayPatch {
            nutrition: Some(if d < 2 { 4 } else { 0 }),
            wellbeing: Some(if d == 0 { 5 } else { 0 }),
            ..DayPatch::default()
        });
        let week = week_summary(&state.weeks[0]);
        assert_eq!(week.avg_nutrition, Some(4.0));
        assert_eq!(week.avg_wellbeing, Some(5.0));
        assert_eq!(week.filled_days, 2);
        assert_eq!(week.total_days, 7);
    }
}
