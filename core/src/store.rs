use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::models::{DayId, DayPatch, ProgramState};

/// In-memory program document. Every replacement is published to subscribers.
pub struct StateStore {
    tx: watch::Sender<ProgramState>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(ProgramState::empty())
    }
}

impl StateStore {
    #[must_use]
    pub fn new(initial: ProgramState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    #[must_use]
    pub fn current(&self) -> ProgramState {
        self.tx.borrow().clone()
    }

    /// Observe state changes. The receiver starts with the current value marked as seen.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgramState> {
        self.tx.subscribe()
    }

    /// Apply a partial update to one day and return the resulting state.
    ///
    /// Out-of-range values are rejected and leave the state untouched. Unknown
    /// week/day identities produce no change and no notification.
    pub fn update_day(
        &self,
        week_number: u8,
        day_id: DayId,
        patch: &DayPatch,
    ) -> Result<ProgramState> {
        patch
            .validate()
            .with_context(|| format!("Rejected update for day {day_id}"))?;

        let current = self.current();
        let next = current.with_day_update(week_number, day_id, patch);
        if next == current {
            return Ok(current);
        }
        self.tx.send_replace(next.clone());
        Ok(next)
    }

    /// Replace the whole document (import, reset, remote adoption).
    pub fn replace(&self, state: ProgramState) {
        self.tx.send_replace(state);
    }

    /// Notify subscribers without changing the document.
    pub fn touch(&self) {
        self.tx.send_modify(|_| {});
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water(v: f64) -> DayPatch {
        DayPatch {
            water: Some(v),
            ..DayPatch::default()
        }
    }

    #[test]
    fn test_update_day_publishes_change() {
        let store = StateStore::default();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        let next = store.update_day(1, DayId::new(1, 2), &water(1.5)).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), next);
        assert_eq!(store.current(), next);
    }

    #[test]
    fn test_update_unknown_day_does_not_notify() {
        let store = StateStore::default();
        let rx = store.subscribe();
        let out = store.update_day(9, DayId::new(9, 0), &water(1.0)).unwrap();
        assert_eq!(out, ProgramState::empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_invalid_update_leaves_state_untouched() {
        let store = StateStore::default();
        let rx = store.subscribe();
        let patch = DayPatch {
            wellbeing: Some(7),
            ..DayPatch::default()
        };
        let err = store.update_day(1, DayId::new(1, 0), &patch).unwrap_err();
        assert!(format!("{err:#}").contains("wellbeing"));
        assert_eq!(store.current(), ProgramState::empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_replace_and_touch_notify() {
        let store = StateStore::default();
        let mut rx = store.subscribe();

        let replacement = ProgramState::empty().with_day_update(2, DayId::new(2, 0), &water(2.0));
        store.replace(replacement.clone());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), replacement);

        store.touch();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), replacement);
    }
}
