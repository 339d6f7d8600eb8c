// src/ingest/budget.rs
//
// Per-source daily call budgets, persisted across runs. The scheduler
// guarantees runs never overlap, so the file is read once at run start and
// written back at run end (single writer).

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::writer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetState {
    /// Day the counters belong to; a new day resets all of them.
    pub day: NaiveDate,
    /// source_id → calls consumed today.
    pub used: BTreeMap<String, u32>,
}

impl BudgetState {
    pub fn fresh(today: NaiveDate) -> Self {
        Self {
            day: today,
            used: BTreeMap::new(),
        }
    }

    /// Read persisted counters. Missing or unreadable state starts fresh;
    /// a stored day other than `today` resets the counters.
    pub fn load(path: &Path, today: NaiveDate) -> Self {
        let stored: Option<BudgetState> = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(state) => Some(state),
                Err(e) => {
                    tracing::warn!(error = ?e, path = %path.display(), "budget state unreadable, resetting");
                    None
                }
            });
        match stored {
            Some(state) if state.day == today => state,
            _ => Self::fresh(today),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        writer::write_json_atomic(path, self)
            .with_context(|| format!("writing budget state to {}", path.display()))
    }

    pub fn used(&self, source_id: &str) -> u32 {
        self.used.get(source_id).copied().unwrap_or(0)
    }

    /// Consume `units` from the source's daily budget. Returns false (and
    /// consumes nothing) when fewer than `units` calls remain under `limit`.
    pub fn try_consume(&mut self, source_id: &str, units: u32, limit: u32) -> bool {
        let current = self.used(source_id);
        if current.saturating_add(units) > limit {
            return false;
        }
        self.used.insert(source_id.to_string(), current + units);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn consume_up_to_limit_then_refuse() {
        let mut state = BudgetState::fresh(day("2025-07-01"));
        assert!(state.try_consume("prices", 9, 25));
        assert!(state.try_consume("prices", 9, 25));
        // 18 used, 9 more would exceed 25
        assert!(!state.try_consume("prices", 9, 25));
        assert_eq!(state.used("prices"), 18);
        // a smaller request still fits
        assert!(state.try_consume("prices", 7, 25));
        assert_eq!(state.used("prices"), 25);
    }

    #[test]
    fn sources_are_independent() {
        let mut state = BudgetState::fresh(day("2025-07-01"));
        assert!(state.try_consume("prices", 25, 25));
        assert!(state.try_consume("grid_status", 8, 200));
        assert!(!state.try_consume("prices", 1, 25));
        assert!(state.try_consume("grid_status", 8, 200));
    }

    #[test]
    fn reload_same_day_keeps_counters_new_day_resets() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state").join("rate_budgets.json");

        let mut state = BudgetState::fresh(day("2025-07-01"));
        state.try_consume("prices", 12, 25);
        state.save(&path).unwrap();

        let same_day = BudgetState::load(&path, day("2025-07-01"));
        assert_eq!(same_day.used("prices"), 12);

        let next_day = BudgetState::load(&path, day("2025-07-02"));
        assert_eq!(next_day.used("prices"), 0);
    }

    #[test]
    fn missing_or_corrupt_state_starts_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.json");
        assert_eq!(BudgetState::load(&missing, day("2025-07-01")).used("x"), 0);

        let corrupt = tmp.path().join("bad.json");
        std::fs::write(&corrupt, "]]").unwrap();
        assert_eq!(BudgetState::load(&corrupt, day("2025-07-01")).used("x"), 0);
    }
}
