//! Per-agent creation quotas with a rolling 24h reset.
//!
//! Check-and-record is a single `try_record` under the per-agent entry
//! guard, so two concurrent creations can never both pass a last-slot
//! check. Deleting entities is not retroactive: consumption never refunds
//! quota inside the current window.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::id::AgentId;

const RESET_WINDOW_HOURS: i64 = 24;

/// Category limits for one agent, e.g. `food -> 3`.
pub type QuotaLimits = HashMap<String, u32>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaState {
    pub limits: QuotaLimits,
    pub created: HashMap<String, u32>,
    pub last_reset: DateTime<Utc>,
}

impl QuotaState {
    fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            created: HashMap::new(),
            last_reset: Utc::now(),
        }
    }

    fn reset_if_due(&mut self, now: DateTime<Utc>) {
        if now - self.last_reset >= Duration::hours(RESET_WINDOW_HOURS) {
            self.created.clear();
            self.last_reset = now;
        }
    }
}

/// Read-only quota view for one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaInfo {
    pub category: String,
    pub used: u32,
    pub max: u32,
}

impl QuotaInfo {
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }
}

/// All agents' quota states.
#[derive(Debug, Default)]
pub struct QuotaTracker {
    states: DashMap<AgentId, QuotaState>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install limits for an agent, replacing any previous state.
    pub fn set_limits(&self, agent: &AgentId, limits: QuotaLimits) {
        self.states.insert(agent.clone(), QuotaState::new(limits));
    }

    /// Atomically consume one slot of `category` for `agent`.
    ///
    /// A category without a configured limit is unlimited. On success the
    /// usage counter has already been incremented; on `QuotaExceeded` it is
    /// untouched.
    pub fn try_record(&self, agent: &AgentId, category: &str) -> Result<QuotaInfo, WorldError> {
        let mut entry = self
            .states
            .entry(agent.clone())
            .or_insert_with(|| QuotaState::new(QuotaLimits::new()));
        let state = entry.value_mut();
        state.reset_if_due(Utc::now());

        let used = state.created.get(category).copied().unwrap_or(0);
        match state.limits.get(category).copied() {
            Some(max) if used >= max => Err(WorldError::QuotaExceeded {
                category: category.to_string(),
                used,
                max,
            }),
            max => {
                state.created.insert(category.to_string(), used + 1);
                Ok(QuotaInfo {
                    category: category.to_string(),
                    used: used + 1,
                    max: max.unwrap_or(u32::MAX),
                })
            }
        }
    }

    /// Read-only usage view for one category.
    pub fn check(&self, agent: &AgentId, category: &str) -> QuotaInfo {
        let mut entry = self
            .states
            .entry(agent.clone())
            .or_insert_with(|| QuotaState::new(QuotaLimits::new()));
        let state = entry.value_mut();
        state.reset_if_due(Utc::now());
        QuotaInfo {
            category: category.to_string(),
            used: state.created.get(category).copied().unwrap_or(0),
            max: state.limits.get(category).copied().unwrap_or(u32::MAX),
        }
    }

    /// Usage view across every limited category for one agent.
    pub fn check_all(&self, agent: &AgentId) -> Vec<QuotaInfo> {
        let mut entry = self
            .states
            .entry(agent.clone())
            .or_insert_with(|| QuotaState::new(QuotaLimits::new()));
        let state = entry.value_mut();
        state.reset_if_due(Utc::now());
        let mut infos: Vec<QuotaInfo> = state
            .limits
            .iter()
            .map(|(category, max)| QuotaInfo {
                category: category.clone(),
                used: state.created.get(category).copied().unwrap_or(0),
                max: *max,
            })
            .collect();
        infos.sort_by(|a, b| a.category.cmp(&b.category));
        infos
    }

    #[cfg(test)]
    fn backdate_last_reset(&self, agent: &AgentId, hours: i64) {
        if let Some(mut state) = self.states.get_mut(agent) {
            state.last_reset = Utc::now() - Duration::hours(hours);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(pairs: &[(&str, u32)]) -> QuotaLimits {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn records_up_to_the_limit_then_rejects() {
        let tracker = QuotaTracker::new();
        let chef = AgentId::new("chef");
        tracker.set_limits(&chef, limits(&[("food", 3)]));

        for expected in 1..=3 {
            let info = tracker.try_record(&chef, "food").unwrap();
            assert_eq!(info.used, expected);
        }
        let err = tracker.try_record(&chef, "food").unwrap_err();
        assert_eq!(
            err,
            WorldError::QuotaExceeded {
                category: "food".to_string(),
                used: 3,
                max: 3,
            }
        );
        // The failed attempt left the counter unchanged.
        assert_eq!(tracker.check(&chef, "food").used, 3);
    }

    #[test]
    fn unlimited_categories_always_record() {
        let tracker = QuotaTracker::new();
        let chef = AgentId::new("chef");
        tracker.set_limits(&chef, limits(&[("food", 1)]));

        for _ in 0..10 {
            tracker.try_record(&chef, "decorations").unwrap();
        }
        assert_eq!(tracker.check(&chef, "decorations").used, 10);
    }

    #[test]
    fn rolling_window_restores_allowance() {
        let tracker = QuotaTracker::new();
        let chef = AgentId::new("chef");
        tracker.set_limits(&chef, limits(&[("food", 1)]));

        tracker.try_record(&chef, "food").unwrap();
        assert!(tracker.try_record(&chef, "food").is_err());

        tracker.backdate_last_reset(&chef, 25);
        let info = tracker.try_record(&chef, "food").unwrap();
        assert_eq!(info.used, 1);
    }

    #[test]
    fn concurrent_recording_never_overshoots() {
        use std::sync::Arc;

        let tracker = Arc::new(QuotaTracker::new());
        let chef = AgentId::new("chef");
        tracker.set_limits(&chef, limits(&[("tools", 5)]));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = tracker.clone();
                let chef = chef.clone();
                std::thread::spawn(move || tracker.try_record(&chef, "tools").is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 5);
        assert_eq!(tracker.check(&chef, "tools").used, 5);
    }

    #[test]
    fn check_all_lists_limited_categories_sorted() {
        let tracker = QuotaTracker::new();
        let chef = AgentId::new("chef");
        tracker.set_limits(&chef, limits(&[("tools", 2), ("food", 3)]));
        tracker.try_record(&chef, "food").unwrap();

        let infos = tracker.check_all(&chef);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].category, "food");
        assert_eq!(infos[0].used, 1);
        assert_eq!(infos[1].category, "tools");
        assert_eq!(infos[1].remaining(), 2);
    }
}
