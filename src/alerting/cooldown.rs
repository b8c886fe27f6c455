use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};

/// Returns true while `now - last` is shorter than `cooldown_seconds`.
/// A cooldown of zero never holds.
pub fn within_cooldown(last: DateTime<Utc>, now: DateTime<Utc>, cooldown_seconds: u64) -> bool {
    if cooldown_seconds == 0 {
        return false;
    }
    let cooldown = i64::try_from(cooldown_seconds).unwrap_or(i64::MAX);
    // num_seconds truncates toward zero, so 299.9s elapsed still counts as inside a 300s cooldown.
    (now - last).num_seconds() < cooldown
}

/// Seconds left before a cooldown started at `last` expires.
pub fn remaining_cooldown(last: DateTime<Utc>, now: DateTime<Utc>, cooldown_seconds: u64) -> u64 {
    let elapsed = (now - last).num_seconds().max(0) as u64;
    cooldown_seconds.saturating_sub(elapsed)
}

/// Last-fired timestamps per rule id, shared by the metric evaluator and the
/// log matcher. Rule ids are unique across both rule kinds.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_fired: DashMap<String, DateTime<Utc>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_suppress(&self, rule_id: &str, cooldown_seconds: u64, now: DateTime<Utc>) -> bool {
        self.last_fired
            .get(rule_id)
            .is_some_and(|last| within_cooldown(*last, now, cooldown_seconds))
    }

    pub fn record_fired(&self, rule_id: &str, now: DateTime<Utc>) {
        self.last_fired.insert(rule_id.to_string(), now);
    }

    /// Checks and records under the same entry lock. Returns false when the
    /// rule is still cooling down.
    pub fn try_fire(&self, rule_id: &str, cooldown_seconds: u64, now: DateTime<Utc>) -> bool {
        match self.last_fired.entry(rule_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if within_cooldown(*entry.get(), now, cooldown_seconds) {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    pub fn last_fired(&self, rule_id: &str) -> Option<DateTime<Utc>> {
        self.last_fired.get(rule_id).map(|last| *last)
    }

    pub fn clear(&self) {
        self.last_fired.clear();
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }
}
