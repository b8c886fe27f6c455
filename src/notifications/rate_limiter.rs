use chrono::{DateTime, FixedOffset, Local, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::info;

use super::models::ChannelKind;
use crate::alerting::cooldown::{remaining_cooldown, within_cooldown};

/// Why a reservation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimited {
    Cooldown { remaining_seconds: u64 },
    DailyLimit { cap: u32 },
}

#[derive(Debug, Default)]
struct RateLimitState {
    cooldown_by_rule_id: HashMap<String, DateTime<Utc>>,
    daily_count: u32,
    last_reset_date_key: String,
}

/// Per-channel send budget: a cooldown per rule plus a daily cap that resets
/// at local midnight. Reservations are taken before the send is attempted and
/// are not refunded when the send fails.
#[derive(Debug)]
pub struct ChannelRateLimiter {
    channel: ChannelKind,
    /// Timezone for the daily reset; `None` uses the host's local time.
    utc_offset: Option<FixedOffset>,
    state: Mutex<RateLimitState>,
}

impl ChannelRateLimiter {
    pub fn new(channel: ChannelKind) -> Self {
        Self {
            channel,
            utc_offset: None,
            state: Mutex::new(RateLimitState::default()),
        }
    }

    /// Pins the daily reset to a fixed offset instead of the host timezone.
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = Some(offset);
        self
    }

    pub fn channel(&self) -> ChannelKind {
        self.channel
    }

    pub fn check_and_reserve(
        &self,
        rule_id: &str,
        now: DateTime<Utc>,
        cooldown_seconds: u64,
        daily_cap: u32,
    ) -> bool {
        self.try_reserve(rule_id, now, cooldown_seconds, daily_cap)
            .is_ok()
    }

    pub fn try_reserve(
        &self,
        rule_id: &str,
        now: DateTime<Utc>,
        cooldown_seconds: u64,
        daily_cap: u32,
    ) -> Result<(), RateLimited> {
        let today = self.date_key(now);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.last_reset_date_key != today {
            if !state.last_reset_date_key.is_empty() {
                info!(
                    channel = %self.channel,
                    previous_count = state.daily_count,
                    date = %today,
                    "Daily send count reset."
                );
            }
            state.daily_count = 0;
            state.last_reset_date_key = today;
        }

        if state.daily_count >= daily_cap {
            return Err(RateLimited::DailyLimit { cap: daily_cap });
        }

        if let Some(last_sent) = state.cooldown_by_rule_id.get(rule_id) {
            if within_cooldown(*last_sent, now, cooldown_seconds) {
                return Err(RateLimited::Cooldown {
                    remaining_seconds: remaining_cooldown(*last_sent, now, cooldown_seconds),
                });
            }
        }

        state.cooldown_by_rule_id.insert(rule_id.to_string(), now);
        state.daily_count += 1;
        Ok(())
    }

    /// Sends reserved on the current date key (not reset by reading).
    pub fn daily_count(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .daily_count
    }

    fn date_key(&self, now: DateTime<Utc>) -> String {
        match self.utc_offset {
            Some(offset) => now.with_timezone(&offset).format("%Y-%m-%d").to_string(),
            None => now.with_timezone(&Local).format("%Y-%m-%d").to_string(),
        }
    }
}
