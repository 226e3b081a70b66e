use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tradeloop_models::Quota;

const MINUTE_MS: u64 = 60_000;
const DAY_MS: u64 = 86_400_000;

/// Which window a throttled call hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateScope {
    Minute,
    Day,
    ToolMinute,
}

impl std::fmt::Display for RateScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RateScope::Minute => "per-minute",
            RateScope::Day => "per-day",
            RateScope::ToolMinute => "per-tool per-minute",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttled {
    pub scope: RateScope,
    pub retry_after_ms: u64,
}

/// Counter for one fixed window, aligned to multiples of its length since the epoch.
#[derive(Debug, Clone, Copy, Default)]
struct Window {
    start_ms: u64,
    count: u32,
}

impl Window {
    fn roll(&mut self, now_ms: u64, length_ms: u64) {
        let start = now_ms - now_ms % length_ms;
        if start != self.start_ms {
            self.start_ms = start;
            self.count = 0;
        }
    }

    /// Throttled if the window is full. Zero = unlimited.
    fn check(
        &self,
        limit: u32,
        now_ms: u64,
        length_ms: u64,
        scope: RateScope,
    ) -> Result<(), Throttled> {
        if limit == 0 || self.count < limit {
            return Ok(());
        }
        Err(Throttled {
            scope,
            retry_after_ms: (self.start_ms + length_ms).saturating_sub(now_ms),
        })
    }
}

#[derive(Debug, Default)]
struct AgentWindows {
    minute: Window,
    day: Window,
    per_tool: HashMap<String, Window>,
}

/// Fixed-window call limiter keyed by agent (global windows) and by agent + tool.
///
/// Each agent has its own lock, so check-then-increment for one agent is a
/// single critical section and agents never contend with each other.
#[derive(Debug, Default)]
pub struct RateLimiter {
    agents: Mutex<HashMap<String, Arc<Mutex<AgentWindows>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call at `now_ms` unless any window is full. A rejected call is not counted.
    pub fn check_and_record_at(
        &self,
        agent_id: &str,
        tool_id: &str,
        quota: &Quota,
        now_ms: u64,
    ) -> Result<(), Throttled> {
        let entry = {
            let mut agents = lock(&self.agents);
            agents.entry(agent_id.to_string()).or_default().clone()
        };
        let mut guard = lock(&entry);
        let windows = &mut *guard;

        windows.minute.roll(now_ms, MINUTE_MS);
        windows.day.roll(now_ms, DAY_MS);
        windows
            .minute
            .check(quota.max_calls_per_minute, now_ms, MINUTE_MS, RateScope::Minute)?;
        windows
            .day
            .check(quota.max_calls_per_day, now_ms, DAY_MS, RateScope::Day)?;

        let tool_limit = quota.max_calls_per_tool_per_minute.unwrap_or(0);
        if tool_limit > 0 {
            let tool = windows.per_tool.entry(tool_id.to_string()).or_default();
            tool.roll(now_ms, MINUTE_MS);
            tool.check(tool_limit, now_ms, MINUTE_MS, RateScope::ToolMinute)?;
            tool.count += 1;
        }

        windows.minute.count += 1;
        windows.day.count += 1;
        Ok(())
    }

    /// Drop all windows for an agent.
    pub fn forget(&self, agent_id: &str) {
        lock(&self.agents).remove(agent_id);
    }

    pub fn tracked_agents(&self) -> usize {
        lock(&self.agents).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(per_minute: u32, per_day: u32, per_tool: Option<u32>) -> Quota {
        Quota {
            max_calls_per_minute: per_minute,
            max_calls_per_day: per_day,
            max_calls_per_tool_per_minute: per_tool,
        }
    }

    // Start of some minute well after the epoch.
    const T0: u64 = 1_800_000_000_000 - 1_800_000_000_000 % MINUTE_MS;

    #[test]
    fn n_plus_one_in_window_is_throttled_then_allowed_after_rollover() {
        let limiter = RateLimiter::new();
        let quota = quota(3, 0, None);

        for i in 0..3 {
            assert!(limiter
                .check_and_record_at("agent-1", "t", &quota, T0 + i * 1_000)
                .is_ok());
        }

        let throttled = limiter
            .check_and_record_at("agent-1", "t", &quota, T0 + 10_000)
            .unwrap_err();
        assert_eq!(throttled.scope, RateScope::Minute);
        assert_eq!(throttled.retry_after_ms, 50_000);

        assert!(limiter
            .check_and_record_at("agent-1", "t", &quota, T0 + MINUTE_MS)
            .is_ok());
    }

    #[test]
    fn agents_do_not_share_windows() {
        let limiter = RateLimiter::new();
        let quota = quota(1, 0, None);
        assert!(limiter.check_and_record_at("a", "t", &quota, T0).is_ok());
        assert!(limiter.check_and_record_at("b", "t", &quota, T0).is_ok());
        assert!(limiter.check_and_record_at("a", "t", &quota, T0 + 1).is_err());
        assert_eq!(limiter.tracked_agents(), 2);
    }

    #[test]
    fn zero_means_unlimited() {
        let limiter = RateLimiter::new();
        let quota = quota(0, 0, Some(0));
        for i in 0..500 {
            assert!(limiter.check_and_record_at("a", "t", &quota, T0 + i).is_ok());
        }
    }

    #[test]
    fn per_tool_window_is_independent_per_tool() {
        let limiter = RateLimiter::new();
        let quota = quota(10, 0, Some(2));
        assert!(limiter.check_and_record_at("a", "x", &quota, T0).is_ok());
        assert!(limiter.check_and_record_at("a", "x", &quota, T0 + 1).is_ok());

        let throttled = limiter
            .check_and_record_at("a", "x", &quota, T0 + 2)
            .unwrap_err();
        assert_eq!(throttled.scope, RateScope::ToolMinute);
        assert!(limiter.check_and_record_at("a", "y", &quota, T0 + 3).is_ok());
    }

    #[test]
    fn rejected_calls_are_not_counted() {
        let limiter = RateLimiter::new();
        let quota = quota(0, 2, Some(1));
        assert!(limiter.check_and_record_at("a", "x", &quota, T0).is_ok());
        // Tool window full; the day counter must not move.
        assert!(limiter.check_and_record_at("a", "x", &quota, T0 + 1).is_err());
        assert!(limiter.check_and_record_at("a", "y", &quota, T0 + 2).is_ok());

        let throttled = limiter
            .check_and_record_at("a", "z", &quota, T0 + 3)
            .unwrap_err();
        assert_eq!(throttled.scope, RateScope::Day);
    }

    #[test]
    fn forget_resets_agent() {
        let limiter = RateLimiter::new();
        let quota = quota(1, 0, None);
        assert!(limiter.check_and_record_at("a", "t", &quota, T0).is_ok());
        limiter.forget("a");
        assert!(limiter.check_and_record_at("a", "t", &quota, T0 + 1).is_ok());
    }
}
