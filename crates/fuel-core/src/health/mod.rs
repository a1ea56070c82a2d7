//! Health Tracker (§4.4): authoritative in-memory per-agent spawn/success/failure counters
//! and cooldown state. The `agent_health` table is a periodic, best-effort flush target for
//! observability only; nothing reads it back to make scheduling decisions.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use fuel_db::models::HealthStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent: String,
    pub spawns: i64,
    pub successes: i64,
    pub failures: i64,
    pub consecutive_failures: i64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl AgentHealth {
    fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_owned(),
            spawns: 0,
            successes: 0,
            failures: 0,
            consecutive_failures: 0,
            last_failure_at: None,
            cooldown_until: None,
        }
    }

    pub fn status(&self, now: DateTime<Utc>, _max_agent_attempts: u32) -> HealthStatus {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return HealthStatus::Cooldown;
            }
        }
        // §4.4: 1..=max_attempts-1 consecutive failures is `degraded`; only 0 is `healthy`.
        // (`max_attempts` itself is covered by the active-cooldown branch above.)
        if self.consecutive_failures >= 1 {
            return HealthStatus::Degraded;
        }
        HealthStatus::Healthy
    }
}

/// Owns every agent's health state for the lifetime of a `consume` run (§4.4: "Health is
/// in-memory"). Not `Send`-shared; the single-threaded consume loop owns it directly.
#[derive(Debug, Default)]
pub struct HealthTracker {
    agents: HashMap<String, AgentHealth>,
    max_agent_attempts: u32,
    cooldown: Duration,
}

impl HealthTracker {
    pub fn new(max_agent_attempts: u32, cooldown_seconds: u64) -> Self {
        Self {
            agents: HashMap::new(),
            max_agent_attempts,
            cooldown: Duration::seconds(cooldown_seconds as i64),
        }
    }

    fn entry(&mut self, agent: &str) -> &mut AgentHealth {
        self.agents
            .entry(agent.to_owned())
            .or_insert_with(|| AgentHealth::new(agent))
    }

    pub fn record_spawn(&mut self, agent: &str) {
        self.entry(agent).spawns += 1;
    }

    pub fn record_success(&mut self, agent: &str) {
        let health = self.entry(agent);
        health.successes += 1;
        health.consecutive_failures = 0;
        health.cooldown_until = None;
    }

    /// Records a failed run. After `max_agent_attempts` consecutive failures the agent
    /// enters cooldown for `cooldown_seconds` (§4.4).
    pub fn record_failure(&mut self, agent: &str, now: DateTime<Utc>) {
        let cooldown = self.cooldown;
        let max_attempts = self.max_agent_attempts as i64;
        let health = self.entry(agent);
        health.failures += 1;
        health.consecutive_failures += 1;
        health.last_failure_at = Some(now);
        if health.consecutive_failures >= max_attempts {
            health.cooldown_until = Some(now + cooldown);
        }
    }

    pub fn status(&self, agent: &str, now: DateTime<Utc>) -> HealthStatus {
        match self.agents.get(agent) {
            Some(health) => health.status(now, self.max_agent_attempts),
            None => HealthStatus::Healthy,
        }
    }

    /// Whether the Task Spawner may launch this agent right now (§4.5 step 2).
    pub fn can_spawn(&self, agent: &str, now: DateTime<Utc>) -> bool {
        !matches!(self.status(agent, now), HealthStatus::Cooldown)
    }

    pub fn snapshot(&self) -> Vec<AgentHealth> {
        let mut rows: Vec<AgentHealth> = self.agents.values().cloned().collect();
        rows.sort_by(|a, b| a.agent.cmp(&b.agent));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_by_default() {
        let tracker = HealthTracker::new(3, 300);
        assert!(tracker.can_spawn("claude", Utc::now()));
    }

    #[test]
    fn enters_cooldown_after_max_consecutive_failures() {
        let mut tracker = HealthTracker::new(2, 300);
        let now = Utc::now();
        tracker.record_failure("claude", now);
        assert!(tracker.can_spawn("claude", now));
        tracker.record_failure("claude", now);
        assert!(!tracker.can_spawn("claude", now));
    }

    #[test]
    fn cooldown_expires() {
        let mut tracker = HealthTracker::new(1, 60);
        let now = Utc::now();
        tracker.record_failure("claude", now);
        assert!(!tracker.can_spawn("claude", now));
        assert!(tracker.can_spawn("claude", now + Duration::seconds(61)));
    }

    #[test]
    fn success_resets_consecutive_failures_and_cooldown() {
        let mut tracker = HealthTracker::new(1, 300);
        let now = Utc::now();
        tracker.record_failure("claude", now);
        assert!(!tracker.can_spawn("claude", now));
        tracker.record_success("claude");
        assert!(tracker.can_spawn("claude", now));
    }

    #[test]
    fn one_to_max_minus_one_failures_is_degraded_not_healthy() {
        let mut tracker = HealthTracker::new(3, 300);
        let now = Utc::now();
        tracker.record_failure("claude", now);
        assert_eq!(tracker.status("claude", now), HealthStatus::Degraded);
        tracker.record_failure("claude", now);
        assert_eq!(tracker.status("claude", now), HealthStatus::Degraded);
        // can_spawn is unaffected: only cooldown blocks a launch, degraded does not.
        assert!(tracker.can_spawn("claude", now));
    }

    #[test]
    fn zero_failures_is_healthy() {
        let tracker = HealthTracker::new(3, 300);
        assert_eq!(tracker.status("claude", Utc::now()), HealthStatus::Healthy);
    }
}
