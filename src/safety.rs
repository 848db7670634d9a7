//! Safety Controller (C7): per-user cooldown policy driven by run outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SafetyStatePayload;
use crate::utils::constants::{
    COOLDOWN_MINIMUM_SECONDS, COOLDOWN_REASON_BLOCKED_FAILURE_THRESHOLD,
    COOLDOWN_REASON_NETWORK_FAILURE_THRESHOLD, THRESHOLD_MINIMUM,
};

/// Persisted as `UserSettings.scrape_safety_state` JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyState {
    #[serde(default)]
    pub consecutive_blocked_runs: u32,
    #[serde(default)]
    pub consecutive_network_runs: u32,
    #[serde(default)]
    pub cooldown_entry_count: u32,
    #[serde(default)]
    pub blocked_start_count: u32,
    #[serde(default)]
    pub last_blocked_failure_count: u32,
    #[serde(default)]
    pub last_network_failure_count: u32,
    #[serde(default)]
    pub last_evaluated_run_id: Option<i64>,
}

impl Default for SafetyState {
    fn default() -> Self {
        Self {
            consecutive_blocked_runs: 0,
            consecutive_network_runs: 0,
            cooldown_entry_count: 0,
            blocked_start_count: 0,
            last_blocked_failure_count: 0,
            last_network_failure_count: 0,
            last_evaluated_run_id: None,
        }
    }
}

impl SafetyState {
    #[must_use]
    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

pub struct SafetyThresholds {
    pub blocked_failure_threshold: u32,
    pub network_failure_threshold: u32,
    pub blocked_cooldown_seconds: i64,
    pub network_cooldown_seconds: i64,
}

/// Outcome of a cooldown decision, carried back so callers can persist both
/// the updated counters and the new cooldown window in one write.
pub struct SafetyOutcome {
    pub state: SafetyState,
    pub cooldown_reason: Option<String>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// Update counters for a just-completed run and decide whether a new
/// cooldown should begin.
#[must_use]
pub fn apply_run_safety_outcome(
    mut state: SafetyState,
    run_id: i64,
    blocked_failures: u32,
    network_failures: u32,
    thresholds: &SafetyThresholds,
    now: DateTime<Utc>,
    current_cooldown_until: Option<DateTime<Utc>>,
    current_cooldown_reason: Option<&str>,
) -> SafetyOutcome {
    state.last_blocked_failure_count = blocked_failures;
    state.last_network_failure_count = network_failures;
    state.last_evaluated_run_id = Some(run_id);

    state.consecutive_blocked_runs = if blocked_failures == 0 {
        0
    } else {
        state.consecutive_blocked_runs + 1
    };
    state.consecutive_network_runs = if network_failures == 0 {
        0
    } else {
        state.consecutive_network_runs + 1
    };

    let blocked_threshold = thresholds.blocked_failure_threshold.max(THRESHOLD_MINIMUM);
    let network_threshold = thresholds.network_failure_threshold.max(THRESHOLD_MINIMUM);

    let (reason, cooldown_seconds) = if blocked_failures >= blocked_threshold {
        (
            Some(COOLDOWN_REASON_BLOCKED_FAILURE_THRESHOLD),
            thresholds.blocked_cooldown_seconds.max(COOLDOWN_MINIMUM_SECONDS),
        )
    } else if network_failures >= network_threshold {
        (
            Some(COOLDOWN_REASON_NETWORK_FAILURE_THRESHOLD),
            thresholds.network_cooldown_seconds.max(COOLDOWN_MINIMUM_SECONDS),
        )
    } else {
        (None, 0)
    };

    if let Some(reason) = reason {
        state.cooldown_entry_count += 1;
        SafetyOutcome {
            state,
            cooldown_reason: Some(reason.to_string()),
            cooldown_until: Some(now + chrono::Duration::seconds(cooldown_seconds)),
        }
    } else {
        let (cooldown_reason, cooldown_until) = clear_expired_cooldown(now, current_cooldown_until, current_cooldown_reason);
        SafetyOutcome {
            state,
            cooldown_reason,
            cooldown_until,
        }
    }
}

#[must_use]
pub fn is_cooldown_active(now: DateTime<Utc>, cooldown_until: Option<DateTime<Utc>>) -> bool {
    cooldown_until.is_some_and(|until| until > now)
}

/// Lazily clears an expired cooldown; returns the (possibly unchanged) pair.
#[must_use]
pub fn clear_expired_cooldown(
    now: DateTime<Utc>,
    cooldown_until: Option<DateTime<Utc>>,
    cooldown_reason: Option<&str>,
) -> (Option<String>, Option<DateTime<Utc>>) {
    if is_cooldown_active(now, cooldown_until) {
        (cooldown_reason.map(str::to_string), cooldown_until)
    } else {
        (None, None)
    }
}

/// Called when a user attempts a run during an active cooldown: bumps the
/// blocked-start counter only, never extends the cooldown itself.
pub fn register_cooldown_blocked_start(state: &mut SafetyState) {
    state.blocked_start_count += 1;
}

fn cooldown_reason_label(reason: &str) -> &'static str {
    match reason {
        COOLDOWN_REASON_BLOCKED_FAILURE_THRESHOLD => {
            "Google Scholar has been blocking requests for this account."
        }
        COOLDOWN_REASON_NETWORK_FAILURE_THRESHOLD => "Recent runs have been failing due to network errors.",
        _ => "Ingestion is temporarily paused.",
    }
}

fn recommended_action(reason: &str) -> &'static str {
    match reason {
        COOLDOWN_REASON_BLOCKED_FAILURE_THRESHOLD => {
            "Wait for the cooldown to expire before retrying, or reduce run frequency and scholar count."
        }
        COOLDOWN_REASON_NETWORK_FAILURE_THRESHOLD => {
            "Check network connectivity and retry once the cooldown has expired."
        }
        _ => "Retry once the cooldown has expired.",
    }
}

#[must_use]
pub fn get_safety_state_payload(
    now: DateTime<Utc>,
    cooldown_until: Option<DateTime<Utc>>,
    cooldown_reason: Option<&str>,
) -> SafetyStatePayload {
    let active = is_cooldown_active(now, cooldown_until);
    let remaining = cooldown_until
        .map(|until| (until - now).num_seconds().max(0))
        .unwrap_or(0);

    SafetyStatePayload {
        cooldown_active: active,
        cooldown_reason: cooldown_reason.map(str::to_string),
        cooldown_reason_label: cooldown_reason.map(cooldown_reason_label).map(str::to_string),
        cooldown_until,
        cooldown_remaining_seconds: if active { remaining } else { 0 },
        recommended_action: cooldown_reason.map(recommended_action).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> SafetyThresholds {
        SafetyThresholds {
            blocked_failure_threshold: 3,
            network_failure_threshold: 5,
            blocked_cooldown_seconds: 3600,
            network_cooldown_seconds: 1800,
        }
    }

    #[test]
    fn enters_blocked_cooldown_at_threshold() {
        let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().to_utc();
        let outcome = apply_run_safety_outcome(SafetyState::default(), 1, 3, 0, &thresholds(), now, None, None);
        assert_eq!(outcome.cooldown_reason.as_deref(), Some(COOLDOWN_REASON_BLOCKED_FAILURE_THRESHOLD));
        assert!(outcome.cooldown_until.unwrap() > now);
        assert_eq!(outcome.state.consecutive_blocked_runs, 1);
    }

    #[test]
    fn resets_consecutive_counter_on_zero_failures() {
        let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().to_utc();
        let mut state = SafetyState::default();
        state.consecutive_blocked_runs = 5;
        let outcome = apply_run_safety_outcome(state, 2, 0, 0, &thresholds(), now, None, None);
        assert_eq!(outcome.state.consecutive_blocked_runs, 0);
        assert!(outcome.cooldown_reason.is_none());
    }

    #[test]
    fn blocked_start_only_increments_counter() {
        let mut state = SafetyState::default();
        register_cooldown_blocked_start(&mut state);
        register_cooldown_blocked_start(&mut state);
        assert_eq!(state.blocked_start_count, 2);
    }

    #[test]
    fn payload_has_no_reason_fields_when_inactive() {
        let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().to_utc();
        let payload = get_safety_state_payload(now, None, None);
        assert!(!payload.cooldown_active);
        assert!(payload.cooldown_reason_label.is_none());
        assert!(payload.recommended_action.is_none());
    }
}
