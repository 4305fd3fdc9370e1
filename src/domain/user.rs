use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub tier: Tier,
    pub max_credits: i32,
    pub free_trials_left: i32,
    pub next_trial_reset: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Tier {
    Free,
    Paid,
}

/// Credit allowances and the refill period shared by every user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreditPolicy {
    pub free_max_credits: i32,
    pub paid_max_credits: i32,
    pub reset_period: Duration,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            free_max_credits: 5,
            paid_max_credits: 20,
            reset_period: Duration::hours(24),
        }
    }
}

impl CreditPolicy {
    pub fn max_credits_for(&self, tier: Tier) -> i32 {
        match tier {
            Tier::Free => self.free_max_credits,
            Tier::Paid => self.paid_max_credits,
        }
    }
}

impl User {
    pub fn new(
        email: String,
        name: Option<String>,
        image: Option<String>,
        policy: &CreditPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let max_credits = policy.max_credits_for(Tier::Free);
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            image,
            tier: Tier::Free,
            max_credits,
            free_trials_left: max_credits,
            next_trial_reset: now + policy.reset_period,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_trial_reset_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_trial_reset
    }

    pub fn has_credits(&self) -> bool {
        self.free_trials_left > 0
    }

    /// Plan name shown to clients.
    pub fn plan(&self) -> &'static str {
        match self.tier {
            Tier::Paid => "pro",
            Tier::Free => "free",
        }
    }

    /// Refills trials when the reset time has passed. Returns whether a refill happened.
    pub fn refill_if_due(&mut self, period: Duration, now: DateTime<Utc>) -> bool {
        if !self.is_trial_reset_due(now) {
            return false;
        }

        self.free_trials_left = self.max_credits;
        self.next_trial_reset = next_reset_after(self.next_trial_reset, period, now);
        self.updated_at = now;
        true
    }
}

/// Advances `reset` by whole periods until it lies strictly after `now`.
pub fn next_reset_after(reset: DateTime<Utc>, period: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    let period_secs = period.num_seconds().max(1);
    if reset > now {
        return reset;
    }

    let elapsed = (now - reset).num_seconds();
    let periods = elapsed / period_secs + 1;
    reset + Duration::seconds(period_secs.saturating_mul(periods))
}
