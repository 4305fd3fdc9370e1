use serde::{Serialize, Serializer};

use super::Tier;

/// A per-day allowance; serializes as a number or the string `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyLimit {
    Limited(i64),
    Unlimited,
}

impl Serialize for DailyLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DailyLimit::Limited(n) => serializer.serialize_i64(*n),
            DailyLimit::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl DailyLimit {
    /// Usage as a percentage of the limit, capped at 100. Unlimited plans always report 0.
    pub fn percentage(&self, used: i64) -> f64 {
        match self {
            DailyLimit::Unlimited => 0.0,
            DailyLimit::Limited(total) if *total <= 0 => 100.0,
            DailyLimit::Limited(total) => (used.max(0) as f64 / *total as f64 * 100.0).min(100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub screenshots_per_day: DailyLimit,
    pub ai_chats_per_day: DailyLimit,
}

impl PlanLimits {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                screenshots_per_day: DailyLimit::Limited(20),
                ai_chats_per_day: DailyLimit::Limited(5),
            },
            Tier::Paid => Self {
                screenshots_per_day: DailyLimit::Unlimited,
                ai_chats_per_day: DailyLimit::Limited(20),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyUsage {
    pub used: i64,
    pub total: DailyLimit,
    pub percentage: f64,
}

impl DailyUsage {
    pub fn new(used: i64, total: DailyLimit) -> Self {
        Self {
            used,
            total,
            percentage: total.percentage(used),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageStat {
    pub daily: DailyUsage,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub screenshots: UsageStat,
    pub ai_chats: UsageStat,
}

/// Current plan and today's consumption, as shown on the plans screen.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanUsage {
    pub current_plan: &'static str,
    pub usage: Usage,
}
