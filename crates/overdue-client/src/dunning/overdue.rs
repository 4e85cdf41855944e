use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dunning::level::DunningLevel;
use crate::dunning::policy::DunningPolicy;
use crate::dunning::store::{Invoice, InvoiceStatus};

/// Whole days elapsed since `due_at`, never negative.
pub fn days_overdue(due_at: &DateTime<Utc>, now: &DateTime<Utc>) -> i64 {
    now.signed_duration_since(*due_at).num_days().max(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Level1,
    Level2,
    Level3,
    None,
}

impl NextAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Level1 => "level1",
            Self::Level2 => "level2",
            Self::Level3 => "level3",
            Self::None => "none",
        }
    }

    const fn for_level(level: DunningLevel) -> Self {
        match level {
            DunningLevel::Clean => Self::None,
            DunningLevel::Level1 => Self::Level1,
            DunningLevel::Level2 => Self::Level2,
            DunningLevel::Level3 => Self::Level3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AgingBucket {
    #[serde(rename = "current")]
    Current,
    #[serde(rename = "1-30")]
    Days1To30,
    #[serde(rename = "31-60")]
    Days31To60,
    #[serde(rename = "61-90")]
    Days61To90,
    #[serde(rename = "90+")]
    Over90,
}

impl AgingBucket {
    pub fn for_days(days_overdue: i64) -> Self {
        match days_overdue {
            i64::MIN..=0 => Self::Current,
            1..=30 => Self::Days1To30,
            31..=60 => Self::Days31To60,
            61..=90 => Self::Days61To90,
            _ => Self::Over90,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Days1To30 => "1-30",
            Self::Days31To60 => "31-60",
            Self::Days61To90 => "61-90",
            Self::Over90 => "90+",
        }
    }
}

/// Where an invoice stands against its policy at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub days_overdue: i64,
    pub current_level: DunningLevel,
    pub next_level: Option<DunningLevel>,
    pub next_threshold_days: Option<i64>,
    /// Days until the next level becomes reachable; zero or negative when it
    /// already is. `None` once the invoice sits at level 3.
    pub days_until_next: Option<i64>,
    pub next_action: NextAction,
    pub aging_bucket: AgingBucket,
}

pub fn assess(invoice: &Invoice, policy: &DunningPolicy, now: &DateTime<Utc>) -> Assessment {
    let days = days_overdue(&invoice.due_at, now);
    let next_level = invoice.dunning_level.next();
    let next_threshold_days = next_level.and_then(|level| policy.threshold_days(level));
    let days_until_next = next_threshold_days.map(|threshold| threshold - days);

    let escalating = invoice.status == InvoiceStatus::Overdue && !policy.is_exempt();
    let next_action = match (next_level, next_threshold_days) {
        (Some(level), Some(threshold)) if escalating && days >= threshold => {
            NextAction::for_level(level)
        }
        _ => NextAction::None,
    };

    Assessment {
        days_overdue: days,
        current_level: invoice.dunning_level,
        next_level,
        next_threshold_days,
        days_until_next,
        next_action,
        aging_bucket: AgingBucket::for_days(days),
    }
}
