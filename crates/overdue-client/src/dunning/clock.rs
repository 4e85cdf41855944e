use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};

/// Source of "now" for dunning decisions. A batch pass reads it once and
/// compares every invoice against that single instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(SystemTime::now())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// "Now" at the precision the ledger stores: whole seconds. Anything compared
/// against a stored timestamp must come from here.
pub fn ledger_now(clock: &dyn Clock) -> DateTime<Utc> {
    clock.now().trunc_subsecs(0)
}

pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Accepts either an RFC 3339 timestamp or a bare `YYYY-MM-DD` date, which is
/// read as midnight UTC.
pub fn parse_timestamp_or_date(value: &str) -> Option<DateTime<Utc>> {
    if let Some(parsed) = parse_timestamp(value) {
        return Some(parsed);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
