use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::ClientResult;
use crate::commands::common::{clock_for, open_session, parse_date_argument, parse_level_argument, parse_range_end};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::{
    BucketCount, CurrencyTotal, HistoryData, OverdueReportData, OverdueSummary, SuspendedData,
    UpcomingData,
};
use crate::dunning::clock::{format_timestamp, ledger_now};
use crate::dunning::history::customer_history;
use crate::dunning::overdue::AgingBucket;
use crate::dunning::policy::round_money;
use crate::dunning::reports::{
    DEFAULT_LOOKAHEAD_DAYS, OverdueInvoiceRow, dunning_statistics, overdue_invoices,
    suspended_customers, upcoming_candidates,
};

const BUCKET_ORDER: [AgingBucket; 5] = [
    AgingBucket::Current,
    AgingBucket::Days1To30,
    AgingBucket::Days31To60,
    AgingBucket::Days61To90,
    AgingBucket::Over90,
];

#[derive(Debug, Default)]
pub struct OverdueReportOptions<'a> {
    pub customer_id: Option<String>,
    pub level: Option<i64>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
}

pub fn overdue(options: OverdueReportOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let level = options
        .level
        .map(|value| parse_level_argument(value, "report overdue"))
        .transpose()?;
    let now = ledger_now(clock_for(options.now).as_ref());
    let session = open_session(options.home_override)?;

    let rows = overdue_invoices(
        &session.connection,
        &session.db_path,
        &now,
        options.customer_id.as_deref(),
        level,
    )?;
    let summary = summarize_overdue(&rows);
    success(
        "report overdue",
        OverdueReportData {
            as_of: format_timestamp(&now),
            customer_id: options.customer_id,
            level,
            summary,
            rows,
        },
    )
}

pub fn history(customer_id: &str, home_override: Option<&Path>) -> ClientResult<SuccessEnvelope> {
    let session = open_session(home_override)?;
    let events = customer_history(&session.connection, &session.db_path, customer_id)?;
    success(
        "report history",
        HistoryData {
            customer_id: customer_id.to_string(),
            events,
        },
    )
}

pub fn suspended(home_override: Option<&Path>) -> ClientResult<SuccessEnvelope> {
    let session = open_session(home_override)?;
    let rows = suspended_customers(&session.connection, &session.db_path)?;
    success("report suspended", SuspendedData { rows })
}

#[derive(Debug, Default)]
pub struct StatsReportOptions<'a> {
    pub from: Option<String>,
    pub to: Option<String>,
    pub home_override: Option<&'a Path>,
}

pub fn stats(options: StatsReportOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let from = options
        .from
        .as_deref()
        .map(|value| parse_date_argument(value, "--from", "report stats"))
        .transpose()?;
    let to = options
        .to
        .as_deref()
        .map(|value| parse_range_end(value, "--to", "report stats"))
        .transpose()?;
    let session = open_session(options.home_override)?;

    let statistics = dunning_statistics(
        &session.connection,
        &session.db_path,
        from.as_ref(),
        to.as_ref(),
    )?;
    success("report stats", statistics)
}

#[derive(Debug, Default)]
pub struct UpcomingReportOptions<'a> {
    pub days_ahead: Option<i64>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
}

pub fn upcoming(options: UpcomingReportOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let days_ahead = options.days_ahead.unwrap_or(DEFAULT_LOOKAHEAD_DAYS);
    let now = ledger_now(clock_for(options.now).as_ref());
    let session = open_session(options.home_override)?;

    let rows = upcoming_candidates(&session.connection, &session.db_path, &now, days_ahead)?;
    success(
        "report upcoming",
        UpcomingData {
            as_of: format_timestamp(&now),
            days_ahead,
            rows,
        },
    )
}

fn summarize_overdue(rows: &[OverdueInvoiceRow]) -> OverdueSummary {
    let mut totals: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for row in rows {
        let entry = totals.entry(row.currency.as_str()).or_insert((0.0, 0.0));
        entry.0 += row.total_amount;
        entry.1 += row.dunning_fee;
    }

    OverdueSummary {
        invoices: rows.len() as i64,
        totals: totals
            .into_iter()
            .map(|(currency, (outstanding, dunning_fees))| CurrencyTotal {
                currency: currency.to_string(),
                outstanding: round_money(outstanding),
                dunning_fees: round_money(dunning_fees),
            })
            .collect(),
        buckets: BUCKET_ORDER
            .iter()
            .map(|bucket| BucketCount {
                bucket: *bucket,
                invoices: rows.iter().filter(|row| row.aging_bucket == *bucket).count() as i64,
            })
            .collect(),
    }
}
