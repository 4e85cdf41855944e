//! Read-only views over the dunning state, recomputed from the ledger on
//! every call.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::dunning::clock::format_timestamp;
use crate::dunning::history::EventSource;
use crate::dunning::level::DunningLevel;
use crate::dunning::overdue::{AgingBucket, NextAction, assess, days_overdue};
use crate::dunning::policy::{DunningPolicy, load_policy_for_customer, round_money};
use crate::dunning::store::{
    InvoiceStatus, load_customer, load_dunned_invoices,
    load_invoices_with_status, load_suspended_customers, require_customer,
};
use crate::{ClientError, ClientResult};

pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverdueInvoiceRow {
    pub invoice_id: String,
    pub number: String,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub due_at: String,
    pub total_amount: f64,
    pub dunning_fee: f64,
    pub currency: String,
    pub dunning_level: DunningLevel,
    pub days_overdue: i64,
    pub aging_bucket: AgingBucket,
    pub next_action: NextAction,
    pub days_until_next: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspendedCustomer {
    pub customer_id: String,
    pub name: String,
    pub email: Option<String>,
    pub reason: Option<String>,
    pub suspended_at: Option<String>,
    pub suspended_by: Option<String>,
    pub source: Option<EventSource>,
    pub overdue_invoices: i64,
    pub overdue_total: f64,
    pub dunning_fees: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelStatistics {
    pub level: DunningLevel,
    pub invoices: u64,
    pub fees: f64,
    pub paid: u64,
    pub still_overdue: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DunningStatistics {
    pub from: Option<String>,
    pub to: Option<String>,
    pub dunned_invoices: u64,
    pub total_fees: f64,
    pub paid: u64,
    pub still_overdue: u64,
    /// Share of dunned invoices that were paid, in percent.
    pub effectiveness_percent: f64,
    /// Mean days between the last dunning step and payment, over paid invoices.
    pub average_days_to_payment: Option<f64>,
    pub levels: Vec<LevelStatistics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingCandidate {
    pub invoice_id: String,
    pub number: String,
    pub customer_id: String,
    pub current_level: DunningLevel,
    pub next_level: DunningLevel,
    pub days_overdue: i64,
    pub next_threshold_days: i64,
    /// Zero when the level is already reachable.
    pub days_remaining: i64,
    pub next_fee: f64,
    pub total_amount: f64,
    pub currency: String,
    pub auto_send: bool,
    pub would_suspend: bool,
}

/// Overdue invoices with their age and next action, optionally narrowed to
/// one customer and/or one current level.
pub fn overdue_invoices(
    connection: &Connection,
    db_path: &Path,
    now: &DateTime<Utc>,
    customer_id: Option<&str>,
    level: Option<DunningLevel>,
) -> ClientResult<Vec<OverdueInvoiceRow>> {
    if let Some(customer_id) = customer_id {
        require_customer(connection, db_path, customer_id)?;
    }
    let invoices = load_invoices_with_status(connection, db_path, InvoiceStatus::Overdue, customer_id)?;
    let mut policies = PolicyCache::default();
    let mut names: HashMap<String, Option<String>> = HashMap::new();

    let mut rows = Vec::new();
    for invoice in invoices {
        if level.is_some_and(|wanted| wanted != invoice.dunning_level) {
            continue;
        }

        let days = days_overdue(&invoice.due_at, now);
        let (next_action, days_until_next) = match invoice.customer_id.as_deref() {
            Some(owner) => match policies.get(connection, db_path, owner)? {
                Some(policy) => {
                    let assessment = assess(&invoice, policy, now);
                    (assessment.next_action, assessment.days_until_next)
                }
                None => (NextAction::None, None),
            },
            None => (NextAction::None, None),
        };

        let customer_name = match invoice.customer_id.as_deref() {
            Some(owner) => {
                if !names.contains_key(owner) {
                    let name = load_customer(connection, db_path, owner)?.map(|customer| customer.name);
                    names.insert(owner.to_string(), name);
                }
                names.get(owner).cloned().flatten()
            }
            None => None,
        };

        rows.push(OverdueInvoiceRow {
            due_at: format_timestamp(&invoice.due_at),
            invoice_id: invoice.invoice_id,
            number: invoice.number,
            customer_id: invoice.customer_id,
            customer_name,
            total_amount: invoice.total_amount,
            dunning_fee: invoice.dunning_fee,
            currency: invoice.currency,
            dunning_level: invoice.dunning_level,
            days_overdue: days,
            aging_bucket: AgingBucket::for_days(days),
            next_action,
            days_until_next,
        });
    }

    rows.sort_by(|left, right| {
        right
            .days_overdue
            .cmp(&left.days_overdue)
            .then_with(|| left.invoice_id.cmp(&right.invoice_id))
    });
    Ok(rows)
}

/// Suspended customers with the source of the suspension and their current
/// overdue exposure.
pub fn suspended_customers(connection: &Connection, db_path: &Path) -> ClientResult<Vec<SuspendedCustomer>> {
    let customers = load_suspended_customers(connection, db_path)?;
    let mut rows = Vec::with_capacity(customers.len());
    for customer in customers {
        let overdue = load_invoices_with_status(
            connection,
            db_path,
            InvoiceStatus::Overdue,
            Some(&customer.customer_id),
        )?;
        let overdue_total = round_money(overdue.iter().map(|invoice| invoice.total_amount).sum());
        let dunning_fees = round_money(overdue.iter().map(|invoice| invoice.dunning_fee).sum());
        let overdue_invoices = overdue.len() as i64;

        rows.push(SuspendedCustomer {
            customer_id: customer.customer_id,
            name: customer.name,
            email: customer.email,
            reason: customer.suspension.reason,
            suspended_at: customer.suspension.suspended_at,
            suspended_by: customer.suspension.suspended_by,
            source: customer.suspension.source,
            overdue_invoices,
            overdue_total,
            dunning_fees,
        });
    }
    Ok(rows)
}

/// Effectiveness of past dunning over invoices whose last dunning step falls
/// inside `[from, to]`. Invoices are grouped by the level they reached.
pub fn dunning_statistics(
    connection: &Connection,
    db_path: &Path,
    from: Option<&DateTime<Utc>>,
    to: Option<&DateTime<Utc>>,
) -> ClientResult<DunningStatistics> {
    if let (Some(from), Some(to)) = (from, to)
        && from > to
    {
        return Err(ClientError::invalid_argument_for_command(
            "`--from` must not be after `--to`.",
            Some("report stats"),
        ));
    }

    let invoices = load_dunned_invoices(connection, db_path)?;
    let mut levels: Vec<LevelStatistics> = DunningLevel::ESCALATED
        .iter()
        .map(|level| LevelStatistics {
            level: *level,
            invoices: 0,
            fees: 0.0,
            paid: 0,
            still_overdue: 0,
        })
        .collect();
    let mut payment_delays = Vec::new();

    for invoice in &invoices {
        let Some(last_dunning_at) = invoice.last_dunning_at else {
            continue;
        };
        if from.is_some_and(|from| last_dunning_at < *from) || to.is_some_and(|to| last_dunning_at > *to) {
            continue;
        }
        let Some(slot) = invoice.dunning_level.policy_slot() else {
            continue;
        };
        let Some(entry) = levels.get_mut(slot) else {
            continue;
        };

        entry.invoices += 1;
        entry.fees += invoice.dunning_fee;
        match invoice.status {
            InvoiceStatus::Paid => {
                entry.paid += 1;
                if let Some(paid_at) = invoice.paid_at {
                    let seconds = paid_at.signed_duration_since(last_dunning_at).num_seconds();
                    payment_delays.push(seconds.max(0) as f64 / 86_400.0);
                }
            }
            InvoiceStatus::Overdue => entry.still_overdue += 1,
            InvoiceStatus::Open | InvoiceStatus::Cancelled => {}
        }
    }

    for entry in &mut levels {
        entry.fees = round_money(entry.fees);
    }
    let dunned_invoices: u64 = levels.iter().map(|entry| entry.invoices).sum();
    let paid: u64 = levels.iter().map(|entry| entry.paid).sum();
    let still_overdue: u64 = levels.iter().map(|entry| entry.still_overdue).sum();
    let total_fees = round_money(levels.iter().map(|entry| entry.fees).sum());

    Ok(DunningStatistics {
        from: from.map(format_timestamp),
        to: to.map(format_timestamp),
        dunned_invoices,
        total_fees,
        paid,
        still_overdue,
        effectiveness_percent: percentage(paid, dunned_invoices),
        average_days_to_payment: mean(&payment_delays),
        levels,
    })
}

/// Overdue, non-exempt invoices below level 3 whose next level becomes
/// reachable within `days_ahead` days, soonest first.
pub fn upcoming_candidates(
    connection: &Connection,
    db_path: &Path,
    now: &DateTime<Utc>,
    days_ahead: i64,
) -> ClientResult<Vec<UpcomingCandidate>> {
    if days_ahead < 0 {
        return Err(ClientError::invalid_argument_for_command(
            "Lookahead days must not be negative.",
            Some("report upcoming"),
        ));
    }

    let invoices = load_invoices_with_status(connection, db_path, InvoiceStatus::Overdue, None)?;
    let mut policies = PolicyCache::default();
    let mut suspended: HashMap<String, bool> = HashMap::new();
    let mut candidates = Vec::new();

    for invoice in invoices {
        let Some(customer_id) = invoice.customer_id.clone() else {
            continue;
        };
        let Some(policy) = policies.get(connection, db_path, &customer_id)? else {
            continue;
        };
        if policy.is_exempt() {
            continue;
        }

        let assessment = assess(&invoice, policy, now);
        let (Some(next_level), Some(threshold), Some(days_until)) = (
            assessment.next_level,
            assessment.next_threshold_days,
            assessment.days_until_next,
        ) else {
            continue;
        };
        if days_until > days_ahead {
            continue;
        }

        let would_suspend = if next_level == DunningLevel::Level3 && policy.level3_suspend_service {
            if !suspended.contains_key(&customer_id) {
                let is_suspended = load_customer(connection, db_path, &customer_id)?
                    .is_some_and(|customer| customer.suspension.suspended);
                suspended.insert(customer_id.clone(), is_suspended);
            }
            !suspended.get(&customer_id).copied().unwrap_or(false)
        } else {
            false
        };

        candidates.push(UpcomingCandidate {
            invoice_id: invoice.invoice_id,
            number: invoice.number,
            customer_id,
            current_level: invoice.dunning_level,
            next_level,
            days_overdue: assessment.days_overdue,
            next_threshold_days: threshold,
            days_remaining: days_until.max(0),
            next_fee: policy.fee(next_level),
            total_amount: invoice.total_amount,
            currency: invoice.currency,
            auto_send: policy.auto_send(next_level),
            would_suspend,
        });
    }

    candidates.sort_by(|left, right| {
        left.days_remaining
            .cmp(&right.days_remaining)
            .then_with(|| left.invoice_id.cmp(&right.invoice_id))
    });
    Ok(candidates)
}

#[derive(Default)]
struct PolicyCache {
    by_customer: HashMap<String, Option<DunningPolicy>>,
}

impl PolicyCache {
    fn get(
        &mut self,
        connection: &Connection,
        db_path: &Path,
        customer_id: &str,
    ) -> ClientResult<Option<&DunningPolicy>> {
        if !self.by_customer.contains_key(customer_id) {
            let policy = load_policy_for_customer(connection, db_path, customer_id)?;
            self.by_customer.insert(customer_id.to_string(), policy);
        }
        Ok(self.by_customer.get(customer_id).and_then(Option::as_ref))
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_money(part as f64 * 100.0 / whole as f64)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(round_money(values.iter().sum::<f64>() / values.len() as f64))
}
