//! Periodic escalation over the whole overdue set.
//!
//! The pass walks overdue invoices by ascending id in pages and gives every
//! invoice its own transaction, so a failure on one invoice is tallied and the
//! walk moves on. At most one level is applied per invoice per pass, and an
//! invoice already dunned at or after the pass instant is left alone, so a
//! second pass at the same instant changes nothing. A pass
//! bounded by `max_invoices` leaves a cursor behind and the next pass resumes
//! after it.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::{info, warn};

use crate::dunning::DunningContext;
use crate::dunning::clock::format_timestamp;
use crate::dunning::history::EventSource;
use crate::dunning::level::DunningLevel;
use crate::dunning::notify::NoticeOutcome;
use crate::dunning::overdue::{NextAction, assess};
use crate::dunning::policy::load_policy_for_customer;
use crate::dunning::store::{
    InvoiceStatus, overdue_invoice_ids_after, require_customer, require_invoice,
};
use crate::dunning::transition::{EscalationRequest, PendingEscalation, escalate_in_transaction};
use crate::identity::{Actor, require_actor};
use crate::state::{map_sqlite_error, with_immediate_transaction};
use crate::{ClientError, ClientResult};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub(crate) const CURSOR_META_KEY: &str = "batch_cursor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub page_size: usize,
    /// Stop after this many invoices and leave a cursor for the next pass.
    pub max_invoices: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_invoices: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub level1: u64,
    pub level2: u64,
    pub level3: u64,
    /// No policy, no customer, or a policy that exempts the customer.
    pub skipped: u64,
    /// A level was due but its auto-send flag is off.
    pub deferred: u64,
    /// Overdue but no threshold reached yet, or already dunned this instant.
    pub not_due: u64,
    pub errors: u64,
    pub suspended: u64,
    pub notices_failed: u64,
    pub scanned: u64,
    /// True when the pass reached the end of the overdue set.
    pub completed: bool,
    pub resumed_from: Option<String>,
    /// Where the next pass resumes; `None` once a pass completes.
    pub cursor: Option<String>,
    pub run_at: String,
}

impl BatchSummary {
    pub fn transitions(&self) -> u64 {
        self.level1 + self.level2 + self.level3
    }
}

enum InvoiceDisposition {
    Escalated(PendingEscalation),
    Skipped(&'static str),
    Deferred(DunningLevel),
    NotDue,
}

pub fn run_batch_escalation(
    connection: &mut Connection,
    db_path: &Path,
    context: &DunningContext<'_>,
    options: BatchOptions,
) -> ClientResult<BatchSummary> {
    let actor = require_actor(context.actor, "run batch escalation")?;
    if options.page_size == 0 {
        return Err(ClientError::invalid_argument_for_command(
            "Page size must be at least 1.",
            Some("batch run"),
        ));
    }
    if options.max_invoices == Some(0) {
        return Err(ClientError::invalid_argument_for_command(
            "Max invoices must be at least 1 when set.",
            Some("batch run"),
        ));
    }

    let now = context.now();
    let resumed_from = read_cursor(connection, db_path)?;
    let mut summary = BatchSummary {
        resumed_from: resumed_from.clone(),
        run_at: format_timestamp(&now),
        ..BatchSummary::default()
    };
    let mut after = resumed_from;

    loop {
        let budget = options
            .max_invoices
            .map(|max| max.saturating_sub(summary.scanned as usize));
        if budget == Some(0) {
            break;
        }
        let limit = budget.map_or(options.page_size, |left| left.min(options.page_size));

        let page = overdue_invoice_ids_after(connection, db_path, after.as_deref(), limit)?;
        let last_page = page.len() < limit;

        for invoice_id in page {
            summary.scanned += 1;
            match process_invoice(connection, db_path, actor, &now, &invoice_id) {
                Ok(InvoiceDisposition::Escalated(pending)) => {
                    let outcome = pending.finish(context.notifier);
                    match outcome.level {
                        DunningLevel::Level1 => summary.level1 += 1,
                        DunningLevel::Level2 => summary.level2 += 1,
                        DunningLevel::Level3 => summary.level3 += 1,
                        DunningLevel::Clean => {}
                    }
                    if outcome.suspended {
                        summary.suspended += 1;
                    }
                    if outcome.notice == NoticeOutcome::Failed {
                        summary.notices_failed += 1;
                    }
                }
                Ok(InvoiceDisposition::Skipped(reason)) => {
                    summary.skipped += 1;
                    info!(invoice_id = %invoice_id, reason, "invoice skipped by batch escalation");
                }
                Ok(InvoiceDisposition::Deferred(level)) => {
                    summary.deferred += 1;
                    info!(
                        invoice_id = %invoice_id,
                        level = level.as_str(),
                        "level due but auto-send is off; deferred"
                    );
                }
                Ok(InvoiceDisposition::NotDue) => summary.not_due += 1,
                Err(error) => {
                    summary.errors += 1;
                    warn!(
                        invoice_id = %invoice_id,
                        code = %error.code,
                        error = %error.message,
                        "batch escalation failed for invoice"
                    );
                }
            }
            after = Some(invoice_id);
        }

        if last_page {
            summary.completed = true;
            break;
        }
    }

    if summary.completed {
        clear_cursor(connection, db_path)?;
    } else if let Some(cursor) = after.as_deref() {
        write_cursor(connection, db_path, cursor)?;
        summary.cursor = Some(cursor.to_string());
    }

    info!(
        level1 = summary.level1,
        level2 = summary.level2,
        level3 = summary.level3,
        skipped = summary.skipped,
        deferred = summary.deferred,
        not_due = summary.not_due,
        errors = summary.errors,
        scanned = summary.scanned,
        completed = summary.completed,
        "batch escalation finished"
    );
    Ok(summary)
}

fn process_invoice(
    connection: &mut Connection,
    db_path: &Path,
    actor: &Actor,
    now: &DateTime<Utc>,
    invoice_id: &str,
) -> ClientResult<InvoiceDisposition> {
    with_immediate_transaction(connection, db_path, |transaction| {
        let invoice = require_invoice(transaction, db_path, invoice_id)?;
        if invoice.status != InvoiceStatus::Overdue {
            return Ok(InvoiceDisposition::NotDue);
        }
        let Some(customer_id) = invoice.customer_id.as_deref() else {
            return Ok(InvoiceDisposition::Skipped("no associated customer"));
        };
        let Some(policy) = load_policy_for_customer(transaction, db_path, customer_id)? else {
            return Ok(InvoiceDisposition::Skipped("no dunning policy"));
        };
        if let Some(reason) = policy.exemption_reason() {
            return Ok(InvoiceDisposition::Skipped(reason));
        }
        if invoice.last_dunning_at.is_some_and(|at| at >= *now) {
            return Ok(InvoiceDisposition::NotDue);
        }

        let target = match assess(&invoice, &policy, now).next_action {
            NextAction::Level1 => DunningLevel::Level1,
            NextAction::Level2 => DunningLevel::Level2,
            NextAction::Level3 => DunningLevel::Level3,
            NextAction::None => return Ok(InvoiceDisposition::NotDue),
        };
        if !policy.auto_send(target) {
            return Ok(InvoiceDisposition::Deferred(target));
        }

        let customer = require_customer(transaction, db_path, customer_id)?;
        escalate_in_transaction(
            transaction,
            db_path,
            &EscalationRequest {
                invoice: &invoice,
                policy: &policy,
                customer: &customer,
                target,
                actor,
                now,
                source: EventSource::Automatic,
                suspend: policy.level3_suspend_service,
                send_notice: true,
            },
        )
        .map(InvoiceDisposition::Escalated)
    })
}

pub(crate) fn read_cursor(connection: &Connection, db_path: &Path) -> ClientResult<Option<String>> {
    connection
        .query_row(
            "SELECT value FROM internal_meta WHERE key = ?1",
            params![CURSOR_META_KEY],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))
}

fn write_cursor(connection: &Connection, db_path: &Path, cursor: &str) -> ClientResult<()> {
    connection
        .execute(
            "INSERT INTO internal_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![CURSOR_META_KEY, cursor],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(())
}

fn clear_cursor(connection: &Connection, db_path: &Path) -> ClientResult<()> {
    connection
        .execute(
            "DELETE FROM internal_meta WHERE key = ?1",
            params![CURSOR_META_KEY],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(())
}
