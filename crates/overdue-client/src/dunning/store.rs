//! Invoice and customer records the dunning engine reads and patches.
//!
//! These tables stand in for the external invoice and customer stores: the
//! engine only ever touches the dunning, status, payment and suspension
//! columns, and the record-keeping helpers at the bottom exist so a ledger
//! can be populated and driven end to end.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use ulid::Ulid;

use crate::dunning::DunningContext;
use crate::dunning::clock::{format_timestamp, parse_timestamp};
use crate::dunning::history::EventSource;
use crate::dunning::level::DunningLevel;
use crate::dunning::policy::{DEFAULT_PAYMENT_TERMS_DAYS, load_policy_for_customer, round_money};
use crate::identity::require_actor;
use crate::state::{map_sqlite_error, with_immediate_transaction};
use crate::{ClientError, ClientResult};

const INVOICE_COLUMNS: &str = "invoice_id, customer_id, number, issued_at, due_at, status,
    total_amount, currency, dunning_level, dunning_fee, last_dunning_at, paid_at";

const CUSTOMER_COLUMNS: &str = "customer_id, name, email, service_suspended,
    suspended_reason, suspended_at, suspended_by, suspension_source,
    reactivated_at, reactivated_by, reactivation_reason";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Open,
    Overdue,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Overdue => "overdue",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "overdue" => Some(Self::Overdue),
            "paid" => Some(Self::Paid),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub invoice_id: String,
    pub customer_id: Option<String>,
    pub number: String,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub status: InvoiceStatus,
    pub total_amount: f64,
    pub currency: String,
    pub dunning_level: DunningLevel,
    pub dunning_fee: f64,
    pub last_dunning_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspensionSnapshot {
    pub suspended: bool,
    pub reason: Option<String>,
    pub suspended_at: Option<String>,
    pub suspended_by: Option<String>,
    pub source: Option<EventSource>,
    pub reactivated_at: Option<String>,
    pub reactivated_by: Option<String>,
    pub reactivation_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub customer_id: String,
    pub name: String,
    pub email: Option<String>,
    pub suspension: SuspensionSnapshot,
}

struct RawInvoice {
    invoice_id: String,
    customer_id: Option<String>,
    number: String,
    issued_at: String,
    due_at: String,
    status: String,
    total_amount: f64,
    currency: String,
    dunning_level: i64,
    dunning_fee: f64,
    last_dunning_at: Option<String>,
    paid_at: Option<String>,
}

pub fn load_invoice(
    connection: &Connection,
    db_path: &Path,
    invoice_id: &str,
) -> ClientResult<Option<Invoice>> {
    let raw = connection
        .query_row(
            &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = ?1"),
            params![invoice_id],
            raw_invoice_from_row,
        )
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    raw.map(|value| invoice_from_raw(value, db_path)).transpose()
}

pub fn require_invoice(
    connection: &Connection,
    db_path: &Path,
    invoice_id: &str,
) -> ClientResult<Invoice> {
    load_invoice(connection, db_path, invoice_id)?
        .ok_or_else(|| ClientError::invoice_not_found(invoice_id))
}

/// Loads every invoice in `status`, optionally narrowed to one customer,
/// ordered by invoice id.
pub fn load_invoices_with_status(
    connection: &Connection,
    db_path: &Path,
    status: InvoiceStatus,
    customer_id: Option<&str>,
) -> ClientResult<Vec<Invoice>> {
    let mut statement = connection
        .prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices
             WHERE status = ?1 AND (?2 IS NULL OR customer_id = ?2)
             ORDER BY invoice_id ASC"
        ))
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let rows_iter = statement
        .query_map(params![status.as_str(), customer_id], raw_invoice_from_row)
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut invoices = Vec::new();
    for row in rows_iter {
        let raw = row.map_err(|error| map_sqlite_error(db_path, &error))?;
        invoices.push(invoice_from_raw(raw, db_path)?);
    }
    Ok(invoices)
}

/// Loads every invoice that has been escalated at least once.
pub fn load_dunned_invoices(connection: &Connection, db_path: &Path) -> ClientResult<Vec<Invoice>> {
    let mut statement = connection
        .prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices
             WHERE dunning_level > 0
             ORDER BY invoice_id ASC"
        ))
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let rows_iter = statement
        .query_map([], raw_invoice_from_row)
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut invoices = Vec::new();
    for row in rows_iter {
        let raw = row.map_err(|error| map_sqlite_error(db_path, &error))?;
        invoices.push(invoice_from_raw(raw, db_path)?);
    }
    Ok(invoices)
}

/// One page of overdue invoice ids strictly after `after`, ascending.
pub(crate) fn overdue_invoice_ids_after(
    connection: &Connection,
    db_path: &Path,
    after: Option<&str>,
    limit: usize,
) -> ClientResult<Vec<String>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut statement = connection
        .prepare(
            "SELECT invoice_id FROM invoices
             WHERE status = 'overdue' AND (?1 IS NULL OR invoice_id > ?1)
             ORDER BY invoice_id ASC
             LIMIT ?2",
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let rows_iter = statement
        .query_map(params![after, limit], |row| row.get::<_, String>(0))
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut ids = Vec::new();
    for row in rows_iter {
        ids.push(row.map_err(|error| map_sqlite_error(db_path, &error))?);
    }
    Ok(ids)
}

/// Number of overdue invoices for `customer_id`, not counting `excluding`.
pub fn count_overdue_invoices(
    connection: &Connection,
    db_path: &Path,
    customer_id: &str,
    excluding: Option<&str>,
) -> ClientResult<i64> {
    connection
        .query_row(
            "SELECT COUNT(*) FROM invoices
             WHERE customer_id = ?1
               AND status = 'overdue'
               AND (?2 IS NULL OR invoice_id <> ?2)",
            params![customer_id, excluding],
            |row| row.get::<_, i64>(0),
        )
        .map_err(|error| map_sqlite_error(db_path, &error))
}

/// Writes an escalation onto the invoice. The update is guarded on the level
/// the caller read, so it returns `false` instead of skipping a level if the
/// row moved underneath it.
pub(crate) fn write_escalation(
    connection: &Connection,
    db_path: &Path,
    invoice: &Invoice,
    level: DunningLevel,
    dunning_fee: f64,
    total_amount: f64,
    at: &DateTime<Utc>,
) -> ClientResult<bool> {
    let previous_level = level.required_predecessor().unwrap_or(DunningLevel::Clean);
    let updated = connection
        .execute(
            "UPDATE invoices
             SET dunning_level = ?2, dunning_fee = ?3, total_amount = ?4, last_dunning_at = ?5
             WHERE invoice_id = ?1 AND dunning_level = ?6 AND status = 'overdue'",
            params![
                &invoice.invoice_id,
                level.as_i64(),
                dunning_fee,
                total_amount,
                format_timestamp(at),
                previous_level.as_i64(),
            ],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(updated == 1)
}

pub fn load_customer(
    connection: &Connection,
    db_path: &Path,
    customer_id: &str,
) -> ClientResult<Option<Customer>> {
    connection
        .query_row(
            &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE customer_id = ?1"),
            params![customer_id],
            customer_from_row,
        )
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))
}

pub fn require_customer(
    connection: &Connection,
    db_path: &Path,
    customer_id: &str,
) -> ClientResult<Customer> {
    load_customer(connection, db_path, customer_id)?
        .ok_or_else(|| ClientError::customer_not_found(customer_id))
}

pub fn load_suspended_customers(connection: &Connection, db_path: &Path) -> ClientResult<Vec<Customer>> {
    let mut statement = connection
        .prepare(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers
             WHERE service_suspended = 1
             ORDER BY suspended_at ASC, customer_id ASC"
        ))
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let rows_iter = statement
        .query_map([], customer_from_row)
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut customers = Vec::new();
    for row in rows_iter {
        customers.push(row.map_err(|error| map_sqlite_error(db_path, &error))?);
    }
    Ok(customers)
}

pub(crate) fn write_suspension(
    connection: &Connection,
    db_path: &Path,
    customer_id: &str,
    reason: &str,
    at: &DateTime<Utc>,
    actor: &str,
    source: EventSource,
) -> ClientResult<()> {
    connection
        .execute(
            "UPDATE customers
             SET service_suspended = 1,
                 suspended_reason = ?2,
                 suspended_at = ?3,
                 suspended_by = ?4,
                 suspension_source = ?5
             WHERE customer_id = ?1",
            params![customer_id, reason, format_timestamp(at), actor, source.as_str()],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(())
}

pub(crate) fn write_reactivation(
    connection: &Connection,
    db_path: &Path,
    customer_id: &str,
    reason: Option<&str>,
    at: &DateTime<Utc>,
    actor: &str,
) -> ClientResult<()> {
    connection
        .execute(
            "UPDATE customers
             SET service_suspended = 0,
                 reactivated_at = ?2,
                 reactivated_by = ?3,
                 reactivation_reason = ?4
             WHERE customer_id = ?1",
            params![customer_id, format_timestamp(at), actor, reason],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct NewCustomer {
    pub customer_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
}

pub fn register_customer(
    connection: &mut Connection,
    db_path: &Path,
    context: &DunningContext<'_>,
    new_customer: &NewCustomer,
) -> ClientResult<Customer> {
    require_actor(context.actor, "add customer")?;
    let name = new_customer.name.trim();
    if name.is_empty() {
        return Err(ClientError::invalid_argument_for_command(
            "Customer name must not be empty.",
            Some("customer add"),
        ));
    }
    let customer_id = new_customer
        .customer_id
        .clone()
        .unwrap_or_else(|| format!("cus_{}", Ulid::new()));
    let timestamp = format_timestamp(&context.now());

    with_immediate_transaction(connection, db_path, |transaction| {
        if load_customer(transaction, db_path, &customer_id)?.is_some() {
            return Err(ClientError::invalid_argument_for_command(
                &format!("Customer `{customer_id}` already exists."),
                Some("customer add"),
            ));
        }
        transaction
            .execute(
                "INSERT INTO customers (customer_id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![&customer_id, name, &new_customer.email, &timestamp],
            )
            .map_err(|error| map_sqlite_error(db_path, &error))?;
        require_customer(transaction, db_path, &customer_id)
    })
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub customer_id: Option<String>,
    pub number: String,
    pub total_amount: f64,
    pub currency: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub status: InvoiceStatus,
}

/// Records an invoice. Without an explicit due date the customer's policy
/// payment terms apply, falling back to the default terms.
pub fn record_invoice(
    connection: &mut Connection,
    db_path: &Path,
    context: &DunningContext<'_>,
    new_invoice: &NewInvoice,
) -> ClientResult<Invoice> {
    require_actor(context.actor, "add invoice")?;
    let currency = new_invoice.currency.trim().to_ascii_uppercase();
    if currency.len() != 3 || !currency.chars().all(|value| value.is_ascii_alphabetic()) {
        return Err(ClientError::invalid_argument_for_command(
            "Currency must be a 3-letter ISO code.",
            Some("invoice add"),
        ));
    }
    if !new_invoice.total_amount.is_finite() || new_invoice.total_amount < 0.0 {
        return Err(ClientError::invalid_argument_for_command(
            "Invoice total must be a non-negative amount.",
            Some("invoice add"),
        ));
    }
    if matches!(new_invoice.status, InvoiceStatus::Paid) {
        return Err(ClientError::invalid_argument_for_command(
            "Record the invoice first, then mark it paid with `overdue invoice pay`.",
            Some("invoice add"),
        ));
    }

    let now = context.now();
    let issued_at = new_invoice.issued_at.unwrap_or(now);
    let invoice_id = format!("inv_{}", Ulid::new());

    with_immediate_transaction(connection, db_path, |transaction| {
        let mut terms_days = DEFAULT_PAYMENT_TERMS_DAYS;
        if let Some(customer_id) = &new_invoice.customer_id {
            require_customer(transaction, db_path, customer_id)?;
            if let Some(policy) = load_policy_for_customer(transaction, db_path, customer_id)? {
                terms_days = policy.payment_terms_days();
            }
        }
        let due_at = new_invoice
            .due_at
            .unwrap_or(issued_at + Duration::days(terms_days));

        transaction
            .execute(
                "INSERT INTO invoices (
                    invoice_id, customer_id, number, issued_at, due_at, status,
                    total_amount, currency, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    &invoice_id,
                    &new_invoice.customer_id,
                    new_invoice.number.trim(),
                    format_timestamp(&issued_at),
                    format_timestamp(&due_at),
                    new_invoice.status.as_str(),
                    round_money(new_invoice.total_amount),
                    &currency,
                    format_timestamp(&now),
                ],
            )
            .map_err(|error| map_sqlite_error(db_path, &error))?;
        require_invoice(transaction, db_path, &invoice_id)
    })
}

/// Marks an invoice paid. Dunning fields are left as they were so reporting
/// can still see how far the invoice escalated before it was settled.
pub fn record_payment(
    connection: &mut Connection,
    db_path: &Path,
    context: &DunningContext<'_>,
    invoice_id: &str,
    paid_at: Option<DateTime<Utc>>,
) -> ClientResult<Invoice> {
    let actor = require_actor(context.actor, "pay invoice")?;
    let paid_at = paid_at.unwrap_or_else(|| context.now());

    let invoice = with_immediate_transaction(connection, db_path, |transaction| {
        let invoice = require_invoice(transaction, db_path, invoice_id)?;
        if matches!(invoice.status, InvoiceStatus::Paid | InvoiceStatus::Cancelled) {
            return Err(ClientError::invalid_argument_for_command(
                &format!(
                    "Invoice `{invoice_id}` is already {} and cannot be paid.",
                    invoice.status.as_str()
                ),
                Some("invoice pay"),
            )
            .with_data(json!({ "invoice_id": invoice_id, "status": invoice.status })));
        }
        transaction
            .execute(
                "UPDATE invoices SET status = 'paid', paid_at = ?2 WHERE invoice_id = ?1",
                params![invoice_id, format_timestamp(&paid_at)],
            )
            .map_err(|error| map_sqlite_error(db_path, &error))?;
        require_invoice(transaction, db_path, invoice_id)
    })?;

    info!(invoice_id, actor = actor.as_str(), "invoice marked paid");
    Ok(invoice)
}

/// Moves open invoices whose due date has passed into `overdue`.
pub fn flag_overdue_invoices(
    connection: &mut Connection,
    db_path: &Path,
    context: &DunningContext<'_>,
) -> ClientResult<i64> {
    require_actor(context.actor, "flag overdue invoices")?;
    let now = format_timestamp(&context.now());
    let flagged = with_immediate_transaction(connection, db_path, |transaction| {
        transaction
            .execute(
                "UPDATE invoices SET status = 'overdue' WHERE status = 'open' AND due_at < ?1",
                params![now],
            )
            .map_err(|error| map_sqlite_error(db_path, &error))
    })?;
    Ok(flagged as i64)
}

fn raw_invoice_from_row(row: &Row<'_>) -> rusqlite::Result<RawInvoice> {
    Ok(RawInvoice {
        invoice_id: row.get(0)?,
        customer_id: row.get(1)?,
        number: row.get(2)?,
        issued_at: row.get(3)?,
        due_at: row.get(4)?,
        status: row.get(5)?,
        total_amount: row.get(6)?,
        currency: row.get(7)?,
        dunning_level: row.get(8)?,
        dunning_fee: row.get(9)?,
        last_dunning_at: row.get(10)?,
        paid_at: row.get(11)?,
    })
}

fn invoice_from_raw(raw: RawInvoice, db_path: &Path) -> ClientResult<Invoice> {
    let corrupt = |field: &str| {
        ClientError::ledger_corrupt(db_path).with_data(json!({
            "invoice_id": raw.invoice_id,
            "field": field,
        }))
    };

    let issued_at = parse_timestamp(&raw.issued_at).ok_or_else(|| corrupt("issued_at"))?;
    let due_at = parse_timestamp(&raw.due_at).ok_or_else(|| corrupt("due_at"))?;
    let status = InvoiceStatus::parse(&raw.status).ok_or_else(|| corrupt("status"))?;
    let dunning_level =
        DunningLevel::from_i64(raw.dunning_level).ok_or_else(|| corrupt("dunning_level"))?;
    let last_dunning_at = match &raw.last_dunning_at {
        Some(value) => Some(parse_timestamp(value).ok_or_else(|| corrupt("last_dunning_at"))?),
        None => None,
    };
    let paid_at = match &raw.paid_at {
        Some(value) => Some(parse_timestamp(value).ok_or_else(|| corrupt("paid_at"))?),
        None => None,
    };

    Ok(Invoice {
        invoice_id: raw.invoice_id,
        customer_id: raw.customer_id,
        number: raw.number,
        issued_at,
        due_at,
        status,
        total_amount: raw.total_amount,
        currency: raw.currency,
        dunning_level,
        dunning_fee: raw.dunning_fee,
        last_dunning_at,
        paid_at,
    })
}

fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    let source: Option<String> = row.get(7)?;
    Ok(Customer {
        customer_id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        suspension: SuspensionSnapshot {
            suspended: row.get(3)?,
            reason: row.get(4)?,
            suspended_at: row.get(5)?,
            suspended_by: row.get(6)?,
            source: source.as_deref().and_then(EventSource::parse),
            reactivated_at: row.get(8)?,
            reactivated_by: row.get(9)?,
            reactivation_reason: row.get(10)?,
        },
    })
}
