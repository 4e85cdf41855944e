use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::dunning::DunningContext;
use crate::dunning::history::{EventKind, EventSource, NewEvent, record_event};
use crate::dunning::policy::load_policy_for_customer;
use crate::dunning::store::{
    Customer, InvoiceStatus, count_overdue_invoices, require_customer, require_invoice,
    write_reactivation, write_suspension,
};
use crate::identity::{Actor, require_actor};
use crate::state::with_immediate_transaction;
use crate::{ClientError, ClientResult};

pub const OTHER_OVERDUE_REMAIN: &str = "other overdue invoices remain";

/// Acknowledgement of an administrative suspend or reactivate. `changed` is
/// false when the customer was already in the requested state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceChange {
    pub customer_id: String,
    pub suspended: bool,
    pub changed: bool,
    pub source: EventSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactivationOutcome {
    pub invoice_id: String,
    pub customer_id: Option<String>,
    pub success: bool,
    pub reason: Option<String>,
    pub remaining_overdue: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceGate {
    Suspended,
    PrepaymentRequired,
    OverdueInvoices,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCheck {
    pub customer_id: String,
    pub allowed: bool,
    pub reason: Option<String>,
    pub gate: Option<ServiceGate>,
    pub overdue_invoices: i64,
}

/// Suspends the customer because `invoice_id` reached level 3. Runs inside the
/// escalation's transaction. An existing suspension is left untouched; the
/// return value says whether the customer is suspended afterwards.
pub(crate) fn suspend_for_level3(
    connection: &Connection,
    db_path: &Path,
    customer: &Customer,
    invoice_id: &str,
    at: &DateTime<Utc>,
    actor: &Actor,
) -> ClientResult<bool> {
    if customer.suspension.suspended {
        return Ok(true);
    }

    let reason = format!("invoice {invoice_id} reached dunning level 3");
    write_suspension(
        connection,
        db_path,
        &customer.customer_id,
        &reason,
        at,
        actor.as_str(),
        EventSource::Automatic,
    )?;
    record_event(
        connection,
        db_path,
        &NewEvent {
            invoice_id: Some(invoice_id),
            customer_id: &customer.customer_id,
            kind: EventKind::Suspended,
            source: EventSource::Automatic,
            actor: actor.as_str(),
            fee: None,
            total_after: None,
            occurred_at: at,
            note: Some(&reason),
        },
    )?;
    info!(
        customer_id = %customer.customer_id,
        invoice_id,
        "service suspended after level 3"
    );
    Ok(true)
}

/// Administrative suspension, independent of any invoice's level.
pub fn suspend_service(
    connection: &mut Connection,
    db_path: &Path,
    context: &DunningContext<'_>,
    customer_id: &str,
    reason: &str,
) -> ClientResult<ServiceChange> {
    let actor = require_actor(context.actor, "suspend service")?;
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ClientError::invalid_argument_for_command(
            "A suspension reason is required.",
            Some("service suspend"),
        ));
    }
    let now = context.now();

    with_immediate_transaction(connection, db_path, |transaction| {
        let customer = require_customer(transaction, db_path, customer_id)?;
        if customer.suspension.suspended {
            return Ok(ServiceChange {
                customer_id: customer.customer_id,
                suspended: true,
                changed: false,
                source: EventSource::Manual,
            });
        }

        write_suspension(
            transaction,
            db_path,
            customer_id,
            reason,
            &now,
            actor.as_str(),
            EventSource::Manual,
        )?;
        record_event(
            transaction,
            db_path,
            &NewEvent {
                invoice_id: None,
                customer_id,
                kind: EventKind::Suspended,
                source: EventSource::Manual,
                actor: actor.as_str(),
                fee: None,
                total_after: None,
                occurred_at: &now,
                note: Some(reason),
            },
        )?;
        info!(customer_id, actor = actor.as_str(), "service suspended manually");

        Ok(ServiceChange {
            customer_id: customer.customer_id,
            suspended: true,
            changed: true,
            source: EventSource::Manual,
        })
    })
}

/// Administrative reactivation. Lifts any suspension regardless of what
/// triggered it or how many invoices are still overdue.
pub fn reactivate_service(
    connection: &mut Connection,
    db_path: &Path,
    context: &DunningContext<'_>,
    customer_id: &str,
    reason: Option<&str>,
) -> ClientResult<ServiceChange> {
    let actor = require_actor(context.actor, "reactivate service")?;
    let reason = reason.map(str::trim).filter(|value| !value.is_empty());
    let now = context.now();

    with_immediate_transaction(connection, db_path, |transaction| {
        let customer = require_customer(transaction, db_path, customer_id)?;
        if !customer.suspension.suspended {
            return Ok(ServiceChange {
                customer_id: customer.customer_id,
                suspended: false,
                changed: false,
                source: EventSource::Manual,
            });
        }

        write_reactivation(transaction, db_path, customer_id, reason, &now, actor.as_str())?;
        record_event(
            transaction,
            db_path,
            &NewEvent {
                invoice_id: None,
                customer_id,
                kind: EventKind::Reactivated,
                source: EventSource::Manual,
                actor: actor.as_str(),
                fee: None,
                total_after: None,
                occurred_at: &now,
                note: reason,
            },
        )?;
        info!(customer_id, actor = actor.as_str(), "service reactivated manually");

        Ok(ServiceChange {
            customer_id: customer.customer_id,
            suspended: false,
            changed: true,
            source: EventSource::Manual,
        })
    })
}

/// Lifts a suspension once `invoice_id` is paid, provided the policy allows
/// it and the customer has no other overdue invoices.
pub fn auto_reactivate_on_payment(
    connection: &mut Connection,
    db_path: &Path,
    context: &DunningContext<'_>,
    invoice_id: &str,
) -> ClientResult<ReactivationOutcome> {
    let actor = require_actor(context.actor, "auto-reactivate service")?;
    let now = context.now();

    with_immediate_transaction(connection, db_path, |transaction| {
        let invoice = require_invoice(transaction, db_path, invoice_id)?;
        let declined = |customer_id: Option<&str>, reason: &str, remaining: i64| ReactivationOutcome {
            invoice_id: invoice_id.to_string(),
            customer_id: customer_id.map(str::to_string),
            success: false,
            reason: Some(reason.to_string()),
            remaining_overdue: remaining,
        };

        if invoice.status != InvoiceStatus::Paid {
            return Ok(declined(
                invoice.customer_id.as_deref(),
                "invoice is not paid",
                0,
            ));
        }
        let Some(customer_id) = invoice.customer_id.as_deref() else {
            return Ok(declined(None, "invoice has no associated customer", 0));
        };
        let customer = require_customer(transaction, db_path, customer_id)?;
        let Some(policy) = load_policy_for_customer(transaction, db_path, customer_id)? else {
            return Ok(declined(Some(customer_id), "customer has no dunning policy", 0));
        };
        if !policy.auto_reactivate_on_payment {
            return Ok(declined(
                Some(customer_id),
                "automatic reactivation is disabled by policy",
                0,
            ));
        }
        if !customer.suspension.suspended {
            return Ok(declined(Some(customer_id), "service is not suspended", 0));
        }

        let remaining = count_overdue_invoices(transaction, db_path, customer_id, Some(invoice_id))?;
        if remaining > 0 {
            return Ok(declined(Some(customer_id), OTHER_OVERDUE_REMAIN, remaining));
        }

        let reason = format!("invoice {invoice_id} paid");
        write_reactivation(
            transaction,
            db_path,
            customer_id,
            Some(&reason),
            &now,
            actor.as_str(),
        )?;
        record_event(
            transaction,
            db_path,
            &NewEvent {
                invoice_id: Some(invoice_id),
                customer_id,
                kind: EventKind::Reactivated,
                source: EventSource::Automatic,
                actor: actor.as_str(),
                fee: None,
                total_after: None,
                occurred_at: &now,
                note: Some(&reason),
            },
        )?;
        info!(customer_id, invoice_id, "service reactivated after payment");

        Ok(ReactivationOutcome {
            invoice_id: invoice_id.to_string(),
            customer_id: Some(customer_id.to_string()),
            success: true,
            reason: None,
            remaining_overdue: 0,
        })
    })
}

/// Decides whether new service may be provisioned for the customer. Gates are
/// evaluated in order and the first that applies wins: an active suspension,
/// then mandatory prepayment, then outstanding overdue invoices when the
/// policy does not tolerate them. Without a policy only the suspension gate
/// applies.
pub fn check_service_allowed(
    connection: &Connection,
    db_path: &Path,
    customer_id: &str,
) -> ClientResult<ServiceCheck> {
    let customer = require_customer(connection, db_path, customer_id)?;
    let policy = load_policy_for_customer(connection, db_path, customer_id)?;
    let overdue_invoices = count_overdue_invoices(connection, db_path, customer_id, None)?;

    let refusal = if customer.suspension.suspended {
        let reason = match customer.suspension.reason.as_deref() {
            Some(reason) => format!("service suspended: {reason}"),
            None => "service suspended".to_string(),
        };
        Some((ServiceGate::Suspended, reason))
    } else {
        match &policy {
            Some(policy) if policy.require_prepayment => Some((
                ServiceGate::PrepaymentRequired,
                "prepayment required".to_string(),
            )),
            Some(policy) if !policy.allow_service_when_overdue && overdue_invoices > 0 => Some((
                ServiceGate::OverdueInvoices,
                format!("{overdue_invoices} overdue invoice(s) outstanding"),
            )),
            _ => None,
        }
    };

    Ok(match refusal {
        Some((gate, reason)) => ServiceCheck {
            customer_id: customer.customer_id,
            allowed: false,
            reason: Some(reason),
            gate: Some(gate),
            overdue_invoices,
        },
        None => ServiceCheck {
            customer_id: customer.customer_id,
            allowed: true,
            reason: None,
            gate: None,
            overdue_invoices,
        },
    })
}
