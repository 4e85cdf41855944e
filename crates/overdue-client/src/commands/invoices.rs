use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::ClientResult;
use crate::commands::common::{clock_for, open_write_session};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::{FlaggedOverdueData, InvoicePaidData};
use crate::dunning::DunningContext;
use crate::dunning::clock::format_timestamp;
use crate::dunning::notify::LogNotifier;
use crate::dunning::store::{
    InvoiceStatus, NewInvoice, flag_overdue_invoices, record_invoice, record_payment,
};
use crate::dunning::suspension::auto_reactivate_on_payment;
use crate::identity::resolve_actor;

#[derive(Debug)]
pub struct InvoiceAddOptions<'a> {
    pub customer_id: Option<String>,
    pub number: String,
    pub total_amount: f64,
    pub currency: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    /// Record the invoice directly as overdue instead of open.
    pub overdue: bool,
    pub actor: Option<String>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
}

pub fn add(options: InvoiceAddOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let actor = resolve_actor(options.actor.as_deref());
    let clock = clock_for(options.now);
    let context = DunningContext::new(actor.as_ref(), clock.as_ref(), &LogNotifier);
    let mut session = open_write_session(&context, "add invoice", options.home_override)?;

    let status = if options.overdue {
        InvoiceStatus::Overdue
    } else {
        InvoiceStatus::Open
    };
    let invoice = record_invoice(
        &mut session.connection,
        &session.db_path,
        &context,
        &NewInvoice {
            customer_id: options.customer_id,
            number: options.number,
            total_amount: options.total_amount,
            currency: options.currency,
            issued_at: options.issued_at,
            due_at: options.due_at,
            status,
        },
    )?;
    success("invoice add", invoice)
}

#[derive(Debug, Default)]
pub struct InvoicePayOptions<'a> {
    pub invoice_id: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub actor: Option<String>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
}

/// Marks the invoice paid and then runs the auto-reactivation check for its
/// customer.
pub fn pay(options: InvoicePayOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let actor = resolve_actor(options.actor.as_deref());
    let clock = clock_for(options.now);
    let context = DunningContext::new(actor.as_ref(), clock.as_ref(), &LogNotifier);
    let mut session = open_write_session(&context, "pay invoice", options.home_override)?;

    let invoice = record_payment(
        &mut session.connection,
        &session.db_path,
        &context,
        &options.invoice_id,
        options.paid_at,
    )?;
    let reactivation = auto_reactivate_on_payment(
        &mut session.connection,
        &session.db_path,
        &context,
        &options.invoice_id,
    );
    let (reactivation, warning) = match reactivation {
        Ok(outcome) => (Some(outcome), None),
        Err(error) => {
            warn!(invoice_id = %options.invoice_id, code = %error.code, "reactivation check failed after payment");
            let warning = format!(
                "The payment was recorded but the reactivation check failed ({}). Run `overdue service auto-reactivate {}` to retry it.",
                error.code, options.invoice_id
            );
            (None, Some(warning))
        }
    };

    let envelope = success(
        "invoice pay",
        InvoicePaidData {
            invoice,
            reactivation,
        },
    )?;
    Ok(match warning {
        Some(warning) => envelope.with_warning(warning),
        None => envelope,
    })
}

#[derive(Debug, Default)]
pub struct FlagOverdueOptions<'a> {
    pub actor: Option<String>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
}

pub fn flag_overdue(options: FlagOverdueOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let actor = resolve_actor(options.actor.as_deref());
    let clock = clock_for(options.now);
    let context = DunningContext::new(actor.as_ref(), clock.as_ref(), &LogNotifier);
    let mut session = open_write_session(&context, "flag overdue invoices", options.home_override)?;

    let flagged = flag_overdue_invoices(&mut session.connection, &session.db_path, &context)?;
    success(
        "invoice flag-overdue",
        FlaggedOverdueData {
            as_of: format_timestamp(&context.now()),
            flagged,
        },
    )
}
