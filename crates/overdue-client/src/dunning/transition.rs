//! The escalation state machine: Clean -> Level1 -> Level2 -> Level3.
//!
//! A level is only ever entered from the one directly below it, and only once
//! the invoice is overdue by at least that level's threshold. Each transition
//! adds the level's fee to the invoice total and the cumulative dunning fee,
//! stamps the dunning date, and on level 3 evaluates the suspension trigger.
//! The notice for a transition is dispatched after its database transaction
//! commits; a failed notice never undoes the transition.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::dunning::DunningContext;
use crate::dunning::history::{EventKind, EventSource, NewEvent, record_event};
use crate::dunning::level::DunningLevel;
use crate::dunning::notify::{DunningNotice, NoticeOutcome, Notifier};
use crate::dunning::overdue::days_overdue;
use crate::dunning::policy::{DunningPolicy, load_policy_for_customer, round_money};
use crate::dunning::store::{Customer, Invoice, InvoiceStatus, require_customer, require_invoice, write_escalation};
use crate::dunning::suspension::suspend_for_level3;
use crate::identity::{Actor, require_actor};
use crate::state::with_immediate_transaction;
use crate::{ClientError, ClientResult};

/// Per-call overrides for a manual transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionOptions {
    /// Send the notice regardless of the policy's auto-send flag (`Some(true)`)
    /// or suppress it (`Some(false)`).
    pub send_email: Option<bool>,
    /// Level 3 only: force or suppress the suspension trigger.
    pub suspend: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub invoice_id: String,
    pub customer_id: String,
    pub previous_level: DunningLevel,
    pub level: DunningLevel,
    pub days_overdue: i64,
    pub fee: f64,
    pub new_total: f64,
    pub dunning_fee: f64,
    pub currency: String,
    pub suspended: bool,
    pub source: EventSource,
    pub notice: NoticeOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRefusal {
    NotOverdue(InvoiceStatus),
    OutOfSequence {
        current: DunningLevel,
        requested: DunningLevel,
    },
    ThresholdNotReached {
        days_overdue: i64,
        threshold_days: i64,
    },
}

impl TransitionRefusal {
    fn describe(self) -> String {
        match self {
            Self::NotOverdue(status) => {
                format!("the invoice is {}, not overdue", status.as_str())
            }
            Self::OutOfSequence { current, requested } => match requested.required_predecessor() {
                Some(required) => format!(
                    "{} requires the invoice to be at level {}, but it is at level {}",
                    requested.as_str(),
                    required.as_i64(),
                    current.as_i64()
                ),
                None => "the clean level cannot be entered".to_string(),
            },
            Self::ThresholdNotReached {
                days_overdue,
                threshold_days,
            } => format!(
                "the invoice is {days_overdue} days overdue and the level needs {threshold_days}"
            ),
        }
    }
}

/// Checks whether `invoice` may move to `target` under `policy` at `now`.
/// Policy exemption is checked by the callers, which treat it differently.
pub fn check_transition(
    invoice: &Invoice,
    policy: &DunningPolicy,
    target: DunningLevel,
    now: &DateTime<Utc>,
) -> Result<(), TransitionRefusal> {
    if invoice.status != InvoiceStatus::Overdue {
        return Err(TransitionRefusal::NotOverdue(invoice.status));
    }

    let Some(threshold_days) = policy.threshold_days(target) else {
        return Err(TransitionRefusal::OutOfSequence {
            current: invoice.dunning_level,
            requested: target,
        });
    };
    if target.required_predecessor() != Some(invoice.dunning_level) {
        return Err(TransitionRefusal::OutOfSequence {
            current: invoice.dunning_level,
            requested: target,
        });
    }

    let days = days_overdue(&invoice.due_at, now);
    if days < threshold_days {
        return Err(TransitionRefusal::ThresholdNotReached {
            days_overdue: days,
            threshold_days,
        });
    }

    Ok(())
}

/// Manually moves one invoice to `level`.
pub fn process_level(
    connection: &mut Connection,
    db_path: &Path,
    context: &DunningContext<'_>,
    invoice_id: &str,
    level: DunningLevel,
    options: TransitionOptions,
) -> ClientResult<TransitionOutcome> {
    let actor = require_actor(context.actor, "process dunning level")?;
    if level == DunningLevel::Clean {
        return Err(ClientError::invalid_argument_for_command(
            "Dunning level must be 1, 2 or 3.",
            Some("escalate"),
        ));
    }
    let now = context.now();

    let escalation = with_immediate_transaction(connection, db_path, |transaction| {
        let invoice = require_invoice(transaction, db_path, invoice_id)?;
        let Some(customer_id) = invoice.customer_id.as_deref() else {
            return Err(ClientError::new(
                "policy_missing",
                &format!("Invoice `{invoice_id}` has no associated customer, so no dunning policy applies."),
                vec!["Assign the invoice to a customer with a dunning policy.".to_string()],
            )
            .with_data(json!({ "invoice_id": invoice_id })));
        };
        let policy = load_policy_for_customer(transaction, db_path, customer_id)?
            .ok_or_else(|| ClientError::policy_missing(customer_id, invoice_id))?;
        if let Some(reason) = policy.exemption_reason() {
            return Err(ClientError::policy_disabled(customer_id, reason));
        }
        let customer = require_customer(transaction, db_path, customer_id)?;

        let send_notice = options.send_email.unwrap_or(policy.auto_send(level));
        let suspend = options.suspend.unwrap_or(policy.level3_suspend_service);
        escalate_in_transaction(
            transaction,
            db_path,
            &EscalationRequest {
                invoice: &invoice,
                policy: &policy,
                customer: &customer,
                target: level,
                actor,
                now: &now,
                source: EventSource::Manual,
                suspend,
                send_notice,
            },
        )
    })?;

    Ok(escalation.finish(context.notifier))
}

pub(crate) struct EscalationRequest<'a> {
    pub(crate) invoice: &'a Invoice,
    pub(crate) policy: &'a DunningPolicy,
    pub(crate) customer: &'a Customer,
    pub(crate) target: DunningLevel,
    pub(crate) actor: &'a Actor,
    pub(crate) now: &'a DateTime<Utc>,
    pub(crate) source: EventSource,
    pub(crate) suspend: bool,
    pub(crate) send_notice: bool,
}

/// A committed-to-be escalation whose notice has not been dispatched yet.
pub(crate) struct PendingEscalation {
    outcome: TransitionOutcome,
    notice: Option<DunningNotice>,
}

impl PendingEscalation {
    /// Dispatches the notice, if any. Call only after the transaction that
    /// produced this escalation has committed.
    pub(crate) fn finish(self, notifier: &dyn Notifier) -> TransitionOutcome {
        let mut outcome = self.outcome;
        if let Some(notice) = self.notice {
            outcome.notice = match notifier.send_dunning_notice(&notice) {
                Ok(()) => NoticeOutcome::Sent,
                Err(error) => {
                    warn!(
                        invoice_id = %notice.invoice_id,
                        level = notice.level.as_str(),
                        error = %error,
                        "dunning notice failed; transition kept"
                    );
                    NoticeOutcome::Failed
                }
            };
        }
        outcome
    }
}

pub(crate) fn escalate_in_transaction(
    transaction: &Transaction<'_>,
    db_path: &Path,
    request: &EscalationRequest<'_>,
) -> ClientResult<PendingEscalation> {
    let invoice = request.invoice;
    let target = request.target;

    check_transition(invoice, request.policy, target, request.now).map_err(|refusal| {
        ClientError::invalid_state_transition(
            &invoice.invoice_id,
            &refusal.describe(),
            json!({
                "invoice_id": invoice.invoice_id,
                "current_level": invoice.dunning_level.as_i64(),
                "requested_level": target.as_i64(),
                "status": invoice.status,
                "days_overdue": days_overdue(&invoice.due_at, request.now),
            }),
        )
    })?;

    let fee = request.policy.fee(target);
    let new_total = round_money(invoice.total_amount + fee);
    let dunning_fee = round_money(invoice.dunning_fee + fee);

    let written = write_escalation(
        transaction,
        db_path,
        invoice,
        target,
        dunning_fee,
        new_total,
        request.now,
    )?;
    if !written {
        return Err(ClientError::invalid_state_transition(
            &invoice.invoice_id,
            "the invoice changed while it was being escalated",
            json!({ "invoice_id": invoice.invoice_id }),
        ));
    }

    let customer_id = request.customer.customer_id.as_str();
    if let Some(kind) = EventKind::for_level(target) {
        record_event(
            transaction,
            db_path,
            &NewEvent {
                invoice_id: Some(&invoice.invoice_id),
                customer_id,
                kind,
                source: request.source,
                actor: request.actor.as_str(),
                fee: Some(fee),
                total_after: Some(new_total),
                occurred_at: request.now,
                note: None,
            },
        )?;
    }

    let suspended = if target == DunningLevel::Level3 && request.suspend {
        suspend_for_level3(
            transaction,
            db_path,
            request.customer,
            &invoice.invoice_id,
            request.now,
            request.actor,
        )?
    } else {
        false
    };

    info!(
        invoice_id = %invoice.invoice_id,
        customer_id,
        level = target.as_str(),
        fee,
        new_total,
        source = request.source.as_str(),
        suspended,
        "dunning level applied"
    );

    let notice = request.send_notice.then(|| DunningNotice {
        invoice_id: invoice.invoice_id.clone(),
        invoice_number: invoice.number.clone(),
        customer_id: customer_id.to_string(),
        recipient: request
            .policy
            .dunning_contact_email
            .clone()
            .or_else(|| request.customer.email.clone()),
        level: target,
        fee,
        total_amount: new_total,
        currency: invoice.currency.clone(),
        service_suspended: suspended,
    });

    Ok(PendingEscalation {
        outcome: TransitionOutcome {
            invoice_id: invoice.invoice_id.clone(),
            customer_id: customer_id.to_string(),
            previous_level: invoice.dunning_level,
            level: target,
            days_overdue: days_overdue(&invoice.due_at, request.now),
            fee,
            new_total,
            dunning_fee,
            currency: invoice.currency.clone(),
            suspended,
            source: request.source,
            notice: NoticeOutcome::NotRequested,
        },
        notice,
    })
}
