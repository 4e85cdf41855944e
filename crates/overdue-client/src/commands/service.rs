use std::path::Path;

use chrono::{DateTime, Utc};

use crate::ClientResult;
use crate::commands::common::{clock_for, open_session, open_write_session};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::dunning::DunningContext;
use crate::dunning::notify::LogNotifier;
use crate::dunning::suspension::{
    auto_reactivate_on_payment, check_service_allowed, reactivate_service, suspend_service,
};
use crate::identity::resolve_actor;

#[derive(Debug, Default)]
pub struct ServiceChangeOptions<'a> {
    pub customer_id: String,
    /// Required for suspension, optional for reactivation.
    pub reason: Option<String>,
    pub actor: Option<String>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
}

pub fn suspend(options: ServiceChangeOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let actor = resolve_actor(options.actor.as_deref());
    let clock = clock_for(options.now);
    let context = DunningContext::new(actor.as_ref(), clock.as_ref(), &LogNotifier);
    let mut session = open_write_session(&context, "suspend service", options.home_override)?;

    let change = suspend_service(
        &mut session.connection,
        &session.db_path,
        &context,
        &options.customer_id,
        options.reason.as_deref().unwrap_or_default(),
    )?;
    success("service suspend", change)
}

pub fn reactivate(options: ServiceChangeOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let actor = resolve_actor(options.actor.as_deref());
    let clock = clock_for(options.now);
    let context = DunningContext::new(actor.as_ref(), clock.as_ref(), &LogNotifier);
    let mut session = open_write_session(&context, "reactivate service", options.home_override)?;

    let change = reactivate_service(
        &mut session.connection,
        &session.db_path,
        &context,
        &options.customer_id,
        options.reason.as_deref(),
    )?;
    success("service reactivate", change)
}

#[derive(Debug, Default)]
pub struct AutoReactivateOptions<'a> {
    pub invoice_id: String,
    pub actor: Option<String>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
}

pub fn auto_reactivate(options: AutoReactivateOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let actor = resolve_actor(options.actor.as_deref());
    let clock = clock_for(options.now);
    let context = DunningContext::new(actor.as_ref(), clock.as_ref(), &LogNotifier);
    let mut session = open_write_session(&context, "auto-reactivate service", options.home_override)?;

    let outcome = auto_reactivate_on_payment(
        &mut session.connection,
        &session.db_path,
        &context,
        &options.invoice_id,
    )?;
    success("service auto-reactivate", outcome)
}

pub fn check(customer_id: &str, home_override: Option<&Path>) -> ClientResult<SuccessEnvelope> {
    let session = open_session(home_override)?;
    let check = check_service_allowed(&session.connection, &session.db_path, customer_id)?;
    success("service check", check)
}
