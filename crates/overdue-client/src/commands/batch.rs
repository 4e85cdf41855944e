use std::path::Path;

use chrono::{DateTime, Utc};

use crate::ClientResult;
use crate::commands::common::{clock_for, open_write_session};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::dunning::DunningContext;
use crate::dunning::batch::{BatchOptions, DEFAULT_PAGE_SIZE, run_batch_escalation};
use crate::dunning::notify::{LogNotifier, Notifier};
use crate::identity::resolve_actor;

#[derive(Default)]
pub struct BatchRunOptions<'a> {
    pub page_size: Option<usize>,
    pub max_invoices: Option<usize>,
    pub actor: Option<String>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
    #[doc(hidden)]
    pub notifier: Option<&'a dyn Notifier>,
}

pub fn run(options: BatchRunOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let actor = resolve_actor(options.actor.as_deref());
    let clock = clock_for(options.now);
    let notifier = options.notifier.unwrap_or(&LogNotifier);
    let context = DunningContext::new(actor.as_ref(), clock.as_ref(), notifier);
    let mut session = open_write_session(&context, "run batch escalation", options.home_override)?;

    let summary = run_batch_escalation(
        &mut session.connection,
        &session.db_path,
        &context,
        BatchOptions {
            page_size: options.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            max_invoices: options.max_invoices,
        },
    )?;

    let mut warnings = Vec::new();
    if summary.errors > 0 {
        warnings.push(format!(
            "{} invoice(s) failed and were left at their previous level.",
            summary.errors
        ));
    }
    if summary.notices_failed > 0 {
        warnings.push(format!(
            "{} dunning notice(s) could not be delivered.",
            summary.notices_failed
        ));
    }
    let envelope = success("batch run", summary)?;
    Ok(warnings.into_iter().fold(envelope, SuccessEnvelope::with_warning))
}
