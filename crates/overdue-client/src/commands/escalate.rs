use std::path::Path;

use chrono::{DateTime, Utc};

use crate::ClientResult;
use crate::commands::common::{clock_for, open_write_session, parse_level_argument};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::dunning::DunningContext;
use crate::dunning::notify::{LogNotifier, NoticeOutcome, Notifier};
use crate::dunning::transition::{TransitionOptions, process_level};
use crate::identity::resolve_actor;

#[derive(Default)]
pub struct EscalateOptions<'a> {
    pub invoice_id: String,
    /// 1, 2 or 3.
    pub level: i64,
    pub send_email: Option<bool>,
    pub suspend: Option<bool>,
    pub actor: Option<String>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
    #[doc(hidden)]
    pub notifier: Option<&'a dyn Notifier>,
}

pub fn run(options: EscalateOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let level = parse_level_argument(options.level, "escalate")?;
    let actor = resolve_actor(options.actor.as_deref());
    let clock = clock_for(options.now);
    let notifier = options.notifier.unwrap_or(&LogNotifier);
    let context = DunningContext::new(actor.as_ref(), clock.as_ref(), notifier);
    let mut session = open_write_session(&context, "process dunning level", options.home_override)?;

    let outcome = process_level(
        &mut session.connection,
        &session.db_path,
        &context,
        &options.invoice_id,
        level,
        TransitionOptions {
            send_email: options.send_email,
            suspend: options.suspend,
        },
    )?;
    let notice_failed = outcome.notice == NoticeOutcome::Failed;
    let envelope = success("escalate", outcome)?;
    if notice_failed {
        return Ok(envelope.with_warning(
            "The level was applied but the dunning notice could not be delivered.".to_string(),
        ));
    }
    Ok(envelope)
}
