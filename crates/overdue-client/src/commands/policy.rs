use std::path::Path;

use chrono::{DateTime, Utc};

use crate::commands::common::{clock_for, open_session, open_write_session};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::PolicyData;
use crate::dunning::DunningContext;
use crate::dunning::notify::LogNotifier;
use crate::dunning::policy::{PolicyOverrides, create_policy, load_policy_view, update_policy};
use crate::identity::resolve_actor;
use crate::{ClientError, ClientResult};

#[derive(Debug, Default)]
pub struct PolicyCreateOptions<'a> {
    pub customer_id: String,
    pub overrides: PolicyOverrides,
    pub actor: Option<String>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
}

pub fn create(options: PolicyCreateOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let actor = resolve_actor(options.actor.as_deref());
    let clock = clock_for(options.now);
    let context = DunningContext::new(actor.as_ref(), clock.as_ref(), &LogNotifier);
    let mut session = open_write_session(&context, "create policy", options.home_override)?;

    let policy = create_policy(
        &mut session.connection,
        &session.db_path,
        &context,
        &options.customer_id,
        &options.overrides,
    )?;
    let view = load_policy_view(&session.connection, &session.db_path, &policy.customer_id)?;
    success(
        "policy create",
        PolicyData {
            policy_id: policy.policy_id,
            policy: view,
        },
    )
}

#[derive(Debug, Default)]
pub struct PolicyUpdateOptions<'a> {
    pub policy_id: String,
    pub overrides: PolicyOverrides,
    pub actor: Option<String>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
}

pub fn update(options: PolicyUpdateOptions<'_>) -> ClientResult<SuccessEnvelope> {
    if options.overrides.is_empty() {
        return Err(ClientError::invalid_argument_for_command(
            "Nothing to update: pass at least one policy field.",
            Some("policy update"),
        ));
    }
    let actor = resolve_actor(options.actor.as_deref());
    let clock = clock_for(options.now);
    let context = DunningContext::new(actor.as_ref(), clock.as_ref(), &LogNotifier);
    let mut session = open_write_session(&context, "update policy", options.home_override)?;

    let policy = update_policy(
        &mut session.connection,
        &session.db_path,
        &context,
        &options.policy_id,
        &options.overrides,
    )?;
    let view = load_policy_view(&session.connection, &session.db_path, &policy.customer_id)?;
    success(
        "policy update",
        PolicyData {
            policy_id: policy.policy_id,
            policy: view,
        },
    )
}

pub fn show(customer_id: &str, home_override: Option<&Path>) -> ClientResult<SuccessEnvelope> {
    let session = open_session(home_override)?;
    let view = load_policy_view(&session.connection, &session.db_path, customer_id)?;
    success(
        "policy show",
        PolicyData {
            policy_id: view.policy.policy_id.clone(),
            policy: view,
        },
    )
}
