use std::path::Path;

use chrono::{DateTime, Utc};

use crate::ClientResult;
use crate::commands::common::{clock_for, open_write_session};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::dunning::DunningContext;
use crate::dunning::notify::LogNotifier;
use crate::dunning::store::{NewCustomer, register_customer};
use crate::identity::resolve_actor;

#[derive(Debug, Default)]
pub struct CustomerAddOptions<'a> {
    pub customer_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub actor: Option<String>,
    pub home_override: Option<&'a Path>,
    #[doc(hidden)]
    pub now: Option<DateTime<Utc>>,
}

pub fn add(options: CustomerAddOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let actor = resolve_actor(options.actor.as_deref());
    let clock = clock_for(options.now);
    let context = DunningContext::new(actor.as_ref(), clock.as_ref(), &LogNotifier);
    let mut session = open_write_session(&context, "add customer", options.home_override)?;

    let customer = register_customer(
        &mut session.connection,
        &session.db_path,
        &context,
        &NewCustomer {
            customer_id: options.customer_id,
            name: options.name,
            email: options.email,
        },
    )?;
    success("customer add", customer)
}
