pub mod batch;
pub mod clock;
pub mod history;
pub mod level;
pub mod notify;
pub mod overdue;
pub mod policy;
pub mod reports;
pub mod store;
pub mod suspension;
pub mod transition;

use chrono::{DateTime, Utc};

use crate::dunning::clock::{Clock, ledger_now};
use crate::dunning::notify::Notifier;
use crate::identity::Actor;

/// Collaborators every dunning operation runs against: who is calling, what
/// time it is, and where notices go.
#[derive(Clone, Copy)]
pub struct DunningContext<'a> {
    pub actor: Option<&'a Actor>,
    pub clock: &'a dyn Clock,
    pub notifier: &'a dyn Notifier,
}

impl<'a> DunningContext<'a> {
    pub fn new(actor: Option<&'a Actor>, clock: &'a dyn Clock, notifier: &'a dyn Notifier) -> Self {
        Self {
            actor,
            clock,
            notifier,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        ledger_now(self.clock)
    }
}
