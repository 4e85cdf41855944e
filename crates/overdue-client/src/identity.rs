use serde::Serialize;

use crate::{ClientError, ClientResult};

pub const ACTOR_ENV_VAR: &str = "OVERDUE_ACTOR";

/// The resolved caller of a mutating operation, as handed over by whatever
/// identity provider sits in front of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    /// Returns `None` for blank names so an empty `--actor ""` is treated as
    /// unauthenticated.
    pub fn new(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An explicit name wins over `OVERDUE_ACTOR`; blank values resolve to no
/// actor at all.
pub fn resolve_actor(explicit: Option<&str>) -> Option<Actor> {
    match explicit {
        Some(name) => Actor::new(name),
        None => std::env::var(ACTOR_ENV_VAR)
            .ok()
            .and_then(|name| Actor::new(&name)),
    }
}

pub fn require_actor<'a>(actor: Option<&'a Actor>, operation: &str) -> ClientResult<&'a Actor> {
    actor.ok_or_else(|| ClientError::authentication_required(operation))
}
