//! Acting user and per-action request context

use celims_store::{Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated identity supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    #[inline]
    #[must_use]
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.role, self.id)
    }
}

/// Everything one workflow action needs to know about who is acting and when.
///
/// Passed explicitly to every action; there is no ambient session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    pub actor: Actor,
    /// Correlates the log span and the audit rows of one action
    pub request_id: Uuid,
    pub now: DateTime<Utc>,
}

impl ActionContext {
    /// Context for an action happening now, with a fresh request id.
    #[must_use]
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            request_id: Uuid::new_v4(),
            now: Utc::now(),
        }
    }

    /// Pin the action clock.
    #[inline]
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// With an externally issued request id
    #[inline]
    #[must_use]
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_get_distinct_request_ids() {
        let actor = Actor::new(UserId(3), Role::LabTech);
        let a = ActionContext::new(actor);
        let b = ActionContext::new(actor);
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(actor.to_string(), "lab_tech#3");
    }

    #[test]
    fn clock_can_be_pinned() {
        let at = DateTime::from_timestamp(1_718_000_000, 0).unwrap();
        let ctx = ActionContext::new(Actor::new(UserId(1), Role::Manager)).at(at);
        assert_eq!(ctx.now, at);
    }
}
