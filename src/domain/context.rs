//! Tenant scoping and actor audit context.
//!
//! Every public operation receives these explicitly; there is no ambient
//! (thread-local) identity anywhere in the crate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque tenant identifier scoping all data and queries.
///
/// The store never crosses tenants within a single operation; two objects
/// with the same type and code under different tenants are unrelated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a random tenant id (fixtures and tests).
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity and request metadata of the caller performing a mutation.
///
/// Replaces the original's thread-bound auditor: handlers extract the user
/// from request headers and pass the context down every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    /// Acting user recorded in `created_by` / `modified_by` audit columns.
    pub user: String,
    /// Caller IP, when known.
    pub ip: Option<String>,
    /// Caller user agent, when known.
    pub user_agent: Option<String>,
}

impl ActorContext {
    /// Build a context with only the acting user set.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ip: None,
            user_agent: None,
        }
    }

    /// Attach the caller IP.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Attach the caller user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_display_matches_uuid() {
        let raw = Uuid::new_v4();
        assert_eq!(TenantId::from_uuid(raw).to_string(), raw.to_string());
    }

    #[test]
    fn actor_builder_fills_optional_fields() {
        let actor = ActorContext::new("ada")
            .with_ip("10.0.0.7")
            .with_user_agent("cli/1.0");
        assert_eq!(actor.user, "ada");
        assert_eq!(actor.ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(actor.user_agent.as_deref(), Some("cli/1.0"));
    }
}
