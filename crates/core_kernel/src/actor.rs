//! Acting-user context
//!
//! Every mutating operation receives the `Actor` performing it explicitly.
//! Services use it to stamp `created_by` / `updated_by` and to resolve the
//! owning pg_admin account for subscription checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::identifiers::{OwnerId, UserId};

/// Role of the acting user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Platform superuser
    Superuser,
    /// Property owner (pg_admin)
    PgAdmin,
    /// Staff member acting on behalf of a pg_admin
    PgStaff,
    /// Tenant
    Tenant,
    /// Background jobs and internal triggers
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Superuser => "superuser",
            ActorRole::PgAdmin => "pg_admin",
            ActorRole::PgStaff => "pg_staff",
            ActorRole::Tenant => "tenant",
            ActorRole::System => "system",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "superuser" => Ok(ActorRole::Superuser),
            "pg_admin" => Ok(ActorRole::PgAdmin),
            "pg_staff" => Ok(ActorRole::PgStaff),
            "tenant" => Ok(ActorRole::Tenant),
            "system" => Ok(ActorRole::System),
            other => Err(CoreError::validation(format!("Unknown role: {}", other))),
        }
    }
}

/// The user (or system) performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Acting user; `None` for system actors
    pub user_id: Option<UserId>,
    /// Role of the acting user
    pub role: ActorRole,
    /// For staff, the pg_admin they work for
    pub pg_admin_id: Option<UserId>,
}

impl Actor {
    /// The actor used by scheduled jobs and internal triggers
    pub fn system() -> Self {
        Self {
            user_id: None,
            role: ActorRole::System,
            pg_admin_id: None,
        }
    }

    /// A pg_admin acting on their own account
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            role: ActorRole::PgAdmin,
            pg_admin_id: None,
        }
    }

    /// A staff member working for `pg_admin_id`
    pub fn staff(user_id: UserId, pg_admin_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            role: ActorRole::PgStaff,
            pg_admin_id: Some(pg_admin_id),
        }
    }

    /// A platform superuser
    pub fn superuser(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            role: ActorRole::Superuser,
            pg_admin_id: None,
        }
    }

    /// Resolves the owning pg_admin account
    ///
    /// Staff delegate to their pg_admin; every other user is their own
    /// owner. System actors have no owner.
    pub fn owner_id(&self) -> Option<OwnerId> {
        match (self.role, self.pg_admin_id) {
            (ActorRole::PgStaff, Some(admin)) => Some(OwnerId::from(admin)),
            _ => self.user_id.map(OwnerId::from),
        }
    }

    /// Like [`Actor::owner_id`] but fails for actors without an owner
    pub fn require_owner(&self) -> Result<OwnerId, CoreError> {
        self.owner_id()
            .ok_or_else(|| CoreError::Unauthorized(format!("{} actor has no owner account", self.role)))
    }

    /// Returns true for roles allowed to provision default configuration
    pub fn is_admin(&self) -> bool {
        matches!(self.role, ActorRole::PgAdmin | ActorRole::Superuser)
    }

    /// Returns true for scheduled jobs and internal triggers
    pub fn is_system(&self) -> bool {
        self.role == ActorRole::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_resolves_to_admin() {
        let admin = UserId::new();
        let actor = Actor::staff(UserId::new(), admin);
        assert_eq!(actor.owner_id(), Some(OwnerId::from(admin)));
        assert!(!actor.is_admin());
    }

    #[test]
    fn test_admin_is_own_owner() {
        let user = UserId::new();
        let actor = Actor::admin(user);
        assert_eq!(actor.owner_id(), Some(OwnerId::from(user)));
        assert!(actor.is_admin());
    }

    #[test]
    fn test_system_has_no_owner() {
        let actor = Actor::system();
        assert!(actor.owner_id().is_none());
        assert!(matches!(actor.require_owner(), Err(CoreError::Unauthorized(_))));
    }

    #[test]
    fn test_role_round_trip() {
        for role in ["superuser", "pg_admin", "pg_staff", "tenant", "system"] {
            assert_eq!(role.parse::<ActorRole>().unwrap().as_str(), role);
        }
        assert!("owner".parse::<ActorRole>().is_err());
    }
}
