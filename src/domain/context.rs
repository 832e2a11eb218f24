use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Vendor,
    Doctor,
    Admin,
    /// Automated callers: gateway webhooks and the maturation sweep.
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Vendor => "vendor",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "vendor" => Ok(Role::Vendor),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            "system" => Ok(Role::System),
            other => Err(DomainError::InvalidInput(format!("unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Identity and clock for a single operation.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub actor: Actor,
    pub now: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            now: Utc::now(),
        }
    }

    pub fn system() -> Self {
        Self::new(Actor::new(Uuid::nil(), Role::System))
    }

    /// Pins the operation clock, used by maintenance jobs and tests.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn role(&self) -> Role {
        self.actor.role
    }

    pub fn is_admin(&self) -> bool {
        self.actor.role == Role::Admin
    }

    pub fn require_admin(&self, action: &str) -> Result<(), DomainError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::UnauthorizedAction(format!(
                "{} requires an administrator, got {}",
                action, self.actor.role
            )))
        }
    }

    pub fn require_admin_or_system(&self, action: &str) -> Result<(), DomainError> {
        match self.actor.role {
            Role::Admin | Role::System => Ok(()),
            other => Err(DomainError::UnauthorizedAction(format!(
                "{} is not permitted for {}",
                action, other
            ))),
        }
    }
}
