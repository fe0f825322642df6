//! Users, roles and directory identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::organization::OrganizationId;
use crate::define_id_type;

define_id_type!(i64, UserId);

/// What a user may do inside their organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Member => "member",
        }
    }

    /// Whether check-ins submitted by others may be marked reviewed by this role.
    pub fn can_review(&self) -> bool {
        match self {
            Role::Admin | Role::Manager => true,
            Role::Member => false,
        }
    }

    /// Whether this role may trigger roster reconciliation.
    pub fn can_manage_roster(&self) -> bool {
        match self {
            Role::Admin => true,
            Role::Manager | Role::Member => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "member" => Ok(Role::Member),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Rejected directory identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identity '{raw}': {reason}")]
pub struct IdentityError {
    pub raw: String,
    pub reason: &'static str,
}

/// Stable external identity of a user: a trimmed, lowercased email address.
///
/// Two identities are the same user exactly when their normalized forms are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let normalized = raw.trim().to_lowercase();
        let error = |reason| IdentityError {
            raw: raw.to_string(),
            reason,
        };
        if normalized.is_empty() {
            return Err(error("empty"));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(error("contains whitespace"));
        }
        match normalized.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
                Ok(Self(normalized))
            }
            _ => Err(error("not an email address")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part before the `@`.
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }

    /// A readable name guessed from the local part, e.g. `jane.doe` -> `Jane Doe`.
    pub fn display_name(&self) -> String {
        self.local_part()
            .split(['.', '_', '-', '+'])
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

/// A member of an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub organization_id: OrganizationId,
    pub identity: Identity,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
    /// Hire instant; the first tracked period is the one containing it.
    pub joined_at: DateTime<Utc>,
}

impl User {
    pub fn to_ref(&self) -> UserRef {
        UserRef {
            id: self.id,
            display_name: self.display_name.clone(),
            identity: self.identity.to_string(),
        }
    }
}

/// Input for creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub identity: Identity,
    pub display_name: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl NewUser {
    /// A plain member named after their identity, as created on first directory sighting.
    pub fn from_identity(identity: Identity, joined_at: DateTime<Utc>) -> Self {
        let display_name = identity.display_name();
        Self {
            identity,
            display_name,
            role: Role::Member,
            joined_at,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

/// Lightweight user reference returned in classification buckets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub display_name: String,
    pub identity: String,
}
