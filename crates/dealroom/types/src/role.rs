//! Roles and the externally authenticated actor

use crate::email::NormalizedEmail;
use crate::ids::IdentityId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a party, either globally (from the identity provider) or within one deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Seller,
    Broker,
    Lawyer,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Buyer,
        Role::Seller,
        Role::Broker,
        Role::Lawyer,
        Role::Admin,
    ];

    /// Lawyers and admins hold full custody authority.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Lawyer | Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Broker => "broker",
            Role::Lawyer => "lawyer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verified `(userId, role, email)` tuple supplied by the identity provider.
///
/// `identity_id` is set when the session has already been linked to a
/// directory identity; documents uploaded by external participants are
/// attributed to that identity rather than the session user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    pub email: NormalizedEmail,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<IdentityId>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role, email: &str) -> Self {
        let user_id = user_id.into();
        Self {
            display_name: user_id.clone(),
            user_id,
            role,
            email: NormalizedEmail::new(email),
            identity_id: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_identity(mut self, identity_id: IdentityId) -> Self {
        self.identity_id = Some(identity_id);
        self
    }

    pub fn is_privileged(&self) -> bool {
        self.role.is_privileged()
    }

    /// Whether `principal` (an uploader reference) denotes this actor.
    pub fn is_principal(&self, principal: &str) -> bool {
        self.user_id == principal
            || self
                .identity_id
                .as_ref()
                .is_some_and(|id| id.as_str() == principal)
    }

    /// The principal recorded as uploader for documents this actor creates.
    pub fn principal(&self) -> String {
        match &self.identity_id {
            Some(id) => id.as_str().to_string(),
            None => self.user_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_roles() {
        assert!(Role::Lawyer.is_privileged());
        assert!(Role::Admin.is_privileged());
        assert!(!Role::Buyer.is_privileged());
        assert!(!Role::Broker.is_privileged());
    }

    #[test]
    fn test_principal_matches_user_or_identity() {
        let actor = Actor::new("user-1", Role::Buyer, "B@x.io").with_identity(IdentityId::new("id-9"));
        assert!(actor.is_principal("user-1"));
        assert!(actor.is_principal("id-9"));
        assert!(!actor.is_principal("user-2"));
        assert_eq!(actor.principal(), "id-9");
        assert_eq!(actor.email.as_str(), "b@x.io");
    }
}
