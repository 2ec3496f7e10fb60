//! The authenticated caller.

use common::UserId;
use serde::{Deserialize, Serialize};

/// Role granted to a caller by the identity subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

/// An already-authenticated caller.
///
/// The core never authenticates; it receives this value from whoever did and
/// passes it explicitly into every operation that needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    /// A regular customer.
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Customer,
        }
    }

    /// An administrator.
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Returns true if the caller may act on a resource owned by `owner`.
    pub fn can_access(&self, owner: UserId) -> bool {
        self.is_admin() || self.user_id == owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_can_only_access_own_resources() {
        let me = UserId::new();
        let identity = Identity::customer(me);
        assert!(identity.can_access(me));
        assert!(!identity.can_access(UserId::new()));
    }

    #[test]
    fn admin_can_access_everything() {
        let identity = Identity::admin(UserId::new());
        assert!(identity.can_access(UserId::new()));
    }
}
