//! Domain types for identities and groups with strong typing.
//!
//! IDs follow the Newtype pattern so a user ID can never be passed where a
//! group ID is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[derive(Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn value(&self) -> i32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self::new(id)
            }
        }
    };
}

entity_id!(
    /// Unique identifier of an identity (user record).
    ///
    /// ```rust
    /// use pawgate::domain::UserId;
    ///
    /// let id = UserId::new(42);
    /// assert_eq!(id.value(), 42);
    /// assert_eq!(id.to_string(), "42");
    /// ```
    UserId
);

entity_id!(
    /// Unique identifier of a volunteer group.
    GroupId
);

/// The authenticated caller, as proven by a session token.
///
/// This is the per-request identity context: it carries only what the token
/// asserts, so it is valid without a database round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: UserId,
    pub is_site_admin: bool,
}

impl Identity {
    #[must_use]
    pub const fn new(subject: UserId, is_site_admin: bool) -> Self {
        Self {
            subject,
            is_site_admin,
        }
    }
}

/// Role of an identity within one specific group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupRole {
    Admin,
    Member,
    None,
}

impl GroupRole {
    /// Maps an optional membership row's admin flag to a role.
    #[must_use]
    pub const fn from_membership(is_group_admin: Option<bool>) -> Self {
        match is_group_admin {
            Some(true) => Self::Admin,
            Some(false) => Self::Member,
            None => Self::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_do_not_mix_but_share_behavior() {
        let user = UserId::new(7);
        let group = GroupId::from(7);
        assert_eq!(user.value(), group.value());
        assert_eq!(i32::from(user), 7);
        assert_eq!(group.to_string(), "7");
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&UserId::new(3)).unwrap();
        assert_eq!(json, "3");
        let back: GroupId = serde_json::from_str("9").unwrap();
        assert_eq!(back, GroupId::new(9));
    }

    #[test]
    fn group_role_from_membership() {
        assert_eq!(GroupRole::from_membership(Some(true)), GroupRole::Admin);
        assert_eq!(GroupRole::from_membership(Some(false)), GroupRole::Member);
        assert_eq!(GroupRole::from_membership(None), GroupRole::None);
    }
}
