//! Three-tier authorization: site admin, group admin, group member.
//!
//! Every group-scoped handler asks [`Authorizer::check`] before touching data
//! instead of inspecting role flags itself.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::domain::{GroupId, GroupRole, Identity, UserId};
use crate::services::auth_service::AuthError;

/// What the caller wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Site administration (user management, group creation).
    Global,
    /// Manage members or settings of one group.
    GroupAdmin(GroupId),
    /// Read or contribute within one group.
    GroupMember(GroupId),
    /// Modify a resource inside a group that belongs to `owner`.
    OwnedResource { group: GroupId, owner: UserId },
}

impl Scope {
    #[must_use]
    pub const fn group(&self) -> Option<GroupId> {
        match self {
            Self::Global => None,
            Self::GroupAdmin(group)
            | Self::GroupMember(group)
            | Self::OwnedResource { group, .. } => Some(*group),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::GroupAdmin(group) => write!(f, "group:{group}:admin"),
            Self::GroupMember(group) => write!(f, "group:{group}:member"),
            Self::OwnedResource { group, owner } => write!(f, "group:{group}:owned:{owner}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Forbidden,
    NotAuthenticated,
}

impl Decision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn require(self) -> Result<(), AuthError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Forbidden => Err(AuthError::Forbidden),
            Self::NotAuthenticated => Err(AuthError::Unauthenticated),
        }
    }
}

/// The decision table. `role` is the caller's membership in the scope's
/// group and is ignored for [`Scope::Global`].
#[must_use]
pub fn decide(identity: Option<&Identity>, role: GroupRole, scope: Scope) -> Decision {
    let Some(identity) = identity else {
        return Decision::NotAuthenticated;
    };

    if identity.is_site_admin {
        return Decision::Allowed;
    }

    let allowed = match scope {
        Scope::Global => false,
        Scope::GroupAdmin(_) => role == GroupRole::Admin,
        Scope::GroupMember(_) => matches!(role, GroupRole::Admin | GroupRole::Member),
        Scope::OwnedResource { owner, .. } => match role {
            GroupRole::Admin => true,
            GroupRole::Member => identity.subject == owner,
            GroupRole::None => false,
        },
    };

    if allowed {
        Decision::Allowed
    } else {
        Decision::Forbidden
    }
}

/// Source of membership facts. Returns the membership's group-admin flag, or
/// `None` when the identity is not a member (or the group does not exist).
#[async_trait]
pub trait MembershipLookup: Send + Sync {
    async fn group_admin_flag(&self, user: UserId, group: GroupId) -> anyhow::Result<Option<bool>>;
}

#[derive(Clone)]
pub struct Authorizer {
    memberships: Arc<dyn MembershipLookup>,
}

impl Authorizer {
    #[must_use]
    pub fn new(memberships: Arc<dyn MembershipLookup>) -> Self {
        Self { memberships }
    }

    /// Evaluates `scope` for `identity`, consulting membership only when the
    /// answer depends on it.
    pub async fn check(
        &self,
        identity: Option<&Identity>,
        scope: Scope,
    ) -> Result<Decision, AuthError> {
        let role = match (identity, scope.group()) {
            (Some(who), Some(group)) if !who.is_site_admin => {
                let flag = self
                    .memberships
                    .group_admin_flag(who.subject, group)
                    .await
                    .map_err(AuthError::from)?;
                GroupRole::from_membership(flag)
            }
            _ => GroupRole::None,
        };

        let decision = decide(identity, role, scope);
        if decision == Decision::Forbidden
            && let Some(who) = identity
        {
            tracing::info!(
                event = "authorization_denied",
                subject = %who.subject,
                scope = %scope,
                "Authorization denied"
            );
        }

        Ok(decision)
    }

    /// [`check`](Self::check) collapsed into an error for `?` use in handlers.
    pub async fn require(&self, identity: &Identity, scope: Scope) -> Result<(), AuthError> {
        self.check(Some(identity), scope).await?.require()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const G: GroupId = GroupId::new(10);
    const OTHER_G: GroupId = GroupId::new(11);

    fn site_admin() -> Identity {
        Identity::new(UserId::new(1), true)
    }

    fn user(id: i32) -> Identity {
        Identity::new(UserId::new(id), false)
    }

    struct Fixed(HashMap<(i32, i32), bool>);

    #[async_trait]
    impl MembershipLookup for Fixed {
        async fn group_admin_flag(
            &self,
            user: UserId,
            group: GroupId,
        ) -> anyhow::Result<Option<bool>> {
            Ok(self.0.get(&(user.value(), group.value())).copied())
        }
    }

    struct Failing;

    #[async_trait]
    impl MembershipLookup for Failing {
        async fn group_admin_flag(&self, _: UserId, _: GroupId) -> anyhow::Result<Option<bool>> {
            anyhow::bail!("store unavailable")
        }
    }

    // Group admin = user 2, member = user 3, non-member = user 4.
    fn authorizer() -> Authorizer {
        let mut memberships = HashMap::new();
        memberships.insert((2, G.value()), true);
        memberships.insert((3, G.value()), false);
        memberships.insert((4, OTHER_G.value()), true);
        Authorizer::new(Arc::new(Fixed(memberships)))
    }

    #[tokio::test]
    async fn decision_matrix_matches_role_table() {
        use Decision::{Allowed as A, Forbidden as F};

        let authz = authorizer();
        let owned_by_member = Scope::OwnedResource {
            group: G,
            owner: UserId::new(3),
        };
        let owned_by_someone_else = Scope::OwnedResource {
            group: G,
            owner: UserId::new(99),
        };

        // (identity, global, group admin, group member, own resource, other's resource)
        let cases = [
            ("site admin", site_admin(), [A, A, A, A, A]),
            ("group admin", user(2), [F, A, A, A, A]),
            ("member", user(3), [F, F, A, A, F]),
            ("non-member", user(4), [F, F, F, F, F]),
        ];

        for (label, identity, expected) in cases {
            let scopes = [
                Scope::Global,
                Scope::GroupAdmin(G),
                Scope::GroupMember(G),
                owned_by_member,
                owned_by_someone_else,
            ];
            for (scope, want) in scopes.into_iter().zip(expected) {
                let got = authz.check(Some(&identity), scope).await.unwrap();
                assert_eq!(got, want, "{label} at {scope}");
            }
        }
    }

    #[test]
    fn non_member_owner_is_still_denied() {
        let owner = user(4);
        let scope = Scope::OwnedResource {
            group: G,
            owner: owner.subject,
        };
        assert_eq!(decide(Some(&owner), GroupRole::None, scope), Decision::Forbidden);
    }

    #[test]
    fn group_admin_flag_does_not_grant_global() {
        assert_eq!(
            decide(Some(&user(2)), GroupRole::Admin, Scope::Global),
            Decision::Forbidden
        );
    }

    #[test]
    fn missing_identity_is_not_authenticated() {
        for scope in [Scope::Global, Scope::GroupMember(G)] {
            assert_eq!(decide(None, GroupRole::Admin, scope), Decision::NotAuthenticated);
        }
    }

    #[tokio::test]
    async fn admin_of_other_group_gets_nothing_here() {
        let authz = authorizer();
        let decision = authz.check(Some(&user(4)), Scope::GroupAdmin(G)).await.unwrap();
        assert_eq!(decision, Decision::Forbidden);
        let decision = authz
            .check(Some(&user(4)), Scope::GroupAdmin(OTHER_G))
            .await
            .unwrap();
        assert_eq!(decision, Decision::Allowed);
    }

    #[tokio::test]
    async fn site_admin_skips_membership_lookup() {
        let authz = Authorizer::new(Arc::new(Failing));
        let decision = authz.check(Some(&site_admin()), Scope::GroupAdmin(G)).await;
        assert_eq!(decision.unwrap(), Decision::Allowed);
    }

    #[tokio::test]
    async fn lookup_failure_is_an_error_not_a_denial() {
        let authz = Authorizer::new(Arc::new(Failing));
        let result = authz.check(Some(&user(3)), Scope::GroupMember(G)).await;
        assert!(matches!(result, Err(AuthError::Internal(_))));
    }

    #[test]
    fn require_maps_to_errors() {
        assert!(Decision::Allowed.require().is_ok());
        assert!(matches!(Decision::Forbidden.require(), Err(AuthError::Forbidden)));
        assert!(matches!(
            Decision::NotAuthenticated.require(),
            Err(AuthError::Unauthenticated)
        ));
    }
}
