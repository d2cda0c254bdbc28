//! Domain service for volunteer groups and their memberships.
//!
//! Every operation is gated by the authorization evaluator before the store
//! is consulted, so a caller without access to a group learns nothing about
//! whether it exists.

use crate::db::{Group, Member};
use crate::domain::{GroupId, Identity, UserId};
use crate::services::auth_service::AuthError;
use crate::services::authorization::Scope;

#[async_trait::async_trait]
pub trait MembershipService: Send + Sync {
    /// Creates a group. Site administrators only.
    async fn create_group(&self, actor: &Identity, name: &str) -> Result<Group, AuthError>;

    /// Adds `user` to `group`, or updates the admin flag of an existing
    /// membership. Requires group-admin rights on `group`.
    async fn add_member(
        &self,
        actor: &Identity,
        group: GroupId,
        user: UserId,
        is_group_admin: bool,
    ) -> Result<(), AuthError>;

    async fn set_group_admin(
        &self,
        actor: &Identity,
        group: GroupId,
        user: UserId,
        is_group_admin: bool,
    ) -> Result<(), AuthError>;

    async fn remove_member(
        &self,
        actor: &Identity,
        group: GroupId,
        user: UserId,
    ) -> Result<(), AuthError>;

    /// Lists the active members of `group`. Any member may read it.
    async fn list_members(&self, actor: &Identity, group: GroupId) -> Result<Vec<Member>, AuthError>;

    /// Runs the evaluator for callers guarding their own group resources.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] when the scope is not granted.
    async fn authorize(&self, actor: &Identity, scope: Scope) -> Result<(), AuthError>;
}
