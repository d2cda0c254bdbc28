//! `SeaORM` implementation of the `MembershipService` trait.

use async_trait::async_trait;
use tracing::info;

use crate::db::{Group, Member, Store};
use crate::domain::{GroupId, Identity, UserId};
use crate::services::auth_service::AuthError;
use crate::services::authorization::{Authorizer, Scope};
use crate::services::membership_service::MembershipService;
use crate::services::validation;

pub struct SeaOrmMembershipService {
    store: Store,
    authorizer: Authorizer,
}

impl SeaOrmMembershipService {
    #[must_use]
    pub const fn new(store: Store, authorizer: Authorizer) -> Self {
        Self { store, authorizer }
    }

    /// Only reached after authorization, so a 404 here is never visible to
    /// someone without access.
    async fn ensure_group(&self, group: GroupId) -> Result<(), AuthError> {
        self.store
            .membership_repo()
            .get_group(group)
            .await?
            .map(|_| ())
            .ok_or_else(|| AuthError::NotFound("Group".to_string()))
    }
}

#[async_trait]
impl MembershipService for SeaOrmMembershipService {
    async fn create_group(&self, actor: &Identity, name: &str) -> Result<Group, AuthError> {
        self.authorizer.require(actor, Scope::Global).await?;

        let name = validation::validate_group_name(name)?;
        let repo = self.store.membership_repo();
        if repo.get_group_by_name(name).await?.is_some() {
            return Err(AuthError::Conflict("Group name already in use".to_string()));
        }

        let group = repo.create_group(name).await?;
        info!(group_id = %group.id, actor = %actor.subject, "Group created");
        Ok(group)
    }

    async fn add_member(
        &self,
        actor: &Identity,
        group: GroupId,
        user: UserId,
        is_group_admin: bool,
    ) -> Result<(), AuthError> {
        self.authorizer.require(actor, Scope::GroupAdmin(group)).await?;
        self.ensure_group(group).await?;

        if self.store.user_repo().get_by_id(user).await?.is_none() {
            return Err(AuthError::NotFound("User".to_string()));
        }

        self.store
            .membership_repo()
            .upsert_member(group, user, is_group_admin)
            .await?;

        info!(
            group_id = %group,
            user_id = %user,
            is_group_admin,
            actor = %actor.subject,
            "Group member added"
        );
        Ok(())
    }

    async fn set_group_admin(
        &self,
        actor: &Identity,
        group: GroupId,
        user: UserId,
        is_group_admin: bool,
    ) -> Result<(), AuthError> {
        self.authorizer.require(actor, Scope::GroupAdmin(group)).await?;

        let updated = self
            .store
            .membership_repo()
            .set_group_admin(group, user, is_group_admin)
            .await?;
        if !updated {
            return Err(AuthError::NotFound("Membership".to_string()));
        }

        info!(
            group_id = %group,
            user_id = %user,
            is_group_admin,
            actor = %actor.subject,
            "Group admin flag changed"
        );
        Ok(())
    }

    async fn remove_member(
        &self,
        actor: &Identity,
        group: GroupId,
        user: UserId,
    ) -> Result<(), AuthError> {
        self.authorizer.require(actor, Scope::GroupAdmin(group)).await?;

        if !self.store.membership_repo().remove_member(group, user).await? {
            return Err(AuthError::NotFound("Membership".to_string()));
        }

        info!(group_id = %group, user_id = %user, actor = %actor.subject, "Group member removed");
        Ok(())
    }

    async fn list_members(&self, actor: &Identity, group: GroupId) -> Result<Vec<Member>, AuthError> {
        self.authorizer.require(actor, Scope::GroupMember(group)).await?;
        self.ensure_group(group).await?;

        Ok(self.store.membership_repo().list_members(group).await?)
    }

    async fn authorize(&self, actor: &Identity, scope: Scope) -> Result<(), AuthError> {
        self.authorizer.require(actor, scope).await
    }
}
