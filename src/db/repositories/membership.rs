use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::{Expr, OnConflict},
};
use serde::Serialize;

use crate::domain::{GroupId, UserId};
use crate::entities::{group_members, groups, users};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub created_at: String,
}

impl From<groups::Model> for Group {
    fn from(model: groups::Model) -> Self {
        Self {
            id: GroupId::new(model.id),
            name: model.name,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub user_id: UserId,
    pub username: String,
    pub is_group_admin: bool,
    pub joined_at: String,
}

/// Repository for groups and group memberships
pub struct MembershipRepository {
    conn: DatabaseConnection,
}

impl MembershipRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create_group(&self, name: &str) -> Result<Group> {
        let active = groups::ActiveModel {
            name: Set(name.to_string()),
            created_at: Set(Utc::now().to_rfc3339()),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert group")?;

        Ok(Group::from(model))
    }

    pub async fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        let group = groups::Entity::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query group")?;

        Ok(group.map(Group::from))
    }

    pub async fn get_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let group = groups::Entity::find()
            .filter(groups::Column::Name.eq(name))
            .one(&self.conn)
            .await
            .context("Failed to query group by name")?;

        Ok(group.map(Group::from))
    }

    /// Adds `user` to `group`, or updates the admin flag of an existing
    /// membership.
    pub async fn upsert_member(&self, group: GroupId, user: UserId, is_group_admin: bool) -> Result<()> {
        let active = group_members::ActiveModel {
            group_id: Set(group.value()),
            user_id: Set(user.value()),
            is_group_admin: Set(is_group_admin),
            created_at: Set(Utc::now().to_rfc3339()),
        };

        group_members::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([group_members::Column::GroupId, group_members::Column::UserId])
                    .update_column(group_members::Column::IsGroupAdmin)
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await
            .context("Failed to upsert group member")?;

        Ok(())
    }

    /// Returns `false` when `user` is not a member of `group`.
    pub async fn set_group_admin(&self, group: GroupId, user: UserId, is_group_admin: bool) -> Result<bool> {
        let result = group_members::Entity::update_many()
            .col_expr(group_members::Column::IsGroupAdmin, Expr::value(is_group_admin))
            .filter(group_members::Column::GroupId.eq(group.value()))
            .filter(group_members::Column::UserId.eq(user.value()))
            .exec(&self.conn)
            .await
            .context("Failed to update group admin flag")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn remove_member(&self, group: GroupId, user: UserId) -> Result<bool> {
        let result = group_members::Entity::delete_many()
            .filter(group_members::Column::GroupId.eq(group.value()))
            .filter(group_members::Column::UserId.eq(user.value()))
            .exec(&self.conn)
            .await
            .context("Failed to remove group member")?;

        Ok(result.rows_affected == 1)
    }

    /// Members of `group` whose accounts are still active, ordered by username.
    pub async fn list_members(&self, group: GroupId) -> Result<Vec<Member>> {
        let rows = group_members::Entity::find()
            .filter(group_members::Column::GroupId.eq(group.value()))
            .find_also_related(users::Entity)
            .filter(users::Column::DeletedAt.is_null())
            .order_by_asc(users::Column::Username)
            .all(&self.conn)
            .await
            .context("Failed to list group members")?;

        Ok(rows
            .into_iter()
            .filter_map(|(membership, user)| {
                user.map(|user| Member {
                    user_id: UserId::new(membership.user_id),
                    username: user.username,
                    is_group_admin: membership.is_group_admin,
                    joined_at: membership.created_at,
                })
            })
            .collect())
    }

    /// The membership's admin flag, or `None` for non-members. A deactivated
    /// account has no memberships.
    pub async fn group_admin_flag(&self, user: UserId, group: GroupId) -> Result<Option<bool>> {
        let membership = group_members::Entity::find_by_id((group.value(), user.value()))
            .inner_join(users::Entity)
            .filter(users::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query group membership")?;

        Ok(membership.map(|m| m.is_group_admin))
    }
}
