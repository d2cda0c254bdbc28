use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Token consumption scans identities holding an unexpired token.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_reset_token_expiry")
                    .table(Users::Table)
                    .col(Users::ResetTokenExpiry)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_setup_token_expiry")
                    .table(Users::Table)
                    .col(Users::SetupTokenExpiry)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_group_members_user_id")
                    .table(GroupMembers::Table)
                    .col(GroupMembers::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_group_members_user_id")
                    .table(GroupMembers::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_users_setup_token_expiry")
                    .table(Users::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_users_reset_token_expiry")
                    .table(Users::Table)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    ResetTokenExpiry,
    SetupTokenExpiry,
}

#[derive(DeriveIden)]
enum GroupMembers {
    Table,
    UserId,
}
