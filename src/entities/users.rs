use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    /// Stored lower-cased.
    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id password hash (PHC string)
    pub password_hash: String,

    /// Site-wide administrator.
    pub is_admin: bool,

    pub failed_login_attempts: i32,

    pub locked_until: Option<DateTimeUtc>,

    /// Argon2id hash of the outstanding password-reset token.
    pub reset_token_hash: Option<String>,

    pub reset_token_expiry: Option<DateTimeUtc>,

    /// Argon2id hash of the outstanding invite / setup token.
    pub setup_token_hash: Option<String>,

    pub setup_token_expiry: Option<DateTimeUtc>,

    /// Invited accounts have no usable password until setup completes.
    pub requires_password_setup: bool,

    /// Soft-delete marker. Deactivated identities never authenticate.
    pub deleted_at: Option<DateTimeUtc>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::group_members::Entity")]
    GroupMembers,
}

impl Related<super::group_members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GroupMembers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
