pub use super::group_members::Entity as GroupMembers;
pub use super::groups::Entity as Groups;
pub use super::users::Entity as Users;
