pub mod prelude;

pub mod group_members;
pub mod groups;
pub mod users;
