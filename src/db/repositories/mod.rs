pub mod membership;
pub mod user;
