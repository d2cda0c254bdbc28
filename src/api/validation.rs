use super::ApiError;
use crate::domain::{GroupId, UserId};

fn validate_id(kind: &str, id: i32) -> Result<i32, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid {kind} ID: {id}. ID must be a positive integer"
        )));
    }
    Ok(id)
}

pub fn validate_user_id(id: i32) -> Result<UserId, ApiError> {
    validate_id("user", id).map(UserId::new)
}

pub fn validate_group_id(id: i32) -> Result<GroupId, ApiError> {
    validate_id("group", id).map(GroupId::new)
}
