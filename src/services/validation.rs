use super::AuthError;

/// Upper bound on accepted password length. Argon2 would take more, but an
/// unbounded input is an unbounded amount of hashing work.
pub const MAX_PASSWORD_LENGTH: usize = 1024;

pub fn validate_password(password: &str, min_length: usize) -> Result<&str, AuthError> {
    let length = password.chars().count();

    if length < min_length {
        return Err(AuthError::Validation(format!(
            "Password must be at least {min_length} characters"
        )));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(AuthError::Validation(format!(
            "Password must be {MAX_PASSWORD_LENGTH} characters or less"
        )));
    }

    Ok(password)
}

pub fn validate_username(username: &str) -> Result<&str, AuthError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(AuthError::Validation("Username cannot be empty".to_string()));
    }

    if trimmed.len() > 64 {
        return Err(AuthError::Validation(
            "Username must be 64 characters or less".to_string(),
        ));
    }

    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Err(AuthError::Validation(
            "Username can only contain letters, numbers, dots, hyphens, and underscores"
                .to_string(),
        ));
    }

    Ok(trimmed)
}

/// Returns the address in the lower-cased form it is stored and looked up in.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<String, AuthError> {
    let normalized = normalize_email(email);

    let valid = normalized.len() <= 254
        && normalized
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
            })
        && !normalized.chars().any(char::is_whitespace);

    if !valid {
        return Err(AuthError::Validation("Invalid email address".to_string()));
    }

    Ok(normalized)
}

pub fn validate_group_name(name: &str) -> Result<&str, AuthError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(AuthError::Validation("Group name cannot be empty".to_string()));
    }

    if trimmed.len() > 100 {
        return Err(AuthError::Validation(
            "Group name must be 100 characters or less".to_string(),
        ));
    }

    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password() {
        assert!(validate_password("longenough", 8).is_ok());
        assert!(validate_password("short", 8).is_err());
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LENGTH + 1), 8).is_err());
        // Length counts characters, not bytes.
        assert!(validate_password("ééééééé", 8).is_err());
    }

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username("  jo.smith ").unwrap(), "jo.smith");
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email(" Sam@Shelter.ORG ").unwrap(),
            "sam@shelter.org"
        );
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@shelter.org").is_err());
        assert!(validate_email("sam@localhost").is_err());
        assert!(validate_email("sa m@shelter.org").is_err());
    }

    #[test]
    fn test_validate_group_name() {
        assert_eq!(validate_group_name(" Dog Walkers ").unwrap(), "Dog Walkers");
        assert!(validate_group_name("   ").is_err());
    }
}
