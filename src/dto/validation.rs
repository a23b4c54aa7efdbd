//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest client token accepted at identification.
pub const MAX_CLIENT_TOKEN_LEN: usize = 64;

/// Validates that a persistent client token is 1 to 64 characters of
/// ASCII letters, digits, `-` or `_`.
///
/// # Examples
///
/// ```ignore
/// validate_client_token("3f2a-team_blue") // Ok
/// validate_client_token("")               // Err - empty
/// validate_client_token("a b")            // Err - space
/// ```
pub fn validate_client_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() || token.len() > MAX_CLIENT_TOKEN_LEN {
        let mut err = ValidationError::new("client_token_length");
        err.message = Some(
            format!(
                "Client token must be 1 to {MAX_CLIENT_TOKEN_LEN} characters (got {})",
                token.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("client_token_format");
        err.message = Some("Client token may only contain letters, digits, '-' and '_'".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a display name is not blank once trimmed.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("display_name_blank");
        err.message = Some("Display name must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_client_token_valid() {
        assert!(validate_client_token("3f2a-team_blue").is_ok());
        assert!(validate_client_token("a").is_ok());
        assert!(validate_client_token(&"x".repeat(MAX_CLIENT_TOKEN_LEN)).is_ok());
    }

    #[test]
    fn test_validate_client_token_invalid_length() {
        assert!(validate_client_token("").is_err());
        assert!(validate_client_token(&"x".repeat(MAX_CLIENT_TOKEN_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_client_token_invalid_format() {
        assert!(validate_client_token("a b").is_err()); // space
        assert!(validate_client_token("team:1").is_err()); // separator used in idempotency keys
        assert!(validate_client_token("équipe").is_err()); // non ascii
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name(" Alpha ").is_ok());
        assert!(validate_display_name("   ").is_err());
    }
}
