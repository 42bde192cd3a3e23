use crate::error::{AppError, Result};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 64;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;

/// Validates a username.
///
/// # Arguments
///
/// * `username` - The username to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the username is valid.
pub fn validate_username(username: &str) -> Result<()> {
    if username.len() < USERNAME_MIN {
        return Err(AppError::Validation(format!(
            "Username must be at least {} characters long",
            USERNAME_MIN
        )));
    }

    if username.len() > USERNAME_MAX {
        return Err(AppError::Validation(format!(
            "Username must be at most {} characters",
            USERNAME_MAX
        )));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::Validation(
            "Username can only contain letters, numbers, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validates a password.
///
/// # Arguments
///
/// * `password` - The password to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the password is valid.
pub fn validate_password(password: &str) -> Result<()> {
    let length = password.chars().count();
    if length < PASSWORD_MIN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters long",
            PASSWORD_MIN
        )));
    }

    if length > PASSWORD_MAX {
        return Err(AppError::Validation(format!(
            "Password must be at most {} characters",
            PASSWORD_MAX
        )));
    }

    Ok(())
}

/// Checks that the confirmation field repeats the password.
pub fn validate_password_confirmation(password: &str, confirmation: &str) -> Result<()> {
    if password != confirmation {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }
    Ok(())
}

/// Turns a client supplied "go back here after login" path into a local
/// path. Absolute URLs, protocol-relative URLs and anything odd become `/`.
pub fn sanitize_redirect(failed_path: Option<&str>) -> String {
    match failed_path.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}
