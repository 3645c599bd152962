//! Authentication validator
//!
//! Username and password checks against a [`Credentials`] store.

use super::credentials::Credentials;
use crate::error::AuthError;

const MAX_CREDENTIAL_LENGTH: usize = 128;

/// Performs basic input sanitation to check for malicious or malformed usernames/passwords.
fn is_valid_input(input: &str) -> bool {
    !input.trim().is_empty()
        && input.len() <= MAX_CREDENTIAL_LENGTH
        && !input.contains(['\r', '\n', '\0'])
}

/// Validates that the given username exists in the credential store.
pub fn validate_user(username: &str, credentials: &Credentials) -> Result<(), AuthError> {
    if username.contains(['@', '#', ',', '%', '/']) {
        return Err(AuthError::InvalidUsername(username.to_string()));
    }

    if !is_valid_input(username) {
        return Err(AuthError::MalformedInput("Invalid username format".into()));
    }

    match credentials.password_for(username) {
        Some(_) => Ok(()),
        None => Err(AuthError::UserNotFound(username.to_string())),
    }
}

/// Validates that the provided password matches the stored password for the username.
pub fn validate_password(
    username: &str,
    password: &str,
    credentials: &Credentials,
) -> Result<(), AuthError> {
    validate_user(username, credentials)?;

    if !is_valid_input(password) {
        return Err(AuthError::MalformedInput("Invalid password format".into()));
    }

    match credentials.password_for(username) {
        Some(stored) if stored == password => Ok(()),
        Some(_) => Err(AuthError::InvalidPassword(username.to_string())),
        None => Err(AuthError::UserNotFound(username.to_string())),
    }
}
