use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::CommonError;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
}

pub const USERNAME_MIN_LENGTH: usize = 3;

lazy_static::lazy_static! {
    static ref USERNAME_ALLOWED_CHARS: Regex = Regex::new(r"^[A-Za-z0-9_]*$").unwrap();
}

/// Checks a username locally, before it travels to the backend.
pub fn validate_username(username: &str) -> Result<(), CommonError> {
    if username.chars().count() < USERNAME_MIN_LENGTH {
        return Err(CommonError::BadRequest(format!(
            "Username must be at least {USERNAME_MIN_LENGTH} characters long"
        )));
    }

    if !USERNAME_ALLOWED_CHARS.is_match(username) {
        return Err(CommonError::BadRequest(
            "Username can only contain letters, numbers and underscores".to_owned(),
        ));
    }

    Ok(())
}
