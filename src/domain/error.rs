use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CommonError {
    #[error("Not found")]
    NotFound(String),
    #[error("Bad request {0}")]
    BadRequest(String),
    #[error("Requested user was not found")]
    UserNotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Unknown Internal Error")]
    Unknown(String),
    #[error("Unauthorized")]
    Unauthorized(String),
    #[error("Operation was only partially applied: {0}")]
    PartiallyApplied(String),
}

impl PartialEq for CommonError {
    fn eq(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }
}

impl CommonError {
    pub fn name(&self) -> String {
        format!("{self:?}")
    }

    /// The message meant to be shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            CommonError::NotFound(message)
            | CommonError::BadRequest(message)
            | CommonError::UserNotFound(message)
            | CommonError::Forbidden(message)
            | CommonError::Unauthorized(message)
            | CommonError::PartiallyApplied(message) => message.clone(),
            CommonError::Unknown(_) => "Something went wrong, please try again".to_string(),
        }
    }
}
