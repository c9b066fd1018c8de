use super::{backend_error, SocialContext};
use crate::domain::{
    error::CommonError,
    user::{validate_username, User},
};

#[tracing::instrument(name = "Update username", skip(ctx))]
pub async fn update_username(ctx: &SocialContext, username: &str) -> Result<User, CommonError> {
    validate_username(username)?;

    let taken = ctx
        .repos
        .users
        .get_by_username(username)
        .await
        .map_err(|err| backend_error("Update username", err))?
        .map_or(false, |user| user.id != ctx.me());
    if taken {
        return Err(CommonError::BadRequest(format!(
            "{username} is already taken"
        )));
    }

    ctx.repos
        .users
        .update_username(ctx.me(), username)
        .await
        .map_err(|err| backend_error("Update username", err))?
        .ok_or_else(|| CommonError::UserNotFound("Your profile was not found".to_owned()))
}
