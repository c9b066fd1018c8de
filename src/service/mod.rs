use std::sync::Arc;

use crate::{
    components::{
        backend::{Backend, BackendError},
        configuration::MatchingConfig,
        notifier::Notifier,
        session::AuthContext,
    },
    domain::error::CommonError,
    entities::Repositories,
};

pub mod conversations;
pub mod friend_requests;
pub mod friends_list;
pub mod matching;
pub mod messages;
pub mod profile;

/// Everything a service operation needs, injected once at the composition root.
pub struct SocialContext {
    pub auth: AuthContext,
    pub repos: Repositories,
    pub notifier: Arc<dyn Notifier>,
    pub matching: MatchingConfig,
}

impl std::fmt::Debug for SocialContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialContext")
            .field("auth", &self.auth)
            .field("matching", &self.matching)
            .finish()
    }
}

impl SocialContext {
    pub fn new(
        auth: AuthContext,
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
        matching: MatchingConfig,
    ) -> Self {
        Self {
            auth,
            repos: Repositories::new(backend),
            notifier,
            matching,
        }
    }

    /// The signed in user id.
    pub fn me(&self) -> &str {
        &self.auth.user_id
    }

    /// The name alerts use for `user_id`: its username when it has one.
    pub(crate) async fn display_name(&self, user_id: &str) -> String {
        match self.repos.users.get_username(user_id).await {
            Ok(Some(username)) => username,
            Ok(None) => user_id.to_string(),
            Err(err) => {
                log::warn!("Display name > Couldn't fetch username of {user_id}: {err}");
                user_id.to_string()
            }
        }
    }
}

/// Logs a backend failure and hides its details behind a generic error.
pub(crate) fn backend_error(operation: &str, err: BackendError) -> CommonError {
    log::error!("{operation} > Backend error: {err}");
    CommonError::Unknown(err.to_string())
}
