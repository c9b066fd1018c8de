use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::json;

use super::{
    decode_rows,
    tables::{ID, USERNAME, USERS_TABLE},
};
use crate::{
    components::backend::{Backend, BackendError, Filter, RowQuery},
    domain::user::User,
};

#[derive(Clone)]
pub struct UsersRepository {
    backend: Arc<dyn Backend>,
}

impl fmt::Debug for UsersRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsersRepository").finish()
    }
}

impl UsersRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, BackendError> {
        let query = RowQuery::new().filter(Filter::eq(USERNAME, username)).limit(1);
        let rows = self.backend.query_rows(USERS_TABLE, &query).await?;
        Ok(decode_rows(rows)?.into_iter().next())
    }

    pub async fn get_username(&self, user_id: &str) -> Result<Option<String>, BackendError> {
        let query = RowQuery::new().filter(Filter::eq(ID, user_id)).limit(1);
        let rows = self.backend.query_rows(USERS_TABLE, &query).await?;
        Ok(decode_rows::<User>(rows)?
            .into_iter()
            .next()
            .and_then(|user| user.username))
    }

    /// Usernames for the given ids. Users without a username are left out.
    pub async fn get_usernames(&self, user_ids: &[String]) -> Result<HashMap<String, String>, BackendError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query = RowQuery::new().filter(Filter::is_in(ID, user_ids));
        let rows = self.backend.query_rows(USERS_TABLE, &query).await?;

        Ok(decode_rows::<User>(rows)?
            .into_iter()
            .filter_map(|user| user.username.map(|username| (user.id, username)))
            .collect())
    }

    pub async fn update_username(&self, user_id: &str, username: &str) -> Result<Option<User>, BackendError> {
        let rows = self
            .backend
            .update_rows(
                USERS_TABLE,
                &[Filter::eq(ID, user_id)],
                json!({ USERNAME: username }),
            )
            .await?;

        Ok(decode_rows(rows)?.into_iter().next())
    }
}
