use std::{fmt, sync::Arc};

use serde_json::json;

use super::{
    decode_rows,
    tables::{CREATED_AT, FRIENDS_TABLE, FRIEND_ID, NICKNAME, USER_ID},
};
use crate::{
    components::backend::{Backend, BackendError, Filter, OrderDirection, RowQuery},
    domain::friendship::Friendship,
};

#[derive(Clone)]
pub struct FriendshipsRepository {
    backend: Arc<dyn Backend>,
}

impl fmt::Debug for FriendshipsRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FriendshipsRepository").finish()
    }
}

fn pair_filters(user_id: &str, friend_id: &str) -> [Filter; 2] {
    [Filter::eq(USER_ID, user_id), Filter::eq(FRIEND_ID, friend_id)]
}

impl FriendshipsRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Fetches the friendship rows owned by `user_id`, oldest first.
    #[tracing::instrument(name = "Get user friends")]
    pub async fn get_user_friends(&self, user_id: &str) -> Result<Vec<Friendship>, BackendError> {
        let query = RowQuery::new()
            .filter(Filter::eq(USER_ID, user_id))
            .order_by(CREATED_AT, OrderDirection::Ascending);

        let rows = self.backend.query_rows(FRIENDS_TABLE, &query).await?;
        decode_rows(rows)
    }

    /// The row where `user_id` lists `friend_id`, if any.
    pub async fn get_friendship(
        &self,
        user_id: &str,
        friend_id: &str,
    ) -> Result<Option<Friendship>, BackendError> {
        let [owner, friend] = pair_filters(user_id, friend_id);
        let query = RowQuery::new().filter(owner).filter(friend).limit(1);

        let rows = self.backend.query_rows(FRIENDS_TABLE, &query).await?;
        Ok(decode_rows(rows)?.into_iter().next())
    }

    /// Inserts the `user_id -> friend_id` row. A pair that already exists is reported as
    /// `BackendError::Duplicate`.
    pub async fn create_friendship(
        &self,
        user_id: &str,
        friend_id: &str,
    ) -> Result<Friendship, BackendError> {
        let row = self
            .backend
            .insert_row(
                FRIENDS_TABLE,
                json!({ USER_ID: user_id, FRIEND_ID: friend_id }),
            )
            .await?;

        serde_json::from_value(row).map_err(Into::into)
    }

    /// Deletes the `user_id -> friend_id` row only. The other direction belongs to the friend.
    pub async fn delete_friendship(&self, user_id: &str, friend_id: &str) -> Result<(), BackendError> {
        self.backend
            .delete_rows(FRIENDS_TABLE, &pair_filters(user_id, friend_id))
            .await
    }

    pub async fn update_nickname(
        &self,
        user_id: &str,
        friend_id: &str,
        nickname: Option<&str>,
    ) -> Result<Option<Friendship>, BackendError> {
        let rows = self
            .backend
            .update_rows(
                FRIENDS_TABLE,
                &pair_filters(user_id, friend_id),
                json!({ NICKNAME: nickname }),
            )
            .await?;

        Ok(decode_rows(rows)?.into_iter().next())
    }
}
