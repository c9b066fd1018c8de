use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{
    decode_rows,
    tables::{
        CREATED_AT, FRIEND_REQUESTS_TABLE, FROM_USER_ID, ID, RESPONDED_AT, STATUS, TO_USER_ID,
    },
};
use crate::{
    components::backend::{Backend, BackendError, Filter, OrderDirection, RowQuery},
    domain::friend_request::{FriendRequest, RequestStatus},
};

#[derive(Clone)]
pub struct FriendRequestsRepository {
    backend: Arc<dyn Backend>,
}

impl fmt::Debug for FriendRequestsRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FriendRequestsRepository").finish()
    }
}

impl FriendRequestsRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn get(&self, request_id: &str) -> Result<Option<FriendRequest>, BackendError> {
        let query = RowQuery::new().filter(Filter::eq(ID, request_id)).limit(1);
        let rows = self.backend.query_rows(FRIEND_REQUESTS_TABLE, &query).await?;
        Ok(decode_rows(rows)?.into_iter().next())
    }

    async fn get_pending(&self, column: &str, user_id: &str) -> Result<Vec<FriendRequest>, BackendError> {
        let query = RowQuery::new()
            .filter(Filter::eq(column, user_id))
            .filter(Filter::eq(STATUS, RequestStatus::Pending.as_str()))
            .order_by(CREATED_AT, OrderDirection::Descending);

        let rows = self.backend.query_rows(FRIEND_REQUESTS_TABLE, &query).await?;
        decode_rows(rows)
    }

    /// Pending requests addressed to `user_id`, newest first.
    #[tracing::instrument(name = "Get incoming requests")]
    pub async fn get_pending_incoming(&self, user_id: &str) -> Result<Vec<FriendRequest>, BackendError> {
        self.get_pending(TO_USER_ID, user_id).await
    }

    /// Pending requests sent by `user_id`, newest first.
    #[tracing::instrument(name = "Get outgoing requests")]
    pub async fn get_pending_outgoing(&self, user_id: &str) -> Result<Vec<FriendRequest>, BackendError> {
        self.get_pending(FROM_USER_ID, user_id).await
    }

    /// The pending request sent from `from_user_id` to `to_user_id`, if any.
    pub async fn get_pending_from(
        &self,
        from_user_id: &str,
        to_user_id: &str,
    ) -> Result<Option<FriendRequest>, BackendError> {
        let query = RowQuery::new()
            .filter(Filter::eq(FROM_USER_ID, from_user_id))
            .filter(Filter::eq(TO_USER_ID, to_user_id))
            .filter(Filter::eq(STATUS, RequestStatus::Pending.as_str()))
            .limit(1);

        let rows = self.backend.query_rows(FRIEND_REQUESTS_TABLE, &query).await?;
        Ok(decode_rows(rows)?.into_iter().next())
    }

    pub async fn create(&self, from_user_id: &str, to_user_id: &str) -> Result<FriendRequest, BackendError> {
        let row = self
            .backend
            .insert_row(
                FRIEND_REQUESTS_TABLE,
                json!({
                    FROM_USER_ID: from_user_id,
                    TO_USER_ID: to_user_id,
                    STATUS: RequestStatus::Pending.as_str(),
                }),
            )
            .await?;

        serde_json::from_value(row).map_err(Into::into)
    }

    /// Moves a request from `expected` to `new_status`. The update is conditioned on the stored
    /// status still being `expected`, so `None` means someone else answered first.
    pub async fn update_status(
        &self,
        request_id: &str,
        expected: RequestStatus,
        new_status: RequestStatus,
        responded_at: Option<DateTime<Utc>>,
    ) -> Result<Option<FriendRequest>, BackendError> {
        let rows = self
            .backend
            .update_rows(
                FRIEND_REQUESTS_TABLE,
                &[
                    Filter::eq(ID, request_id),
                    Filter::eq(STATUS, expected.as_str()),
                ],
                json!({
                    STATUS: new_status.as_str(),
                    RESPONDED_AT: responded_at.map_or(Value::Null, |at| Value::String(at.to_rfc3339())),
                }),
            )
            .await?;

        Ok(decode_rows(rows)?.into_iter().next())
    }
}
