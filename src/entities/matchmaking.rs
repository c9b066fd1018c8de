use std::{fmt, sync::Arc};

use serde_json::{json, Value};

use super::tables::{MATCHED_USER_ID, USER_ID};
use crate::components::backend::{Backend, BackendError, Filter, RowQuery};

#[derive(Clone)]
pub struct MatchmakingRepository {
    backend: Arc<dyn Backend>,
}

impl fmt::Debug for MatchmakingRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchmakingRepository").finish()
    }
}

/// Reads the partner out of a procedure result or status row. Accepts a bare id,
/// an object with `matched_user_id`, or a list holding such an object.
pub fn matched_user_from(value: &Value) -> Option<String> {
    match value {
        Value::String(user_id) if !user_id.is_empty() => Some(user_id.clone()),
        Value::Object(fields) => fields
            .get(MATCHED_USER_ID)
            .and_then(Value::as_str)
            .filter(|user_id| !user_id.is_empty())
            .map(str::to_string),
        Value::Array(rows) => rows.first().and_then(matched_user_from),
        _ => None,
    }
}

impl MatchmakingRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Asks the backend for a random partner. `None` means the caller was queued.
    pub async fn request_match(&self, procedure: &str, user_id: &str) -> Result<Option<String>, BackendError> {
        let result = self
            .backend
            .call_procedure(procedure, json!({ USER_ID: user_id }))
            .await?;

        Ok(matched_user_from(&result))
    }

    /// Reads the caller's connection status row and returns the partner if one was assigned.
    pub async fn get_matched_user(&self, status_table: &str, user_id: &str) -> Result<Option<String>, BackendError> {
        let query = RowQuery::new().filter(Filter::eq(USER_ID, user_id)).limit(1);
        let rows = self.backend.query_rows(status_table, &query).await?;

        Ok(rows.first().and_then(matched_user_from))
    }
}
