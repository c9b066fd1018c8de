use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{
    decode_rows,
    tables::{CREATED_AT, ID, LISTENED_AT, MESSAGES_TABLE, PLAY_COUNT, RECIPIENT_ID, SENDER_ID},
};
use crate::{
    components::backend::{Backend, BackendError, Filter, OrderDirection, RowQuery},
    domain::message::{ExpiryRule, Message},
};

const CONTENT: &str = "content";
const MEDIA_URL: &str = "media_url";
const EXPIRY_TYPE: &str = "expiry_type";
const EXPIRY_VALUE: &str = "expiry_value";

/// A message as stored, with the expiry rule flattened into two columns.
#[derive(Deserialize, Debug)]
struct MessageRow {
    id: String,
    sender_id: String,
    recipient_id: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    media_url: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    listened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    play_count: i32,
    expiry_type: String,
    #[serde(default)]
    expiry_value: Option<i64>,
}

impl TryFrom<MessageRow> for Message {
    type Error = BackendError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let expiry = ExpiryRule::from_columns(&row.expiry_type, row.expiry_value)
            .map_err(|err| BackendError::InvalidRow(format!("message {}: {}", row.id, err)))?;

        Ok(Message {
            id: row.id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            content: row.content,
            media_url: row.media_url,
            created_at: row.created_at,
            listened_at: row.listened_at,
            play_count: row.play_count,
            expiry,
        })
    }
}

fn into_messages(rows: Vec<serde_json::Value>) -> Result<Vec<Message>, BackendError> {
    decode_rows::<MessageRow>(rows)?
        .into_iter()
        .map(Message::try_from)
        .collect()
}

/// Fields of a message about to be sent.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub sender_id: &'a str,
    pub recipient_id: &'a str,
    pub content: Option<&'a str>,
    pub media_url: Option<&'a str>,
    pub expiry: ExpiryRule,
}

#[derive(Clone)]
pub struct MessagesRepository {
    backend: Arc<dyn Backend>,
}

impl fmt::Debug for MessagesRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagesRepository").finish()
    }
}

impl MessagesRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Messages addressed to `user_id`, oldest first.
    #[tracing::instrument(name = "Get received messages")]
    pub async fn get_received(&self, user_id: &str) -> Result<Vec<Message>, BackendError> {
        let query = RowQuery::new()
            .filter(Filter::eq(RECIPIENT_ID, user_id))
            .order_by(CREATED_AT, OrderDirection::Ascending);

        let rows = self.backend.query_rows(MESSAGES_TABLE, &query).await?;
        into_messages(rows)
    }

    pub async fn get(&self, message_id: &str) -> Result<Option<Message>, BackendError> {
        let query = RowQuery::new().filter(Filter::eq(ID, message_id)).limit(1);
        let rows = self.backend.query_rows(MESSAGES_TABLE, &query).await?;
        Ok(into_messages(rows)?.into_iter().next())
    }

    pub async fn create(&self, message: NewMessage<'_>) -> Result<Message, BackendError> {
        let (expiry_type, expiry_value) = message.expiry.to_columns();
        let row = self
            .backend
            .insert_row(
                MESSAGES_TABLE,
                json!({
                    SENDER_ID: message.sender_id,
                    RECIPIENT_ID: message.recipient_id,
                    CONTENT: message.content,
                    MEDIA_URL: message.media_url,
                    EXPIRY_TYPE: expiry_type,
                    EXPIRY_VALUE: expiry_value,
                }),
            )
            .await?;

        let row: MessageRow = serde_json::from_value(row)?;
        row.try_into()
    }

    /// Records a playback. `listened_at` keeps the first listen.
    pub async fn mark_listened(
        &self,
        message_id: &str,
        listened_at: DateTime<Utc>,
        play_count: i32,
    ) -> Result<Option<Message>, BackendError> {
        let rows = self
            .backend
            .update_rows(
                MESSAGES_TABLE,
                &[Filter::eq(ID, message_id)],
                json!({
                    LISTENED_AT: listened_at.to_rfc3339(),
                    PLAY_COUNT: play_count,
                }),
            )
            .await?;

        Ok(into_messages(rows)?.into_iter().next())
    }
}
